use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use ego_nefs::{
    item::ItemId,
    progress::{CancellationToken, OperationContext},
    write::SaveOptions,
    NefsArchive, NefsVersion,
};
use miette::{miette, Context, Result};
use tracing::{debug, info};

pub mod add;
pub mod create;
pub mod extract;
pub mod info;
pub mod list;
pub mod remove;
pub mod replace;

#[derive(clap::Subcommand)]
pub enum NefsCommands {
    /// Show the header values of an archive
    Info(info::InfoArgs),
    /// List the items of an archive
    List(list::ListArgs),
    /// Extract an archive, or a single item, into a directory
    Extract(extract::ExtractArgs),
    /// Create an archive from a directory
    Create(create::CreateArgs),
    /// Add the files of a directory to an archive
    Add(add::AddArgs),
    /// Replace the data of a file in an archive
    Replace(replace::ReplaceArgs),
    /// Remove an item, and everything below it, from an archive
    Remove(remove::RemoveArgs),
}

impl NefsCommands {
    pub fn handle(&self, token: &CancellationToken) -> Result<()> {
        match self {
            NefsCommands::Info(info) => info.handle(),
            NefsCommands::List(list) => list.handle(),
            NefsCommands::Extract(extract) => extract.handle(context(token)),
            NefsCommands::Create(create) => create.handle(context(token)),
            NefsCommands::Add(add) => add.handle(context(token)),
            NefsCommands::Replace(replace) => replace.handle(context(token)),
            NefsCommands::Remove(remove) => remove.handle(context(token)),
        }
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Version {
    #[value(name = "1.6")]
    V16,
    #[default]
    #[value(name = "2.0")]
    V20,
}

impl From<Version> for NefsVersion {
    fn from(version: Version) -> Self {
        match version {
            Version::V16 => NefsVersion::V16,
            Version::V20 => NefsVersion::V20,
        }
    }
}

/// How a modified archive is written
#[derive(Args)]
pub struct SaveArgs {
    /// Write the result here instead of over the input
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Deflate level for new data
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
    level: u32,

    /// Convert the archive to another header version
    #[arg(long, value_enum)]
    convert: Option<Version>,
}

impl SaveArgs {
    pub fn save(&self, archive: &NefsArchive, ctx: &OperationContext) -> Result<()> {
        let dest = self.output.as_deref().unwrap_or(archive.path());
        let options = SaveOptions::builder()
            .concurrency(self.jobs)
            .compression_level(self.level)
            .maybe_version(self.convert.map(NefsVersion::from))
            .build();

        let report = archive
            .save(dest, options, ctx)
            .context(format!("saving {}", dest.display()))?;
        info!(
            "wrote {} ({} bytes, {} compressed, {} copied)",
            dest.display(),
            report.archive_size,
            report.compressed,
            report.copied
        );
        Ok(())
    }
}

/// Context that reports progress to the log
fn context(token: &CancellationToken) -> OperationContext {
    OperationContext::with_token(token.clone()).with_callback(|processed, total| {
        debug!(processed, total, "progress");
    })
}

pub fn open(path: &Path) -> Result<NefsArchive> {
    NefsArchive::open(path).context(format!("opening {}", path.display()))
}

/// Look up an item by its path inside the archive
pub fn find(archive: &NefsArchive, path: &str) -> Result<ItemId> {
    archive
        .items()
        .find_path(path)
        .ok_or_else(|| miette!("{path} is not in {}", archive.path().display()))
}
