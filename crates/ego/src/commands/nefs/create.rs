use clap::Args;
use ego_nefs::{progress::OperationContext, write::SaveOptions, NefsArchive};
use miette::{miette, Context, Result};
use std::path::PathBuf;
use tracing::info;

use super::Version;

#[derive(Args)]
pub struct CreateArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// A target NeFS file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Header version of the new archive
    #[arg(long = "nefs-version", value_enum, default_value_t)]
    version: Version,

    /// Number of worker threads
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Deflate level
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
    level: u32,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl CreateArgs {
    pub fn handle(&self, ctx: OperationContext) -> Result<()> {
        if !self.overwrite && self.file.exists() {
            return Err(miette!("{} already exists", self.file.display()));
        }
        info!("creating {}", self.file.display());

        let mut archive = NefsArchive::new(&self.file, self.version.into());
        let (added, _) = super::add::add_tree(archive.items_mut(), None, &self.directory)?;
        if added == 0 {
            return Err(miette!("directory is empty"));
        }

        let options = SaveOptions::builder()
            .concurrency(self.jobs)
            .compression_level(self.level)
            .build();
        let report = archive
            .save(&self.file, options, &ctx)
            .context("finalizing nefs file")?;
        info!(
            "wrote {} files, {} bytes",
            report.compressed, report.archive_size
        );
        Ok(())
    }
}
