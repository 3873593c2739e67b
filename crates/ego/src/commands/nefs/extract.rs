use clap::Args;
use ego_nefs::progress::OperationContext;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Args)]
pub struct ExtractArgs {
    /// An input NeFS file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR", env = "EGO_EXTRACT_DIR")]
    directory: PathBuf,

    /// Extract only this item, given by its path inside the archive
    #[arg(short, long, value_name = "PATH")]
    item: Option<String>,

    /// Allow overwriting existing files
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self, ctx: OperationContext) -> Result<()> {
        let archive = super::open(&self.file)?;

        if let Some(item) = &self.item {
            let id = super::find(&archive, item)?;
            let name = archive
                .items()
                .get(id)
                .map(|i| i.file_name().to_owned())
                .unwrap_or_default();
            let p = self.directory.join(name);
            if !self.overwrite && p.exists() {
                return Err(miette!("{} already exists", p.display()));
            }

            info!("writing {}", p.display());
            archive
                .extract_file(id, &p, &ctx)
                .context(format!("extracting {item}"))?;
            return Ok(());
        }

        if !self.overwrite && self.directory.exists() {
            let mut entries = std::fs::read_dir(&self.directory)
                .into_diagnostic()
                .context(format!("reading {}", self.directory.display()))?;
            if entries.next().is_some() {
                return Err(miette!(
                    "{} is not empty, pass --overwrite to extract into it",
                    self.directory.display()
                ));
            }
        }

        let report = archive.extract_all(&self.directory, &ctx)?;
        for (id, e) in &report.failures {
            let path = archive.items().path_of(*id).unwrap_or_else(|_| id.to_string());
            error!("{path}: {e}");
        }

        info!(
            "extracted {} files to {}",
            report.extracted,
            self.directory.display()
        );
        if !report.failures.is_empty() {
            return Err(miette!("{} items could not be extracted", report.failures.len()));
        }
        Ok(())
    }
}
