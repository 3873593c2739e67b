use clap::Args;
use ego_nefs::{
    progress::OperationContext,
    source::{DataSource, FileSource},
};
use miette::{Context, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ReplaceArgs {
    /// An input NeFS file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Path of the file inside the archive
    #[arg(short, long, value_name = "PATH")]
    item: String,

    /// File holding the new data
    #[arg(short, long, value_name = "FILE")]
    source: PathBuf,

    #[command(flatten)]
    save: super::SaveArgs,
}

impl ReplaceArgs {
    pub fn handle(&self, ctx: OperationContext) -> Result<()> {
        let mut archive = super::open(&self.file)?;
        let id = super::find(&archive, &self.item)?;

        let source = FileSource::new(&self.source)
            .context(format!("opening {}", self.source.display()))?;
        archive
            .items_mut()
            .replace(id, DataSource::File(source))
            .context(format!("replacing {}", self.item))?;
        info!("replacing {} with {}", self.item, self.source.display());

        self.save.save(&archive, &ctx)
    }
}
