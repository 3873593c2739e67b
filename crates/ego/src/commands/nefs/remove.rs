use clap::Args;
use ego_nefs::progress::OperationContext;
use miette::Result;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct RemoveArgs {
    /// An input NeFS file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Path of the item inside the archive
    #[arg(short, long, value_name = "PATH")]
    item: String,

    #[command(flatten)]
    save: super::SaveArgs,
}

impl RemoveArgs {
    pub fn handle(&self, ctx: OperationContext) -> Result<()> {
        let mut archive = super::open(&self.file)?;
        let id = super::find(&archive, &self.item)?;

        let removed = archive.items_mut().remove(id)?;
        info!("removing {} ({} items)", self.item, removed.len());

        self.save.save(&archive, &ctx)
    }
}
