use clap::Args;
use miette::{miette, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;

#[derive(Args)]
pub struct InfoArgs {
    /// An input NeFS file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl InfoArgs {
    pub fn handle(&self) -> Result<()> {
        let archive = super::open(&self.file)?;
        let header = archive
            .header()
            .ok_or(miette!("{} has no header", self.file.display()))?;

        let items = archive.items();
        let directories = items.enumerate_by_id().filter(|i| i.is_directory()).count();

        println!("{}", self.file.display().bold());
        println!("  {:<18} {}", "version".cyan(), header.version());
        println!("  {:<18} {}", "archive name".cyan(), header.archive_name()?);
        println!("  {:<18} {:#x}", "header size".cyan(), header.header_size());
        println!("  {:<18} {:#x}", "first data offset".cyan(), header.first_data_offset());
        println!("  {:<18} {}", "archive size".cyan(), header.archive_size());
        println!("  {:<18} {}", "volumes".cyan(), header.intro().volume_count);
        println!(
            "  {:<18} {} ({} directories)",
            "items".cyan(),
            items.len(),
            directories
        );
        Ok(())
    }
}
