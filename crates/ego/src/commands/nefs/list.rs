use clap::Args;
use ego_nefs::item::{Item, ItemFlags};
use itertools::Itertools;
use miette::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;

#[derive(Args)]
pub struct ListArgs {
    /// An input NeFS file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Show ids, stored sizes and flags
    #[arg(short, long, default_value_t = false)]
    long: bool,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let archive = super::open(&self.file)?;
        let items = archive.items();

        for item in items.enumerate_depth_first_by_name() {
            let path = items.path_of(item.id())?;
            if !self.long {
                println!("{path}");
                continue;
            }

            if item.is_directory() {
                println!("{:>8} {:>10} {:>10}  {}/", item.id().value(), "", "", path.blue());
            } else {
                println!(
                    "{:>8} {:>10} {:>10}  {} {}",
                    item.id().value(),
                    item.extracted_size(),
                    item.compressed_size(),
                    path,
                    flags(item).dimmed()
                );
            }
        }
        Ok(())
    }
}

fn flags(item: &Item) -> String {
    let flags = item.flags();
    let names = [
        (ItemFlags::TRANSFORMED, "transformed"),
        (ItemFlags::DUPLICATED, "duplicated"),
        (ItemFlags::CACHEABLE, "cacheable"),
        (ItemFlags::PATCHED, "patched"),
    ]
    .into_iter()
    .filter(|(flag, _)| flags.contains(*flag))
    .map(|(_, name)| name)
    .join(",");

    if names.is_empty() {
        String::new()
    } else {
        format!("[{names}]")
    }
}
