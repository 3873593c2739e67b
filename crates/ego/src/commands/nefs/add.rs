use clap::Args;
use ego_nefs::{
    item::{ItemFlags, ItemId},
    list::ItemList,
    progress::OperationContext,
    source::{DataSource, FileSource},
};
use miette::{miette, Context, IntoDiagnostic, Result};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Args)]
pub struct AddArgs {
    /// An input NeFS file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A file, or a directory whose contents are added
    #[arg(short, long, value_name = "PATH")]
    source: PathBuf,

    /// Directory inside the archive to add to, instead of the top level
    #[arg(long, value_name = "PATH")]
    into: Option<String>,

    #[command(flatten)]
    save: super::SaveArgs,
}

impl AddArgs {
    pub fn handle(&self, ctx: OperationContext) -> Result<()> {
        let mut archive = super::open(&self.file)?;
        let parent = match &self.into {
            Some(path) => Some(super::find(&archive, path)?),
            None => None,
        };

        let (added, replaced) = if self.source.is_dir() {
            add_tree(archive.items_mut(), parent, &self.source)?
        } else {
            let name = self
                .source
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or(miette!("unable to convert {} to a string", self.source.display()))?;
            match put_file(archive.items_mut(), parent, name, &self.source)? {
                true => (1, 0),
                false => (0, 1),
            }
        };
        info!("{added} files added, {replaced} replaced");

        self.save.save(&archive, &ctx)
    }
}

/// Add every file below `directory` under `root`, creating directories as needed.
///
/// Files that already exist in the archive get the new data. Returns the number of files added and
/// replaced.
pub fn add_tree(
    items: &mut ItemList,
    root: Option<ItemId>,
    directory: &Path,
) -> Result<(usize, usize)> {
    let mut parents: HashMap<PathBuf, Option<ItemId>> = HashMap::from([(PathBuf::new(), root)]);
    let mut added = 0;
    let mut replaced = 0;

    for entry in WalkDir::new(directory).min_depth(1).sort_by_file_name() {
        let entry = entry.into_diagnostic()?;
        let relative = entry.path().strip_prefix(directory).into_diagnostic()?;
        let parent = relative.parent().map(Path::to_path_buf).unwrap_or_default();
        let parent = *parents
            .get(&parent)
            .ok_or(miette!("no directory was added for {}", parent.display()))?;
        let name = entry
            .file_name()
            .to_str()
            .ok_or(miette!("unable to convert {} to a string", relative.display()))?;

        let existing = items
            .children(parent)
            .into_iter()
            .find(|c| c.file_name() == name)
            .map(|c| (c.id(), c.is_directory()));

        if entry.file_type().is_dir() {
            let id = match existing {
                Some((id, true)) => id,
                Some((_, false)) => {
                    return Err(miette!("{} is a file in the archive", relative.display()))
                }
                None => items.add_directory(parent, name)?,
            };
            parents.insert(relative.to_path_buf(), Some(id));
            continue;
        }

        if let Some((_, true)) = existing {
            return Err(miette!("{} is a directory in the archive", relative.display()));
        }
        match put_file(items, parent, name, entry.path())? {
            true => added += 1,
            false => replaced += 1,
        }
    }

    Ok((added, replaced))
}

/// Add `path` as `name` under `parent`, or give an existing file of that name its data.
///
/// Returns whether a new file was added.
fn put_file(items: &mut ItemList, parent: Option<ItemId>, name: &str, path: &Path) -> Result<bool> {
    let existing = items
        .children(parent)
        .into_iter()
        .find(|c| c.file_name() == name)
        .map(|c| c.id());
    let source = DataSource::File(
        FileSource::new(path).context(format!("opening {}", path.display()))?,
    );

    match existing {
        Some(id) => {
            debug!("replacing {}", path.display());
            items.replace(id, source).context(format!("replacing {name}"))?;
            Ok(false)
        }
        None => {
            debug!("adding {}", path.display());
            items.add_file(parent, name, source, ItemFlags::empty())?;
            Ok(true)
        }
    }
}
