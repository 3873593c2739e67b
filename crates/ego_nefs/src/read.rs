//! Types for opening NeFS archives and extracting their items
//!

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::compression::ChunkCompressor;
use crate::error::{Error, Result};
use crate::header::{Header, HeaderTemplate, NefsVersion};
use crate::item::{Item, ItemId};
use crate::list::ItemList;
use crate::progress::OperationContext;
use crate::write::{ArchiveWriter, SaveOptions, SaveReport};

/// Outcome of [`NefsArchive::extract_all`]
#[derive(Debug, Default)]
pub struct ExtractReport {
    /// Number of files written
    pub extracted: usize,
    /// Items that could not be extracted, with the reason
    pub failures: Vec<(ItemId, Error)>,
}

/// An archive and the pending edits to its items
///
/// ```no_run
/// use ego_nefs::NefsArchive;
/// use ego_nefs::progress::OperationContext;
///
/// fn list_nefs_contents(path: &str) -> ego_nefs::error::Result<()> {
///     let archive = NefsArchive::open(path)?;
///
///     for item in archive.items().enumerate_depth_first_by_name() {
///         println!("{}: {}", item.id(), archive.items().path_of(item.id())?);
///     }
///
///     let mut data = Vec::new();
///     if let Some(id) = archive.items().find_path("config/game.xml") {
///         archive.extract_to(id, &mut data, &OperationContext::new())?;
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct NefsArchive {
    path: PathBuf,
    header: Option<Header>,
    template: HeaderTemplate,
    items: ItemList,
}

impl NefsArchive {
    /// Read the header of an archive and load its items
    #[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);
        let header = Header::read_from(&mut reader)?;

        let mut items = ItemList::new(&path);
        for id in header.item_ids() {
            items.add(Item::from_header(id, &header)?)?;
        }
        items.validate_tree()?;

        info!(
            version = %header.version(),
            items = items.len(),
            header_size = header.header_size(),
            "opened archive"
        );

        Ok(Self {
            path,
            template: header.template(),
            header: Some(header),
            items,
        })
    }

    /// An empty archive that will be written to `path`
    pub fn new(path: impl Into<PathBuf>, version: NefsVersion) -> Self {
        let path = path.into();
        Self {
            items: ItemList::new(&path),
            path,
            header: None,
            template: HeaderTemplate::new(version),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The header read from disk; `None` for archives created with [`NefsArchive::new`]
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Header values used when the archive is saved
    pub fn template(&self) -> &HeaderTemplate {
        &self.template
    }

    pub fn items(&self) -> &ItemList {
        &self.items
    }

    /// Edit the items; changes are written by [`NefsArchive::save`]
    pub fn items_mut(&mut self) -> &mut ItemList {
        &mut self.items
    }

    /// Write the extracted data of a file, returning the number of bytes written.
    ///
    /// Data the game has transformed is written as stored, since the transform is unknown.
    #[instrument(skip(self, writer, ctx), err)]
    pub fn extract_to<W: Write>(
        &self,
        id: ItemId,
        writer: &mut W,
        ctx: &OperationContext,
    ) -> Result<u64> {
        let item = self.items.get(id).ok_or(Error::ItemNotFound(id))?;
        if item.is_directory() {
            return Err(Error::InvalidOperation(format!(
                "item {id} is a directory"
            )));
        }

        let mut reader = item.source().open(&self.items)?;
        if item.flags().is_transformed() {
            warn!(%id, name = item.file_name(), "data is transformed, extracting it as stored");
            let copied = io::copy(&mut reader, writer)?;
            ctx.advance(copied);
            return Ok(copied);
        }

        ChunkCompressor::default().decompress(&mut reader, &item.size(), writer, ctx)?;
        Ok(item.extracted_size() as u64)
    }

    /// Extract a file to `dest`, creating missing parent directories.
    ///
    /// `dest` is removed again when the extraction fails.
    pub fn extract_file(
        &self,
        id: ItemId,
        dest: impl AsRef<Path>,
        ctx: &OperationContext,
    ) -> Result<u64> {
        let dest = dest.as_ref();
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(dest)?);
        let result = self.extract_to(id, &mut writer, ctx).and_then(|written| {
            writer.flush()?;
            Ok(written)
        });

        if result.is_err() {
            drop(writer);
            if let Err(e) = fs::remove_file(dest) {
                warn!(dest = %dest.display(), error = %e, "failed to remove partial file");
            }
        }
        result
    }

    /// Extract every item below `dir`, recreating the directory tree.
    ///
    /// A failing item is recorded in the report and the rest are still extracted. Cancellation
    /// stops the whole batch.
    #[instrument(skip(self, ctx), err)]
    pub fn extract_all(&self, dir: &Path, ctx: &OperationContext) -> Result<ExtractReport> {
        ctx.add_total(
            self.items
                .enumerate_by_id()
                .map(|item| item.extracted_size() as u64)
                .sum(),
        );

        let mut report = ExtractReport::default();
        for item in self.items.enumerate_depth_first_by_name() {
            ctx.check()?;

            match self.extract_item(item, dir, ctx) {
                Ok(true) => report.extracted += 1,
                Ok(false) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(id = %item.id(), error = %e, "failed to extract item");
                    report.failures.push((item.id(), e));
                }
            }
        }

        info!(
            extracted = report.extracted,
            failed = report.failures.len(),
            "extraction finished"
        );
        Ok(report)
    }

    fn extract_item(&self, item: &Item, dir: &Path, ctx: &OperationContext) -> Result<bool> {
        let relative = self.items.path_of(item.id())?;
        let dest = safe_join(dir, &relative)?;

        if item.is_directory() {
            fs::create_dir_all(dest)?;
            return Ok(false);
        }

        self.extract_file(item.id(), dest, ctx)?;
        Ok(true)
    }

    /// Write the archive with all pending edits to `dest`.
    ///
    /// The destination is replaced only once the new archive is complete, so `dest` may be the
    /// archive's own path. Open the saved file again to keep editing it.
    pub fn save(
        &self,
        dest: impl AsRef<Path>,
        options: SaveOptions,
        ctx: &OperationContext,
    ) -> Result<SaveReport> {
        ArchiveWriter::save(&self.items, &self.template, dest.as_ref(), options, ctx)
    }
}

/// Join an item path onto `dir`, refusing names that would leave it
fn safe_join(dir: &Path, relative: &str) -> Result<PathBuf> {
    let mut path = dir.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => path.push(name),
            _ => {
                return Err(Error::InvalidOperation(format!(
                    "refusing to extract unsafe path {relative:?}"
                )))
            }
        }
    }
    Ok(path)
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::safe_join;
    use crate::error::Error;

    #[test]
    fn safe_join_keeps_normal_paths() -> crate::error::Result<()> {
        let path = safe_join(Path::new("out"), "dir/file.txt")?;
        assert_eq!(path, Path::new("out").join("dir").join("file.txt"));
        Ok(())
    }

    #[test]
    fn safe_join_rejects_escapes() {
        assert!(matches!(
            safe_join(Path::new("out"), "../etc/shadow"),
            Err(Error::InvalidOperation(_))
        ));
        assert!(matches!(
            safe_join(Path::new("out"), "/etc/shadow"),
            Err(Error::InvalidOperation(_))
        ));
    }
}
