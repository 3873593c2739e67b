//! Sources of item data.
//!
//! An item's bytes can live in the archive being edited, in another file on disk, or in memory.
//! Directories have no data at all.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::header::part4::ChunkMeta;
use crate::list::ItemList;
use crate::size::ItemSize;

/// Where the data for an item is read from
#[derive(Debug, Clone, Default)]
pub enum DataSource {
    /// Data stored in the archive backing the [`ItemList`]
    Archive(ArchiveSource),
    /// Data stored in a file on disk
    File(FileSource),
    /// Data held in memory
    Memory(MemorySource),
    /// No data, used by directories
    #[default]
    Empty,
}

/// Location of the bytes a data source reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLocator<'a> {
    /// A region of a file starting at `offset`
    File { path: &'a Path, offset: u64 },
    /// A buffer in memory
    Memory,
    /// Nothing to read
    None,
}

/// Data already stored in the archive the item list was read from.
///
/// The file path is not kept here; it is looked up from the owning [`ItemList`] whenever the data
/// is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    offset: u64,
    size: ItemSize,
    chunk_meta: Vec<ChunkMeta>,
}

impl ArchiveSource {
    pub fn new(offset: u64, size: ItemSize) -> Self {
        Self {
            offset,
            size,
            chunk_meta: Vec::new(),
        }
    }

    /// Keep the per chunk metadata the header recorded for this data
    pub fn with_chunk_meta(self, chunk_meta: Vec<ChunkMeta>) -> Self {
        Self { chunk_meta, ..self }
    }

    /// Absolute offset of the stored data in the archive
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> &ItemSize {
        &self.size
    }

    pub fn chunk_meta(&self) -> &[ChunkMeta] {
        &self.chunk_meta
    }
}

/// Data stored in a file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    path: PathBuf,
    offset: u64,
    size: ItemSize,
    precompressed: bool,
}

impl FileSource {
    /// Use the whole file as uncompressed replacement data
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let size = raw_size(std::fs::metadata(&path)?.len())?;
        Ok(Self::region(path, 0, size.extracted_size()))
    }

    /// Use `length` uncompressed bytes starting at `offset`
    pub fn region(path: impl Into<PathBuf>, offset: u64, length: u32) -> Self {
        Self {
            path: path.into(),
            offset,
            size: ItemSize::raw(length),
            precompressed: false,
        }
    }

    /// Use data that is already stored in archive form, such as an item copied out of another
    /// archive. The bytes are written as they are when saving.
    pub fn precompressed(path: impl Into<PathBuf>, offset: u64, size: ItemSize) -> Self {
        Self {
            path: path.into(),
            offset,
            size,
            precompressed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> &ItemSize {
        &self.size
    }
}

/// Uncompressed data held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Size of `length` uncompressed bytes, which must fit the 32 bit size fields of the header
fn raw_size(length: u64) -> Result<ItemSize> {
    u32::try_from(length)
        .map(ItemSize::raw)
        .map_err(|_| Error::ItemTooLarge(length))
}

impl DataSource {
    /// Fail with [`Error::ItemTooLarge`] when the data cannot be recorded in a header
    pub fn check_size(&self) -> Result<()> {
        if let DataSource::Memory(s) = self {
            raw_size(s.data.len() as u64)?;
        }
        Ok(())
    }

    /// Size information for the data
    pub fn size(&self) -> ItemSize {
        match self {
            DataSource::Archive(s) => s.size.clone(),
            DataSource::File(s) => s.size.clone(),
            // Items reject oversized buffers through `check_size`
            DataSource::Memory(s) => raw_size(s.data.len() as u64).unwrap_or_default(),
            DataSource::Empty => ItemSize::default(),
        }
    }

    /// Number of bytes [`DataSource::open`] yields
    pub fn stored_len(&self) -> u64 {
        match self {
            DataSource::Memory(s) => s.data.len() as u64,
            _ => self.size().compressed_size(),
        }
    }

    /// Where the data is read from, resolving archive data through `items`
    pub fn locator<'a>(&'a self, items: &'a ItemList) -> SourceLocator<'a> {
        match self {
            DataSource::Archive(s) => SourceLocator::File {
                path: items.data_file_path(),
                offset: s.offset,
            },
            DataSource::File(s) => SourceLocator::File {
                path: &s.path,
                offset: s.offset,
            },
            DataSource::Memory(_) => SourceLocator::Memory,
            DataSource::Empty => SourceLocator::None,
        }
    }

    /// Whether the data must be compressed before it is written to an archive
    pub fn requires_compression(&self) -> bool {
        match self {
            DataSource::Archive(_) | DataSource::Empty => false,
            DataSource::File(s) => !s.precompressed,
            DataSource::Memory(_) => true,
        }
    }

    /// Whether this is the empty source used by directories
    pub fn is_empty(&self) -> bool {
        matches!(self, DataSource::Empty)
    }

    /// Open a reader over the stored bytes.
    ///
    /// For archive and precompressed sources these are the compressed chunks; for the others they
    /// are the raw data.
    pub fn open(&self, items: &ItemList) -> Result<Box<dyn Read + Send>> {
        let length = self.stored_len();
        Ok(match self.locator(items) {
            SourceLocator::File { path, offset } => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(offset))?;
                Box::new(BufReader::new(file).take(length))
            }
            SourceLocator::Memory => match self {
                DataSource::Memory(s) => Box::new(Cursor::new(s.data.clone())),
                _ => Box::new(io::empty()),
            },
            SourceLocator::None => Box::new(io::empty()),
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::{raw_size, ArchiveSource, DataSource, FileSource, MemorySource, SourceLocator};
    use crate::error::{Error, Result};
    use crate::list::ItemList;
    use crate::size::ItemSize;

    #[test]
    fn archive_source_resolves_through_list() {
        let items = ItemList::new("game.nefs");
        let source = DataSource::Archive(ArchiveSource::new(
            0x10000,
            ItemSize::compressed(100, vec![40]),
        ));

        assert_eq!(
            source.locator(&items),
            SourceLocator::File {
                path: Path::new("game.nefs"),
                offset: 0x10000
            }
        );
        assert!(!source.requires_compression());
        assert_eq!(source.stored_len(), 40);
    }

    #[test]
    fn compression_requirements() {
        assert!(DataSource::Memory(MemorySource::new(vec![1])).requires_compression());
        assert!(DataSource::File(FileSource::region("a.bin", 0, 5)).requires_compression());
        assert!(!DataSource::File(FileSource::precompressed(
            "b.nefs",
            16,
            ItemSize::compressed(5, vec![3])
        ))
        .requires_compression());
        assert!(!DataSource::Empty.requires_compression());
        assert_eq!(DataSource::Empty.size(), ItemSize::default());
    }

    #[test]
    fn open_reads_file_region() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"0123456789")?;

        let items = ItemList::new(file.path());
        let source = DataSource::Archive(ArchiveSource::new(2, ItemSize::raw(5)));

        let mut buffer = Vec::new();
        source.open(&items)?.read_to_end(&mut buffer)?;
        assert_eq!(buffer, b"23456");

        let source = DataSource::File(FileSource::new(file.path())?);
        assert_eq!(source.size(), ItemSize::raw(10));

        Ok(())
    }

    #[test]
    fn open_reads_memory() -> Result<()> {
        let items = ItemList::new("unused.nefs");
        let source = DataSource::Memory(MemorySource::new(b"hello".to_vec()));

        let mut buffer = Vec::new();
        source.open(&items)?.read_to_end(&mut buffer)?;
        assert_eq!(buffer, b"hello");
        assert_eq!(source.size().extracted_size(), 5);

        Ok(())
    }

    #[test]
    fn raw_size_must_fit_header() -> Result<()> {
        assert_eq!(raw_size(5)?, ItemSize::raw(5));
        assert_eq!(raw_size(u32::MAX as u64)?, ItemSize::raw(u32::MAX));
        assert!(matches!(
            raw_size(u32::MAX as u64 + 1),
            Err(Error::ItemTooLarge(0x1_0000_0000))
        ));
        assert!(DataSource::Memory(MemorySource::new(vec![0; 16])).check_size().is_ok());
        Ok(())
    }
}
