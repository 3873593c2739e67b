//! Items stored in a NeFS archive.

use std::fmt;

use binrw::{BinRead, BinWrite};
use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::header::Header;
use crate::size::ItemSize;
use crate::source::{ArchiveSource, DataSource};

/// Identity of an item within an archive
///
/// Ids are written to the header as little endian `u32` values.
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[brw(little)]
pub struct ItemId(pub u32);

impl ItemId {
    /// Raw value of the id
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ItemId {
    fn from(value: u32) -> Self {
        ItemId(value)
    }
}

bitflags! {
    /// Attribute flags stored in header part 6
    ///
    /// Bits without a name are kept as read so they survive a save.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct ItemFlags: u32 {
        /// The game applies its own transform to the data (probably encryption)
        const TRANSFORMED = 0x01;
        /// The item is a directory
        const DIRECTORY = 0x02;
        /// Meaning unknown
        const DUPLICATED = 0x04;
        /// The game engine may cache the item
        const CACHEABLE = 0x08;
        /// Meaning unknown
        const PATCHED = 0x20;
    }
}

impl ItemFlags {
    /// Flags from a raw header value, unknown bits included
    pub const fn from_raw(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }

    #[must_use]
    pub fn is_transformed(&self) -> bool {
        self.contains(Self::TRANSFORMED)
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.contains(Self::DIRECTORY)
    }

    #[must_use]
    pub fn is_duplicated(&self) -> bool {
        self.contains(Self::DUPLICATED)
    }

    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.contains(Self::CACHEABLE)
    }

    /// Tests the patched bit
    #[must_use]
    pub fn is_patched(&self) -> bool {
        self.contains(Self::PATCHED)
    }

    /// The patched flag as earlier NeFS editors reported it.
    ///
    /// Those tools tested the cacheable bit here instead of the patched bit. Prefer
    /// [`ItemFlags::is_patched`] unless matching their output.
    #[must_use]
    pub fn legacy_is_patched(&self) -> bool {
        self.contains(Self::CACHEABLE)
    }
}

/// Pending modification of an item, applied when the archive is saved
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// No changes
    #[default]
    Unchanged,
    /// A new file
    Added,
    /// A new directory
    DirectoryAdded,
    /// The item's data has a new source
    Replaced,
    /// The item has a new name
    Renamed,
}

/// A file or directory in an archive
#[derive(Debug, Clone)]
pub struct Item {
    id: ItemId,
    file_name: String,
    directory_id: ItemId,
    source: DataSource,
    flags: ItemFlags,
    volume: u16,
    state: ItemState,
}

impl Item {
    /// Create an item.
    ///
    /// `directory_id` is the id of the directory containing the item, or the item's own id when it
    /// sits in the root directory. Directories must use [`DataSource::Empty`].
    pub fn new(
        id: ItemId,
        file_name: impl Into<String>,
        directory_id: ItemId,
        source: DataSource,
        flags: ItemFlags,
        state: ItemState,
    ) -> Result<Self> {
        if flags.is_directory() && !source.is_empty() {
            return Err(Error::InvalidOperation(format!(
                "directory {id} cannot have a data source"
            )));
        }
        source.check_size()?;

        Ok(Self {
            id,
            file_name: file_name.into(),
            directory_id,
            source,
            flags,
            volume: 0,
            state,
        })
    }

    /// Create a directory item
    pub fn directory(
        id: ItemId,
        file_name: impl Into<String>,
        directory_id: ItemId,
        state: ItemState,
    ) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            directory_id,
            source: DataSource::Empty,
            flags: ItemFlags::DIRECTORY,
            volume: 0,
            state,
        }
    }

    /// Create an item from the metadata of a parsed header.
    ///
    /// The data source points into the archive the header was read from.
    pub fn from_header(id: ItemId, header: &Header) -> Result<Self> {
        let flags = header.flags(id)?;
        let directory_id = header.directory_id(id)?;
        let file_name = header.file_name(id)?.to_owned();

        let source = if flags.is_directory() {
            DataSource::Empty
        } else {
            let offset = header.data_offset(id)?;
            let extracted = header.extracted_size(id)?;
            let size = match header.chunk_sizes(id)? {
                Some(chunks) => ItemSize::compressed(extracted, chunks),
                None => ItemSize::raw(extracted),
            };
            DataSource::Archive(
                ArchiveSource::new(offset, size).with_chunk_meta(header.chunk_meta(id)?),
            )
        };

        let mut item = Item::new(
            id,
            file_name,
            directory_id,
            source,
            flags,
            ItemState::Unchanged,
        )?;
        item.volume = header.volume(id)?;
        Ok(item)
    }

    /// Set the volume index recorded in version 2.0 headers
    pub fn with_volume(mut self, volume: u16) -> Self {
        self.volume = volume;
        self
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Id of the containing directory; equal to [`Item::id`] for root items
    pub fn directory_id(&self) -> ItemId {
        self.directory_id
    }

    /// Whether the item sits in the root directory
    pub fn is_root(&self) -> bool {
        self.directory_id == self.id
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn flags(&self) -> ItemFlags {
        self.flags
    }

    pub fn volume(&self) -> u16 {
        self.volume
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn is_directory(&self) -> bool {
        self.flags.is_directory()
    }

    /// Size information of the current data source
    pub fn size(&self) -> ItemSize {
        self.source.size()
    }

    /// Size of the data once extracted
    pub fn extracted_size(&self) -> u32 {
        self.source.size().extracted_size()
    }

    /// Size of the data as stored in the archive
    pub fn compressed_size(&self) -> u64 {
        self.source.size().compressed_size()
    }

    /// Swap the data source and record the pending change
    pub(crate) fn update_source(&mut self, source: DataSource, state: ItemState) -> Result<()> {
        if self.is_directory() {
            return Err(Error::InvalidOperation(format!(
                "cannot replace the data of directory {}",
                self.id
            )));
        }
        source.check_size()?;

        self.source = source;
        self.state = state;
        Ok(())
    }

    pub(crate) fn rename(&mut self, file_name: String) {
        self.file_name = file_name;
        if self.state == ItemState::Unchanged {
            self.state = ItemState::Renamed;
        }
    }

    pub(crate) fn reassign(&mut self, id: ItemId, directory_id: ItemId) {
        self.id = id;
        self.directory_id = directory_id;
    }

    pub(crate) fn set_source_unchecked(&mut self, source: DataSource) {
        self.source = source;
    }

    pub(crate) fn set_state(&mut self, state: ItemState) {
        self.state = state;
    }
}
