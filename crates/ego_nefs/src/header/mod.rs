//! The archive header.
//!
//! A header starts with a fixed [`intro::NefsIntro`] and [`toc`], followed by eight parts placed at
//! the offsets the table of contents lists. Parts 1, 2, 6 and 7 hold one entry per item; the rest
//! hold strings, chunk tables and archive wide values. Versions 1.6 and 2.0 share this structure
//! and differ only in the layouts chosen by [`format::HeaderFormat`].

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use binrw::{BinRead, BinWrite};
use indexmap::IndexMap;
use tracing::instrument;

use crate::error::{Error, HeaderSection, Result};
use crate::item::{ItemFlags, ItemId};
use crate::list::ItemList;

pub mod format;
pub mod intro;
mod nefs;
pub mod part1;
pub mod part2;
pub mod part3;
pub mod part4;
pub mod part5;
pub mod part6;
pub mod part7;
pub mod part8;
pub mod toc;

pub use format::{HeaderFormat, Nefs16, Nefs20, NefsVersion};
pub use intro::{NefsIntro, INTRO_SIZE, NEFS_MAGIC};
pub use nefs::NefsHeader;
pub use toc::Toc;

/// Offset of the first part; everything before it is the intro and table of contents
pub const PARTS_OFFSET: u32 = 0x100;

/// Offset of the first item data in most archives
pub const DATA_OFFSET_DEFAULT: u64 = 0x10000;

/// Offset of the first item data when the header needs more room
pub const DATA_OFFSET_LARGE: u64 = 0x50000;

/// Where item data starts for a header of `header_size` bytes
pub fn data_offset_for(header_size: u32) -> u64 {
    let header_size = header_size as u64;
    if header_size <= DATA_OFFSET_DEFAULT {
        DATA_OFFSET_DEFAULT
    } else if header_size <= DATA_OFFSET_LARGE {
        DATA_OFFSET_LARGE
    } else {
        header_size.div_ceil(DATA_OFFSET_DEFAULT) * DATA_OFFSET_DEFAULT
    }
}

/// Placement of item data in the archive a header describes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataLayout {
    pub first_data_offset: u64,
    pub archive_size: u64,
}

/// Header values that are carried over when an archive is rebuilt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTemplate {
    pub intro: NefsIntro,
    /// Table of contents; its variant selects the header version
    pub toc: Toc,
    pub part8: Vec<u8>,
    /// Name recorded in part 5. Saving fills in the destination file name when this is `None`.
    pub archive_name: Option<String>,
}

impl HeaderTemplate {
    /// Template for a new archive
    pub fn new(version: NefsVersion) -> Self {
        Self {
            intro: NefsIntro {
                version: version.raw(),
                ..Default::default()
            },
            toc: Toc::new(version),
            part8: Vec::new(),
            archive_name: None,
        }
    }

    pub fn version(&self) -> NefsVersion {
        self.toc.version()
    }

    /// Same template for another version. The table of contents is reset when the version changes.
    pub fn with_version(self, version: NefsVersion) -> Self {
        if version == self.version() {
            return self;
        }

        Self {
            intro: NefsIntro {
                version: version.raw(),
                ..self.intro
            },
            toc: Toc::new(version),
            ..self
        }
    }

    pub fn with_archive_name(self, name: impl Into<String>) -> Self {
        Self {
            archive_name: Some(name.into()),
            ..self
        }
    }
}

/// A parsed or built header of any supported version
#[derive(Debug, Clone)]
pub enum Header {
    V16(NefsHeader<Nefs16>),
    V20(NefsHeader<Nefs20>),
}

macro_rules! dispatch {
    ($self:ident, $header:ident => $e:expr) => {
        match $self {
            Header::V16($header) => $e,
            Header::V20($header) => $e,
        }
    };
}

impl Header {
    /// Decode a header from the start of `bytes`
    #[instrument(skip(bytes), err)]
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let intro = read_intro(bytes)?;
        let version =
            NefsVersion::from_raw(intro.version).ok_or(Error::UnsupportedVersion(intro.version))?;

        let header_size = intro.header_size as usize;
        if header_size > bytes.len() {
            return Err(Error::corrupt(
                HeaderSection::Intro,
                format!(
                    "header size {header_size:#x} exceeds the {:#x} bytes available",
                    bytes.len()
                ),
            ));
        }

        let bytes = &bytes[..header_size];
        Ok(match version {
            NefsVersion::V16 => Header::V16(NefsHeader::parse(bytes, intro)?),
            NefsVersion::V20 => Header::V20(NefsHeader::parse(bytes, intro)?),
        })
    }

    /// Read and decode the header at the start of an archive
    #[instrument(skip(reader), err)]
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let truncated = |e: io::Error| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::corrupt(HeaderSection::Intro, "file ends inside the header")
            }
            _ => Error::IOError(e),
        };

        reader.seek(SeekFrom::Start(0))?;
        let mut bytes = vec![0u8; INTRO_SIZE as usize];
        reader.read_exact(&mut bytes).map_err(truncated)?;

        let intro = read_intro(&bytes)?;
        let length = reader.seek(SeekFrom::End(0))?;
        if intro.header_size as u64 > length {
            return Err(Error::corrupt(
                HeaderSection::Intro,
                format!(
                    "header size {:#x} exceeds the {length:#x} byte file",
                    intro.header_size
                ),
            ));
        }

        reader.seek(SeekFrom::Start(INTRO_SIZE as u64))?;
        bytes.resize(intro.header_size.max(INTRO_SIZE) as usize, 0);
        reader
            .read_exact(&mut bytes[INTRO_SIZE as usize..])
            .map_err(truncated)?;

        Header::parse(&bytes)
    }

    /// Build a header describing `items`.
    ///
    /// Archive data sources give the data offsets recorded in part 1; items with any other source
    /// are recorded at offset 0.
    pub fn build(template: &HeaderTemplate, items: &ItemList, layout: DataLayout) -> Result<Self> {
        Ok(match template.version() {
            NefsVersion::V16 => Header::V16(NefsHeader::build(template, items, layout)?),
            NefsVersion::V20 => Header::V20(NefsHeader::build(template, items, layout)?),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        dispatch!(self, h => h.to_bytes())
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    pub fn version(&self) -> NefsVersion {
        match self {
            Header::V16(_) => NefsVersion::V16,
            Header::V20(_) => NefsVersion::V20,
        }
    }

    pub fn intro(&self) -> &NefsIntro {
        dispatch!(self, h => h.intro())
    }

    pub fn template(&self) -> HeaderTemplate {
        dispatch!(self, h => h.template())
    }

    pub fn header_size(&self) -> u32 {
        dispatch!(self, h => h.header_size())
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        dispatch!(self, h => h.item_ids())
    }

    pub fn directory_id(&self, id: ItemId) -> Result<ItemId> {
        dispatch!(self, h => h.directory_id(id))
    }

    pub fn file_name(&self, id: ItemId) -> Result<&str> {
        dispatch!(self, h => h.file_name(id))
    }

    pub fn data_offset(&self, id: ItemId) -> Result<u64> {
        dispatch!(self, h => h.data_offset(id))
    }

    pub fn extracted_size(&self, id: ItemId) -> Result<u32> {
        dispatch!(self, h => h.extracted_size(id))
    }

    pub fn chunk_sizes(&self, id: ItemId) -> Result<Option<Vec<u32>>> {
        dispatch!(self, h => h.chunk_sizes(id))
    }

    pub fn chunk_meta(&self, id: ItemId) -> Result<Vec<part4::ChunkMeta>> {
        dispatch!(self, h => h.chunk_meta(id))
    }

    pub fn flags(&self, id: ItemId) -> Result<ItemFlags> {
        dispatch!(self, h => h.flags(id))
    }

    pub fn volume(&self, id: ItemId) -> Result<u16> {
        dispatch!(self, h => h.volume(id))
    }

    pub fn first_data_offset(&self) -> u64 {
        dispatch!(self, h => h.first_data_offset())
    }

    pub fn archive_size(&self) -> u64 {
        dispatch!(self, h => h.archive_size())
    }

    pub fn archive_name(&self) -> Result<&str> {
        dispatch!(self, h => h.archive_name())
    }
}

fn read_intro(bytes: &[u8]) -> Result<NefsIntro> {
    if bytes.len() < INTRO_SIZE as usize {
        return Err(Error::corrupt(
            HeaderSection::Intro,
            format!("expected {INTRO_SIZE:#x} bytes, found {:#x}", bytes.len()),
        ));
    }

    let intro = NefsIntro::read(&mut Cursor::new(bytes))?;
    if intro.magic != NEFS_MAGIC {
        return Err(Error::corrupt(
            HeaderSection::Intro,
            format!("bad magic {:#010x}", intro.magic),
        ));
    }

    if intro.header_size < PARTS_OFFSET {
        return Err(Error::corrupt(
            HeaderSection::Intro,
            format!("header size {:#x} is too small", intro.header_size),
        ));
    }

    Ok(intro)
}

/// Decode a part made of fixed size entries
pub(crate) fn read_entries<T>(bytes: &[u8], entry_size: u32, section: HeaderSection) -> Result<Vec<T>>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    let entry_size = entry_size as usize;
    if bytes.len() % entry_size != 0 {
        return Err(Error::corrupt(
            section,
            format!(
                "size {:#x} is not a multiple of the {entry_size:#x} byte entry",
                bytes.len()
            ),
        ));
    }

    let mut reader = Cursor::new(bytes);
    (0..bytes.len() / entry_size)
        .map(|_| Ok(T::read_le(&mut reader)?))
        .collect()
}

pub(crate) fn write_entries<'a, T, W>(
    writer: &mut W,
    entries: impl IntoIterator<Item = &'a T>,
) -> Result<()>
where
    T: for<'b> BinWrite<Args<'b> = ()> + 'a,
    W: Write + Seek,
{
    for entry in entries {
        entry.write_le(writer)?;
    }
    Ok(())
}

/// Key entries by id, rejecting repeats
pub(crate) fn index_by_id<T>(
    entries: Vec<T>,
    id: impl Fn(&T) -> ItemId,
    section: HeaderSection,
) -> Result<IndexMap<ItemId, T>> {
    let mut indexed = IndexMap::with_capacity(entries.len());
    for entry in entries {
        let key = id(&entry);
        if indexed.insert(key, entry).is_some() {
            return Err(Error::corrupt(section, format!("item {key} appears twice")));
        }
    }
    Ok(indexed)
}
