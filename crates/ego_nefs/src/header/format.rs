//! Per version layout choices of the header.

use std::fmt::{self, Debug};

use binrw::{BinRead, BinWrite};

use super::part4::{Chunk16, Chunk20, ChunkMeta};
use super::part6::{Flags16, Flags20};
use super::toc::{Toc, Toc16, Toc20};
use crate::item::ItemFlags;

/// Intro version value of 1.6 headers
pub const VERSION_16: u32 = 0x10600;

/// Intro version value of 2.0 headers
pub const VERSION_20: u32 = 0x20000;

/// Supported header versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NefsVersion {
    /// Version 1.6
    V16,
    /// Version 2.0
    V20,
}

impl NefsVersion {
    /// Value stored in the intro
    pub const fn raw(self) -> u32 {
        match self {
            NefsVersion::V16 => VERSION_16,
            NefsVersion::V20 => VERSION_20,
        }
    }

    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            VERSION_16 => Some(NefsVersion::V16),
            VERSION_20 => Some(NefsVersion::V20),
            _ => None,
        }
    }
}

impl fmt::Display for NefsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NefsVersion::V16 => write!(f, "1.6"),
            NefsVersion::V20 => write!(f, "2.0"),
        }
    }
}

/// A table of contents layout
pub trait TableOfContents:
    for<'a> BinRead<Args<'a> = ()> + for<'a> BinWrite<Args<'a> = ()> + Debug + Clone + Default
{
    /// Offsets of parts 1 to 8 from the start of the header
    fn part_offsets(&self) -> [u32; 8];

    fn set_part_offsets(&mut self, offsets: [u32; 8]);
}

/// A part 4 record holding the cumulative size of one chunk
pub trait ChunkRecord:
    for<'a> BinRead<Args<'a> = ()> + for<'a> BinWrite<Args<'a> = ()> + Debug + Clone + PartialEq
{
    /// Bytes per record
    const SIZE: u32;

    /// A record for a freshly built header. Layouts without room for `meta` drop it.
    fn new(cumulative_size: u32, meta: ChunkMeta) -> Self;

    /// Compressed bytes of the item up to and including this chunk
    fn cumulative_size(&self) -> u32;

    fn meta(&self) -> ChunkMeta {
        ChunkMeta::default()
    }
}

/// A part 6 record
pub trait FlagRecord:
    for<'a> BinRead<Args<'a> = ()> + for<'a> BinWrite<Args<'a> = ()> + Debug + Clone + PartialEq
{
    /// Bytes per record
    const SIZE: u32;

    fn from_item(flags: ItemFlags, volume: u16) -> Self;

    fn flags(&self) -> ItemFlags;

    fn volume(&self) -> u16;
}

/// Selects the layouts that differ between header versions
pub trait HeaderFormat: Debug + Clone + Copy + Default + Send + Sync + 'static {
    /// Value stored in the intro
    const VERSION: u32;

    type Toc: TableOfContents;
    type Chunk: ChunkRecord;
    type Flags: FlagRecord;

    fn wrap_toc(toc: Self::Toc) -> Toc;

    /// The table of contents of a template, or a default one when the template is for a different
    /// version
    fn unwrap_toc(toc: &Toc) -> Self::Toc;
}

/// Version 1.6 layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Nefs16;

/// Version 2.0 layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Nefs20;

impl HeaderFormat for Nefs16 {
    const VERSION: u32 = VERSION_16;

    type Toc = Toc16;
    type Chunk = Chunk16;
    type Flags = Flags16;

    fn wrap_toc(toc: Self::Toc) -> Toc {
        Toc::V16(toc)
    }

    fn unwrap_toc(toc: &Toc) -> Self::Toc {
        match toc {
            Toc::V16(toc) => toc.clone(),
            Toc::V20(_) => Toc16::default(),
        }
    }
}

impl HeaderFormat for Nefs20 {
    const VERSION: u32 = VERSION_20;

    type Toc = Toc20;
    type Chunk = Chunk20;
    type Flags = Flags20;

    fn wrap_toc(toc: Self::Toc) -> Toc {
        Toc::V20(toc)
    }

    fn unwrap_toc(toc: &Toc) -> Self::Toc {
        match toc {
            Toc::V20(toc) => toc.clone(),
            Toc::V16(_) => Toc20::default(),
        }
    }
}
