//! Table of contents following the intro.

use binrw::{BinRead, BinWrite};

use super::format::{NefsVersion, TableOfContents};

/// Offset of the table of contents from the start of the header
pub const TOC_OFFSET: u32 = 0x80;

/// Size of the table of contents on disk, for either version
pub const TOC_SIZE: u32 = 0x80;

/// Version 1.6 table of contents
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct Toc16 {
    pub part_offsets: [u32; 8],
    pub reserved: [u8; 0x60],
}

impl Default for Toc16 {
    fn default() -> Self {
        Self {
            part_offsets: [0; 8],
            reserved: [0; 0x60],
        }
    }
}

impl TableOfContents for Toc16 {
    fn part_offsets(&self) -> [u32; 8] {
        self.part_offsets
    }

    fn set_part_offsets(&mut self, offsets: [u32; 8]) {
        self.part_offsets = offsets;
    }
}

/// Version 2.0 table of contents
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct Toc20 {
    pub volume_count: u16,
    pub hash_block_shift: u16,
    pub part_offsets: [u32; 8],
    pub reserved: [u8; 0x5C],
}

impl Default for Toc20 {
    fn default() -> Self {
        Self {
            volume_count: 1,
            hash_block_shift: 0,
            part_offsets: [0; 8],
            reserved: [0; 0x5C],
        }
    }
}

impl TableOfContents for Toc20 {
    fn part_offsets(&self) -> [u32; 8] {
        self.part_offsets
    }

    fn set_part_offsets(&mut self, offsets: [u32; 8]) {
        self.part_offsets = offsets;
    }
}

/// Table of contents of either version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toc {
    V16(Toc16),
    V20(Toc20),
}

impl Toc {
    /// Empty table of contents for `version`
    pub fn new(version: NefsVersion) -> Self {
        match version {
            NefsVersion::V16 => Toc::V16(Toc16::default()),
            NefsVersion::V20 => Toc::V20(Toc20::default()),
        }
    }

    pub fn version(&self) -> NefsVersion {
        match self {
            Toc::V16(_) => NefsVersion::V16,
            Toc::V20(_) => NefsVersion::V20,
        }
    }

    pub fn part_offsets(&self) -> [u32; 8] {
        match self {
            Toc::V16(toc) => toc.part_offsets(),
            Toc::V20(toc) => toc.part_offsets(),
        }
    }
}
