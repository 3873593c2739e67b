//! The fixed size block at the start of every archive.

use binrw::{BinRead, BinWrite};

/// "NeFS" read as a little endian `u32`
pub const NEFS_MAGIC: u32 = 0x5346_654E;

/// Size of [`NefsIntro`] on disk
pub const INTRO_SIZE: u32 = 0x80;

/// Header intro
///
/// Always found at offset 0. The hash and key fields are carried through edits without being
/// interpreted.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct NefsIntro {
    /// Must be [`NEFS_MAGIC`]
    pub magic: u32,

    /// Hash the game expects for the header
    pub expected_hash: [u8; 32],

    /// Key used when the header is encrypted
    pub aes_key: [u8; 64],

    /// Size of the whole header, intro included
    pub header_size: u32,

    /// Format version, see [`super::NefsVersion`]
    pub version: u32,

    /// Number of volumes the archive data is spread over
    pub volume_count: u32,

    pub reserved: [u8; 16],
}

impl Default for NefsIntro {
    fn default() -> Self {
        Self {
            magic: NEFS_MAGIC,
            expected_hash: [0; 32],
            aes_key: [0; 64],
            header_size: 0,
            version: 0,
            volume_count: 1,
            reserved: [0; 16],
        }
    }
}
