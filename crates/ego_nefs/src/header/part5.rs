//! Header part 5: archive wide values.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::error::{Error, HeaderSection, Result};

#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct Part5 {
    /// Total size of the archive file
    pub archive_size: u64,

    /// Offset of the archive name in part 3
    pub archive_name_offset: u32,

    /// Offset of the first byte of item data
    pub first_data_offset: u32,
}

impl Part5 {
    pub const SIZE: u32 = 0x10;

    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE as usize {
            return Err(Error::corrupt(
                HeaderSection::Part(5),
                format!("expected {:#x} bytes, found {:#x}", Self::SIZE, bytes.len()),
            ));
        }

        Ok(Self::read(&mut Cursor::new(bytes))?)
    }
}
