//! Header part 6: item flags.

use std::io::{Seek, Write};

use binrw::{BinRead, BinWrite};
use indexmap::IndexMap;

use super::format::FlagRecord;
use super::part2::Part2;
use super::{read_entries, write_entries};
use crate::error::{Error, HeaderSection, Result};
use crate::item::{Item, ItemFlags, ItemId};

/// Version 1.6 flag record
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct Flags16 {
    pub flags: u32,
}

impl FlagRecord for Flags16 {
    const SIZE: u32 = 0x04;

    fn from_item(flags: ItemFlags, _volume: u16) -> Self {
        Self { flags: flags.bits() }
    }

    fn flags(&self) -> ItemFlags {
        ItemFlags::from_raw(self.flags)
    }

    fn volume(&self) -> u16 {
        0
    }
}

/// Version 2.0 flag record
///
/// The byte after the flags has no known meaning. It is exposed as bits 8 to 15 of
/// [`FlagRecord::flags`] so it is written back unchanged.
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct Flags20 {
    pub volume: u16,
    pub flags: u8,
    pub unknown: u8,
}

impl FlagRecord for Flags20 {
    const SIZE: u32 = 0x04;

    fn from_item(flags: ItemFlags, volume: u16) -> Self {
        let bits = flags.bits();
        Self {
            volume,
            flags: (bits & 0xFF) as u8,
            unknown: ((bits >> 8) & 0xFF) as u8,
        }
    }

    fn flags(&self) -> ItemFlags {
        ItemFlags::from_raw(self.flags as u32 | (self.unknown as u32) << 8)
    }

    fn volume(&self) -> u16 {
        self.volume
    }
}

/// Flag records in the same order as part 2. No ids are stored; they come from part 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part6<R> {
    entries: IndexMap<ItemId, R>,
}

impl<R> Default for Part6<R> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<R: FlagRecord> Part6<R> {
    pub(crate) fn parse(bytes: &[u8], part2: &Part2) -> Result<Self> {
        let section = HeaderSection::Part(6);
        let records: Vec<R> = read_entries(bytes, R::SIZE, section)?;
        if records.len() != part2.len() {
            return Err(Error::corrupt(
                section,
                format!("{} entries for {} items", records.len(), part2.len()),
            ));
        }

        Ok(Self {
            entries: part2.ids().zip(records).collect(),
        })
    }

    /// Build from items in depth first order by name
    pub(crate) fn build(order: &[&Item]) -> Self {
        Self {
            entries: order
                .iter()
                .map(|item| (item.id(), R::from_item(item.flags(), item.volume())))
                .collect(),
        }
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_entries(writer, self.entries.values())
    }

    pub fn get(&self, id: ItemId) -> Option<&R> {
        self.entries.get(&id)
    }

    pub fn flags(&self, id: ItemId) -> Option<ItemFlags> {
        self.entries.get(&id).map(FlagRecord::flags)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size(&self) -> u32 {
        self.entries.len() as u32 * R::SIZE
    }
}
