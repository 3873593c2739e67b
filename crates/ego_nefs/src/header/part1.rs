//! Header part 1: where each item's data lives.

use std::io::{Seek, Write};

use binrw::{BinRead, BinWrite};
use indexmap::IndexMap;

use super::format::ChunkRecord;
use super::part2::Part2;
use super::part4::Part4;
use super::{index_by_id, read_entries, write_entries};
use crate::error::{Error, HeaderSection, Result};
use crate::item::ItemId;
use crate::list::ItemList;
use crate::source::DataSource;

/// Part 4 index of items stored without compression
pub const NO_CHUNKS: u32 = 0xFFFF_FFFF;

/// Part 4 index written for directories
pub const DIRECTORY_CHUNKS: u32 = 0;

/// Part 1 entry, stored in ascending id order
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct Part1Entry {
    /// Absolute offset of the item's data in the archive
    pub data_offset: u64,

    /// Index of the item's entry in part 2
    pub metadata_index: u32,

    /// Index of the item's first chunk record in part 4
    pub part4_index: u32,

    pub id: ItemId,
}

impl Part1Entry {
    pub const SIZE: u32 = 0x14;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part1 {
    entries: IndexMap<ItemId, Part1Entry>,
}

impl Part1 {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        let section = HeaderSection::Part(1);
        let entries = read_entries(bytes, Part1Entry::SIZE, section)?;
        Ok(Self {
            entries: index_by_id(entries, |e: &Part1Entry| e.id, section)?,
        })
    }

    pub(crate) fn build<C: ChunkRecord>(
        items: &ItemList,
        part2: &Part2,
        part4: &Part4<C>,
    ) -> Result<Self> {
        let mut entries = IndexMap::with_capacity(items.len());
        for item in items.enumerate_by_id() {
            let id = item.id();
            let metadata_index = part2.index_of(id).ok_or_else(|| {
                Error::corrupt(HeaderSection::Part(2), format!("item {id} has no entry"))
            })?;

            let part4_index = if item.is_directory() {
                DIRECTORY_CHUNKS
            } else {
                match part4.span(id) {
                    Some(span) => span.index,
                    None => NO_CHUNKS,
                }
            };

            let data_offset = match item.source() {
                DataSource::Archive(source) if !item.is_directory() => source.offset(),
                _ => 0,
            };

            entries.insert(
                id,
                Part1Entry {
                    data_offset,
                    metadata_index: metadata_index as u32,
                    part4_index,
                    id,
                },
            );
        }

        Ok(Self { entries })
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_entries(writer, self.entries.values())
    }

    pub fn get(&self, id: ItemId) -> Option<&Part1Entry> {
        self.entries.get(&id)
    }

    /// Entries in ascending id order
    pub fn entries(&self) -> impl Iterator<Item = &Part1Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the part on disk
    pub fn size(&self) -> u32 {
        self.entries.len() as u32 * Part1Entry::SIZE
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{Part1, Part1Entry};
    use crate::error::{Error, Result};
    use crate::item::ItemId;

    #[test]
    fn parse_entries() -> Result<()> {
        #[rustfmt::skip]
        let bytes = vec![
            0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0xFF, 0xFF, 0xFF, 0xFF,
            0x00, 0x00, 0x00, 0x00,

            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
        ];

        let part1 = Part1::parse(&bytes)?;
        assert_eq!(part1.len(), 2);
        assert_eq!(part1.size(), 0x28);
        assert_eq!(
            part1.get(ItemId(0)),
            Some(&Part1Entry {
                data_offset: 0x10000,
                metadata_index: 1,
                part4_index: 0xFFFF_FFFF,
                id: ItemId(0),
            })
        );

        Ok(())
    }

    #[test]
    fn duplicate_ids_are_corrupt() {
        let bytes = vec![0u8; 0x28];
        assert!(matches!(
            Part1::parse(&bytes),
            Err(Error::CorruptHeader { .. })
        ));
    }

    #[test]
    fn partial_entry_is_corrupt() {
        let bytes = vec![0u8; 0x15];
        assert!(matches!(
            Part1::parse(&bytes),
            Err(Error::CorruptHeader { .. })
        ));
    }
}
