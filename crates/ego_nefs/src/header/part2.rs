//! Header part 2: tree structure and extracted sizes.

use std::io::{Seek, Write};

use binrw::{BinRead, BinWrite};
use indexmap::IndexMap;

use super::part3::Part3;
use super::{index_by_id, read_entries, write_entries};
use crate::error::{Error, HeaderSection, Result};
use crate::item::{Item, ItemId};

/// Part 2 entry, stored in depth first order by name
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct Part2Entry {
    /// Containing directory, or the item's own id at the root
    pub directory_id: ItemId,

    /// First child by name of a non-empty directory, otherwise the item's own id
    pub first_child_id: ItemId,

    /// Offset of the item's name in part 3
    pub name_offset: u32,

    pub extracted_size: u32,

    pub id: ItemId,
}

impl Part2Entry {
    pub const SIZE: u32 = 0x14;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part2 {
    entries: IndexMap<ItemId, Part2Entry>,
}

impl Part2 {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        let section = HeaderSection::Part(2);
        let entries = read_entries(bytes, Part2Entry::SIZE, section)?;
        Ok(Self {
            entries: index_by_id(entries, |e: &Part2Entry| e.id, section)?,
        })
    }

    /// Build from items in depth first order by name
    pub(crate) fn build(order: &[&Item], part3: &Part3) -> Result<Self> {
        let mut entries = IndexMap::with_capacity(order.len());
        for (i, item) in order.iter().enumerate() {
            let id = item.id();

            // In depth first order the first child of a directory comes right after it.
            let first_child_id = match order.get(i + 1) {
                Some(next) if item.is_directory() && !next.is_root() && next.directory_id() == id => {
                    next.id()
                }
                _ => id,
            };

            let name_offset = part3.offset_of(item.file_name()).ok_or_else(|| {
                Error::corrupt(
                    HeaderSection::Part(3),
                    format!("name of item {id} is missing"),
                )
            })?;

            entries.insert(
                id,
                Part2Entry {
                    directory_id: item.directory_id(),
                    first_child_id,
                    name_offset,
                    extracted_size: item.extracted_size(),
                    id,
                },
            );
        }

        Ok(Self { entries })
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_entries(writer, self.entries.values())
    }

    pub fn get(&self, id: ItemId) -> Option<&Part2Entry> {
        self.entries.get(&id)
    }

    /// Position of the item's entry in the part
    pub fn index_of(&self, id: ItemId) -> Option<usize> {
        self.entries.get_index_of(&id)
    }

    pub fn get_index(&self, index: usize) -> Option<&Part2Entry> {
        self.entries.get_index(index).map(|(_, e)| e)
    }

    /// Ids in the order they are stored
    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.entries.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Part2Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size(&self) -> u32 {
        self.entries.len() as u32 * Part2Entry::SIZE
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::Part2;
    use crate::error::Result;
    use crate::header::part3::Part3;
    use crate::item::{Item, ItemFlags, ItemId};
    use crate::list::ItemList;
    use crate::source::{DataSource, MemorySource};

    #[test]
    fn first_child_follows_name_order() -> Result<()> {
        let mut items = ItemList::new("a.nefs");
        let dir = items.add_directory(None, "dir")?;
        let b = items.add_file(
            Some(dir),
            "b",
            DataSource::Memory(MemorySource::new(vec![1, 2])),
            ItemFlags::empty(),
        )?;
        let a = items.add_file(
            Some(dir),
            "a",
            DataSource::Memory(MemorySource::new(vec![1])),
            ItemFlags::empty(),
        )?;
        let empty = items.add_directory(None, "empty")?;

        let order: Vec<&Item> = items.enumerate_depth_first_by_name().collect();
        let part3 = Part3::from_names(order.iter().map(|i| i.file_name()));
        let part2 = Part2::build(&order, &part3)?;

        assert_eq!(part2.ids().collect::<Vec<_>>(), vec![dir, a, b, empty]);
        assert_eq!(part2.get(dir).map(|e| e.first_child_id), Some(a));
        assert_eq!(part2.get(a).map(|e| e.first_child_id), Some(a));
        assert_eq!(part2.get(empty).map(|e| e.first_child_id), Some(empty));
        assert_eq!(part2.get(b).map(|e| e.extracted_size), Some(2));
        assert_eq!(part2.get(b).map(|e| e.directory_id), Some(dir));
        assert_eq!(part2.index_of(b), Some(2));
        assert_eq!(part2.get(ItemId(99)), None);

        Ok(())
    }
}
