//! Header part 7: sibling links.

use std::collections::HashMap;
use std::io::{Seek, Write};

use binrw::{BinRead, BinWrite};
use indexmap::IndexMap;

use super::{index_by_id, read_entries, write_entries};
use crate::error::{Error, HeaderSection, Result};
use crate::item::{Item, ItemId};

/// Part 7 entry, stored in depth first order by name
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct Part7Entry {
    /// Next item in the same directory by id; the item itself for the last one
    pub sibling_id: ItemId,
    pub id: ItemId,
}

impl Part7Entry {
    pub const SIZE: u32 = 0x08;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part7 {
    entries: IndexMap<ItemId, Part7Entry>,
}

impl Part7 {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        let section = HeaderSection::Part(7);
        let entries = read_entries(bytes, Part7Entry::SIZE, section)?;
        Ok(Self {
            entries: index_by_id(entries, |e: &Part7Entry| e.id, section)?,
        })
    }

    /// Build from items in depth first order by name
    pub(crate) fn build(order: &[&Item], siblings: &HashMap<ItemId, ItemId>) -> Result<Self> {
        let mut entries = IndexMap::with_capacity(order.len());
        for item in order {
            let id = item.id();
            let sibling_id = *siblings.get(&id).ok_or_else(|| {
                Error::corrupt(HeaderSection::Tree, format!("item {id} has no level"))
            })?;
            entries.insert(id, Part7Entry { sibling_id, id });
        }
        Ok(Self { entries })
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_entries(writer, self.entries.values())
    }

    pub fn get(&self, id: ItemId) -> Option<&Part7Entry> {
        self.entries.get(&id)
    }

    /// Entries in the order they are stored
    pub fn entries(&self) -> impl Iterator<Item = &Part7Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size(&self) -> u32 {
        self.entries.len() as u32 * Part7Entry::SIZE
    }
}
