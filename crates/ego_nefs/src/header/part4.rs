//! Header part 4: chunk tables of compressed items.

use std::collections::BTreeSet;
use std::io::{Seek, Write};

use binrw::{BinRead, BinWrite};
use indexmap::IndexMap;

use super::format::ChunkRecord;
use super::part1::{Part1, NO_CHUNKS};
use super::{read_entries, write_entries};
use crate::error::{Error, HeaderSection, Result};
use crate::item::ItemId;
use crate::list::ItemList;
use crate::source::DataSource;

/// Values a version 2.0 chunk record holds besides its size.
///
/// Items copied from an archive keep them; newly compressed chunks get zeroes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkMeta {
    pub transform: u16,
    pub checksum: u16,
}

/// Version 1.6 chunk record
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct Chunk16 {
    pub cumulative_size: u32,
}

impl ChunkRecord for Chunk16 {
    const SIZE: u32 = 0x04;

    fn new(cumulative_size: u32, _meta: ChunkMeta) -> Self {
        Self { cumulative_size }
    }

    fn cumulative_size(&self) -> u32 {
        self.cumulative_size
    }
}

/// Version 2.0 chunk record
#[derive(BinRead, BinWrite, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct Chunk20 {
    pub cumulative_size: u32,

    /// Transform applied to the chunk by the game, kept as read
    pub transform: u16,

    /// Checksum of the chunk, kept as read
    pub checksum: u16,
}

impl ChunkRecord for Chunk20 {
    const SIZE: u32 = 0x08;

    fn new(cumulative_size: u32, meta: ChunkMeta) -> Self {
        Self {
            cumulative_size,
            transform: meta.transform,
            checksum: meta.checksum,
        }
    }

    fn cumulative_size(&self) -> u32 {
        self.cumulative_size
    }

    fn meta(&self) -> ChunkMeta {
        ChunkMeta {
            transform: self.transform,
            checksum: self.checksum,
        }
    }
}

/// Run of chunk records belonging to one item
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Index of the first record
    pub index: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part4<C> {
    records: Vec<C>,
    spans: IndexMap<ItemId, ChunkSpan>,
}

impl<C> Default for Part4<C> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            spans: IndexMap::new(),
        }
    }
}

impl<C: ChunkRecord> Part4<C> {
    /// Read the records and work out which of them belong to each compressed item.
    ///
    /// A span starts at the index part 1 gives for the item and runs until the next index used by
    /// any item, or the end of the part. Items sharing an index share a span.
    pub(crate) fn parse(
        bytes: &[u8],
        part1: &Part1,
        is_directory: impl Fn(ItemId) -> bool,
    ) -> Result<Self> {
        let section = HeaderSection::Part(4);
        let records: Vec<C> = read_entries(bytes, C::SIZE, section)?;

        let compressed: Vec<(ItemId, u32)> = part1
            .entries()
            .filter(|e| e.part4_index != NO_CHUNKS && !is_directory(e.id))
            .map(|e| (e.id, e.part4_index))
            .collect();

        let starts: BTreeSet<u32> = compressed.iter().map(|&(_, index)| index).collect();
        let mut spans = IndexMap::with_capacity(compressed.len());
        for (id, index) in compressed {
            if index as usize >= records.len() {
                return Err(Error::corrupt(
                    section,
                    format!(
                        "item {id} starts at record {index} of {}",
                        records.len()
                    ),
                ));
            }

            let end = starts
                .range(index + 1..)
                .next()
                .map_or(records.len() as u32, |&next| next);
            let span = ChunkSpan {
                index,
                count: end - index,
            };

            let mut previous = 0;
            for record in &records[span.index as usize..end as usize] {
                if record.cumulative_size() < previous {
                    return Err(Error::corrupt(
                        section,
                        format!("chunk sizes of item {id} decrease"),
                    ));
                }
                previous = record.cumulative_size();
            }

            spans.insert(id, span);
        }

        Ok(Self { records, spans })
    }

    /// Records for every compressed item, in ascending id order.
    ///
    /// Archive sources that carry chunk metadata for every chunk have it written back.
    pub(crate) fn build(items: &ItemList) -> Result<Self> {
        let mut part4 = Self::default();
        for item in items.enumerate_by_id() {
            let size = item.size();
            if item.is_directory() || !size.is_compressed() {
                continue;
            }

            let meta: &[ChunkMeta] = match item.source() {
                DataSource::Archive(source)
                    if source.chunk_meta().len() == size.chunk_sizes().len() =>
                {
                    source.chunk_meta()
                }
                _ => &[],
            };

            let span = ChunkSpan {
                index: part4.records.len() as u32,
                count: size.chunk_sizes().len() as u32,
            };

            let mut cumulative = 0u32;
            for (i, &chunk) in size.chunk_sizes().iter().enumerate() {
                cumulative = cumulative.checked_add(chunk).ok_or_else(|| {
                    Error::ItemTooLarge(size.compressed_size())
                })?;
                part4
                    .records
                    .push(C::new(cumulative, meta.get(i).copied().unwrap_or_default()));
            }

            part4.spans.insert(item.id(), span);
        }

        Ok(part4)
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        write_entries(writer, &self.records)
    }

    /// Chunk span of a compressed item
    pub fn span(&self, id: ItemId) -> Option<ChunkSpan> {
        self.spans.get(&id).copied()
    }

    /// Per chunk compressed sizes of an item, or `None` when it has no chunks
    pub fn chunk_sizes(&self, id: ItemId) -> Option<Vec<u32>> {
        let span = self.span(id)?;
        let records = &self.records[span.index as usize..(span.index + span.count) as usize];

        let mut previous = 0;
        Some(
            records
                .iter()
                .map(|record| {
                    let size = record.cumulative_size().saturating_sub(previous);
                    previous = record.cumulative_size();
                    size
                })
                .collect(),
        )
    }

    /// Metadata of each chunk of an item; empty when it has no chunks
    pub fn chunk_meta(&self, id: ItemId) -> Vec<ChunkMeta> {
        self.span(id)
            .map(|span| {
                self.records[span.index as usize..(span.index + span.count) as usize]
                    .iter()
                    .map(C::meta)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn records(&self) -> &[C] {
        &self.records
    }

    pub fn size(&self) -> u32 {
        self.records.len() as u32 * C::SIZE
    }
}
