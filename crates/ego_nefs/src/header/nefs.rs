//! A header of one concrete version.

use std::io::Cursor;
use std::ops::Range;

use binrw::{BinRead, BinWrite};
use tracing::{debug, instrument};

use super::format::{FlagRecord, HeaderFormat, TableOfContents};
use super::intro::{NefsIntro, NEFS_MAGIC};
use super::part1::Part1;
use super::part2::Part2;
use super::part3::Part3;
use super::part4::{ChunkMeta, Part4};
use super::part5::Part5;
use super::part6::Part6;
use super::part7::Part7;
use super::part8::Part8;
use super::toc::{TOC_OFFSET, TOC_SIZE};
use super::{DataLayout, HeaderTemplate, PARTS_OFFSET};
use crate::error::{Error, HeaderSection, Result};
use crate::item::{Item, ItemFlags, ItemId};
use crate::list::ItemList;

/// Header with the part layouts selected by `F`
#[derive(Debug, Clone)]
pub struct NefsHeader<F: HeaderFormat> {
    intro: NefsIntro,
    toc: F::Toc,
    part1: Part1,
    part2: Part2,
    part3: Part3,
    part4: Part4<F::Chunk>,
    part5: Part5,
    part6: Part6<F::Flags>,
    part7: Part7,
    part8: Part8,
}

/// Byte ranges of the eight parts, checked against each other and the header size
fn part_ranges(offsets: [u32; 8], header_size: u32) -> Result<[Range<usize>; 8]> {
    let section = HeaderSection::TableOfContents;
    if offsets[0] < PARTS_OFFSET {
        return Err(Error::corrupt(
            section,
            format!("part 1 starts at {:#x}, inside the intro", offsets[0]),
        ));
    }

    let mut bounds = [header_size; 9];
    bounds[..8].copy_from_slice(&offsets);
    for part in 0..8 {
        if bounds[part] > bounds[part + 1] {
            return Err(Error::corrupt(
                section,
                format!(
                    "part {} at {:#x} is out of order or past the header end {header_size:#x}",
                    part + 1,
                    bounds[part]
                ),
            ));
        }
    }

    Ok(std::array::from_fn(|part| {
        bounds[part] as usize..bounds[part + 1] as usize
    }))
}

impl<F: HeaderFormat> NefsHeader<F> {
    /// Decode a header from exactly `intro.header_size` bytes
    pub(crate) fn parse(bytes: &[u8], intro: NefsIntro) -> Result<Self> {
        let toc_range = TOC_OFFSET as usize..(TOC_OFFSET + TOC_SIZE) as usize;
        let toc = F::Toc::read_le(&mut Cursor::new(&bytes[toc_range]))?;
        let ranges = part_ranges(toc.part_offsets(), bytes.len() as u32)?;

        let part1 = Part1::parse(&bytes[ranges[0].clone()])?;
        let part2 = Part2::parse(&bytes[ranges[1].clone()])?;
        let part3 = Part3::parse(&bytes[ranges[2].clone()])?;
        let part5 = Part5::parse(&bytes[ranges[4].clone()])?;
        let part6 = Part6::<F::Flags>::parse(&bytes[ranges[5].clone()], &part2)?;
        let part7 = Part7::parse(&bytes[ranges[6].clone()])?;
        let part8 = Part8::new(bytes[ranges[7].clone()].to_vec());

        validate(&part1, &part2, &part3, &part5, &part7)?;

        let part4 = Part4::<F::Chunk>::parse(&bytes[ranges[3].clone()], &part1, |id| {
            part6.flags(id).is_some_and(|flags| flags.is_directory())
        })?;

        debug!(
            version = F::VERSION,
            items = part1.len(),
            header_size = intro.header_size,
            "parsed header"
        );

        Ok(Self {
            intro,
            toc,
            part1,
            part2,
            part3,
            part4,
            part5,
            part6,
            part7,
            part8,
        })
    }

    /// Build a header describing `items`
    #[instrument(skip(template, items), err)]
    pub(crate) fn build(
        template: &HeaderTemplate,
        items: &ItemList,
        layout: DataLayout,
    ) -> Result<Self> {
        items.validate_tree()?;

        let archive_name = template
            .archive_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::InvalidOperation("an archive name is required".into()))?;

        let part3 = Part3::from_names(
            items
                .enumerate_by_id()
                .map(Item::file_name)
                .chain([archive_name]),
        );
        let part4 = Part4::<F::Chunk>::build(items)?;

        let order: Vec<&Item> = items.enumerate_depth_first_by_name().collect();
        let part2 = Part2::build(&order, &part3)?;
        let part1 = Part1::build(items, &part2, &part4)?;

        let part5 = Part5 {
            archive_size: layout.archive_size,
            archive_name_offset: part3.offset_of(archive_name).unwrap_or_default(),
            first_data_offset: u32::try_from(layout.first_data_offset).map_err(|_| {
                Error::InvalidOperation(format!(
                    "first data offset {:#x} does not fit the header",
                    layout.first_data_offset
                ))
            })?,
        };
        let part6 = Part6::<F::Flags>::build(&order);
        let part7 = Part7::build(&order, &items.sibling_ids())?;
        let part8 = Part8::new(template.part8.clone());

        let sizes = [
            part1.size(),
            part2.size(),
            part3.size(),
            part4.size(),
            Part5::SIZE,
            part6.size(),
            part7.size(),
            part8.size(),
        ];
        let mut offsets = [0u32; 8];
        let mut offset = PARTS_OFFSET;
        for (part, size) in sizes.into_iter().enumerate() {
            offsets[part] = offset;
            offset = offset.checked_add(size).ok_or_else(|| {
                Error::InvalidOperation("header does not fit in 32 bits".into())
            })?;
        }

        let mut toc = F::unwrap_toc(&template.toc);
        toc.set_part_offsets(offsets);

        let intro = NefsIntro {
            magic: NEFS_MAGIC,
            header_size: offset,
            version: F::VERSION,
            ..template.intro.clone()
        };

        Ok(Self {
            intro,
            toc,
            part1,
            part2,
            part3,
            part4,
            part5,
            part6,
            part7,
            part8,
        })
    }

    /// Encode the header, zero filling any space between parts
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let offsets = self.toc.part_offsets();
        let mut bytes = vec![0u8; self.intro.header_size as usize];

        {
            let mut writer = Cursor::new(&mut bytes);
            self.intro.write(&mut writer)?;

            writer.set_position(TOC_OFFSET as u64);
            self.toc.write_le(&mut writer)?;

            writer.set_position(offsets[0] as u64);
            self.part1.write(&mut writer)?;
            writer.set_position(offsets[1] as u64);
            self.part2.write(&mut writer)?;
            writer.set_position(offsets[2] as u64);
            self.part3.write(&mut writer)?;
            writer.set_position(offsets[3] as u64);
            self.part4.write(&mut writer)?;
            writer.set_position(offsets[4] as u64);
            self.part5.write(&mut writer)?;
            writer.set_position(offsets[5] as u64);
            self.part6.write(&mut writer)?;
            writer.set_position(offsets[6] as u64);
            self.part7.write(&mut writer)?;
            writer.set_position(offsets[7] as u64);
            std::io::Write::write_all(&mut writer, self.part8.data())?;
        }

        Ok(bytes)
    }

    /// The parts of a template that are not derived from the items
    pub fn template(&self) -> HeaderTemplate {
        HeaderTemplate {
            intro: self.intro.clone(),
            toc: F::wrap_toc(self.toc.clone()),
            part8: self.part8.data().to_vec(),
            archive_name: self.archive_name().ok().map(str::to_owned),
        }
    }

    pub fn intro(&self) -> &NefsIntro {
        &self.intro
    }

    pub fn toc(&self) -> &F::Toc {
        &self.toc
    }

    pub fn part1(&self) -> &Part1 {
        &self.part1
    }

    pub fn part2(&self) -> &Part2 {
        &self.part2
    }

    pub fn part3(&self) -> &Part3 {
        &self.part3
    }

    pub fn part4(&self) -> &Part4<F::Chunk> {
        &self.part4
    }

    pub fn part5(&self) -> &Part5 {
        &self.part5
    }

    pub fn part6(&self) -> &Part6<F::Flags> {
        &self.part6
    }

    pub fn part7(&self) -> &Part7 {
        &self.part7
    }

    pub fn part8(&self) -> &Part8 {
        &self.part8
    }

    /// Ids of all items in ascending order
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.part1.entries().map(|e| e.id).collect()
    }

    pub fn directory_id(&self, id: ItemId) -> Result<ItemId> {
        self.part2
            .get(id)
            .map(|e| e.directory_id)
            .ok_or(Error::ItemNotFound(id))
    }

    pub fn file_name(&self, id: ItemId) -> Result<&str> {
        let entry = self.part2.get(id).ok_or(Error::ItemNotFound(id))?;
        self.part3.name_at(entry.name_offset).ok_or_else(|| {
            Error::corrupt(
                HeaderSection::Part(2),
                format!("name of item {id} is not in part 3"),
            )
        })
    }

    pub fn data_offset(&self, id: ItemId) -> Result<u64> {
        self.part1
            .get(id)
            .map(|e| e.data_offset)
            .ok_or(Error::ItemNotFound(id))
    }

    pub fn extracted_size(&self, id: ItemId) -> Result<u32> {
        self.part2
            .get(id)
            .map(|e| e.extracted_size)
            .ok_or(Error::ItemNotFound(id))
    }

    /// Compressed size of each chunk, or `None` for items stored raw and directories
    pub fn chunk_sizes(&self, id: ItemId) -> Result<Option<Vec<u32>>> {
        self.part1.get(id).ok_or(Error::ItemNotFound(id))?;
        Ok(self.part4.chunk_sizes(id))
    }

    /// Transform and checksum of each chunk, all zero in version 1.6
    pub fn chunk_meta(&self, id: ItemId) -> Result<Vec<ChunkMeta>> {
        self.part1.get(id).ok_or(Error::ItemNotFound(id))?;
        Ok(self.part4.chunk_meta(id))
    }

    pub fn flags(&self, id: ItemId) -> Result<ItemFlags> {
        self.part6.flags(id).ok_or(Error::ItemNotFound(id))
    }

    pub fn volume(&self, id: ItemId) -> Result<u16> {
        self.part6
            .get(id)
            .map(FlagRecord::volume)
            .ok_or(Error::ItemNotFound(id))
    }

    pub fn first_data_offset(&self) -> u64 {
        self.part5.first_data_offset as u64
    }

    pub fn archive_size(&self) -> u64 {
        self.part5.archive_size
    }

    pub fn archive_name(&self) -> Result<&str> {
        self.part3
            .name_at(self.part5.archive_name_offset)
            .ok_or_else(|| {
                Error::corrupt(HeaderSection::Part(5), "archive name is not in part 3")
            })
    }

    pub fn header_size(&self) -> u32 {
        self.intro.header_size
    }
}

/// Cross checks between parts that share items
fn validate(
    part1: &Part1,
    part2: &Part2,
    part3: &Part3,
    part5: &Part5,
    part7: &Part7,
) -> Result<()> {
    if part2.len() != part1.len() {
        return Err(Error::corrupt(
            HeaderSection::Part(2),
            format!("{} entries for {} items", part2.len(), part1.len()),
        ));
    }

    if part7.len() != part1.len() {
        return Err(Error::corrupt(
            HeaderSection::Part(7),
            format!("{} entries for {} items", part7.len(), part1.len()),
        ));
    }

    for entry in part1.entries() {
        let metadata = part2.get_index(entry.metadata_index as usize);
        if metadata.map(|m| m.id) != Some(entry.id) {
            return Err(Error::corrupt(
                HeaderSection::Part(1),
                format!(
                    "metadata index {} of item {} points at another item",
                    entry.metadata_index, entry.id
                ),
            ));
        }
    }

    for entry in part2.entries() {
        if part3.name_at(entry.name_offset).is_none() {
            return Err(Error::corrupt(
                HeaderSection::Part(2),
                format!(
                    "name offset {:#x} of item {} is not in part 3",
                    entry.name_offset, entry.id
                ),
            ));
        }
    }

    if let Some((found, expected)) = part7
        .entries()
        .map(|e| e.id)
        .zip(part2.ids())
        .find(|(a, b)| a != b)
    {
        return Err(Error::corrupt(
            HeaderSection::Part(7),
            format!("found item {found} where part 2 has item {expected}"),
        ));
    }

    if part3.name_at(part5.archive_name_offset).is_none() {
        return Err(Error::corrupt(
            HeaderSection::Part(5),
            format!(
                "archive name offset {:#x} is not in part 3",
                part5.archive_name_offset
            ),
        ));
    }

    Ok(())
}
