//! Header part 3: the string table.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{Cursor, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::error::{Error, HeaderSection, Result};

/// Null terminated names of every item plus the archive name.
///
/// Built tables hold each distinct string once, sorted. Tables read from disk keep their exact
/// layout, including any zero padding, so they are written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part3 {
    by_offset: BTreeMap<u32, String>,
    offset_by_name: HashMap<String, u32>,
    size: u32,
}

impl Part3 {
    pub(crate) fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let sorted: BTreeSet<&str> = names.into_iter().collect();

        let mut part3 = Self::default();
        for name in sorted {
            part3.insert(part3.size, name.to_owned());
            part3.size += name.len() as u32 + 1;
        }
        part3
    }

    fn insert(&mut self, offset: u32, name: String) {
        self.offset_by_name.entry(name.clone()).or_insert(offset);
        self.by_offset.insert(offset, name);
    }

    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        let section = HeaderSection::Part(3);
        let mut part3 = Self {
            size: bytes.len() as u32,
            ..Default::default()
        };

        let mut reader = Cursor::new(bytes);
        while (reader.position() as usize) < bytes.len() {
            let offset = reader.position() as u32;

            let mut name_raw = Vec::new();
            loop {
                let char = reader.read_u8().map_err(|_| {
                    Error::corrupt(section, format!("string at {offset:#x} is not terminated"))
                })?;
                if char == b'\0' {
                    break;
                }
                name_raw.push(char);
            }

            // Consecutive terminators are padding.
            if name_raw.is_empty() {
                continue;
            }

            let name = String::from_utf8(name_raw).map_err(|_| {
                Error::corrupt(section, format!("string at {offset:#x} is not valid utf-8"))
            })?;
            part3.insert(offset, name);
        }

        Ok(part3)
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut position = 0u32;
        for (&offset, name) in &self.by_offset {
            while position < offset {
                writer.write_u8(0)?;
                position += 1;
            }
            writer.write_all(name.as_bytes())?;
            writer.write_u8(0)?;
            position += name.len() as u32 + 1;
        }
        while position < self.size {
            writer.write_u8(0)?;
            position += 1;
        }
        Ok(())
    }

    /// Offset of a string in the table
    pub fn offset_of(&self, name: &str) -> Option<u32> {
        self.offset_by_name.get(name).copied()
    }

    /// String starting at `offset`
    pub fn name_at(&self, offset: u32) -> Option<&str> {
        self.by_offset.get(&offset).map(String::as_str)
    }

    /// Strings in offset order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_offset.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}
