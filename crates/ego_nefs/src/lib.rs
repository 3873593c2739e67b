//! This library handles reading from and creating **NeFS** archives used by games built on the
//! *EGO* engine.
//!
//! # NeFS Archive Format Documentation
//!
//! A NeFS archive is a single file holding a directory tree of game assets. It starts with a header
//! describing every item, followed by the item data. Archives are typically identified with the
//! `.nefs` extension, though the header is also embedded in some game executables.
//!
//! ## File Structure
//!
//! | Offset (bytes)  | Field             | Description                                              |
//! |-----------------|-------------------|----------------------------------------------------------|
//! | 0x0000          | Intro             | 0x80 bytes: magic, hash, key, header size and version    |
//! | 0x0080          | Table of contents | 0x80 bytes: offsets of the eight header parts            |
//! | 0x0100          | Parts 1 to 8      | Item tables, names and archive values                    |
//! | 0x10000         | Item data         | Stored data of every file, back to back                  |
//!
//! Item data starts at `0x10000` unless the header is larger, in which case it moves to `0x50000`
//! or the next `0x10000` boundary after the header.
//!
//! ### Intro
//!
//! | Offset (bytes) | Field          | Description                                          |
//! |----------------|----------------|------------------------------------------------------|
//! | 0x0000         | Magic number   | 4 bytes: 0x5346654E ("NeFS")                         |
//! | 0x0004         | Expected hash  | 32 bytes: hash of the header, kept as read           |
//! | 0x0024         | AES key        | 64 bytes: key of encrypted headers, kept as read     |
//! | 0x0064         | Header size    | 4 bytes: size of the whole header                    |
//! | 0x0068         | Version        | 4 bytes: `0x10600` for 1.6, `0x20000` for 2.0        |
//! | 0x006C         | Volume count   | 4 bytes: number of data volumes                      |
//! | 0x0070         | Reserved       | 16 bytes                                             |
//!
//! ### Table of Contents
//!
//! Version 1.6 stores eight 4-byte part offsets followed by reserved bytes. Version 2.0 prefixes them
//! with a 2-byte volume count and a 2-byte hash block shift. Offsets are relative to the start of the
//! header, and the size of a part runs up to the next part (or the end of the header).
//!
//! ### Parts
//!
//! - **Part 1**, 0x14 bytes per item: data offset (8 bytes), index into part 2, index into part 4
//!   and the item id.
//! - **Part 2**, 0x14 bytes per item, in depth-first order by name: parent directory id, first
//!   child id, offset of the name in part 3, extracted size and the item id.
//! - **Part 3**: null terminated UTF-8 names, sorted and without repeats. The archive name is
//!   stored here too.
//! - **Part 4**: chunk records holding the cumulative compressed size after every chunk. Version 2.0
//!   records add a 2-byte transform and a 2-byte checksum.
//! - **Part 5**, 0x10 bytes: archive size, offset of the archive name in part 3 and the offset of
//!   the first item data.
//! - **Part 6**, one record per item in part 2 order: flags (4 bytes in 1.6; volume, flags and an
//!   unknown byte in 2.0).
//! - **Part 7**, 8 bytes per item in part 2 order: id of the next item in the same directory by
//!   ascending id (its own id for the last one) and the item id.
//! - **Part 8**: bytes the game keeps for itself, carried over unchanged.
//!
//! ### Item Data
//!
//! File data is split into chunks of `0x10000` extracted bytes, and every chunk is raw deflated on
//! its own. A file without part 4 records is stored as is. Directories have no data and their
//! extracted size is zero.
//!
//! ## Additional Information
//!
//! - **File Extension**: `.nefs`
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Item ids**: items at the top of the tree use their own id as their directory id
//!

pub mod compression;
pub mod error;
pub mod header;
pub mod item;
pub mod list;
pub mod progress;
pub mod read;
pub mod size;
pub mod source;
pub mod write;

pub use header::{Header, HeaderTemplate, NefsVersion};
pub use item::{Item, ItemFlags, ItemId};
pub use list::ItemList;
pub use read::NefsArchive;
pub use write::{ArchiveWriter, SaveOptions};
