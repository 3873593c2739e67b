//! Error types that can be emitted from this library

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use crate::item::ItemId;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// The header could not be decoded or is inconsistent with itself
    #[error("corrupt header in {section}: {reason}")]
    CorruptHeader {
        /// The header section that failed validation
        section: HeaderSection,
        /// What was wrong with it
        reason: String,
    },

    /// The intro names a format version with no known layout
    #[error("unsupported nefs version {0:#x}")]
    UnsupportedVersion(u32),

    /// An item with this id already exists in the list
    #[error("item id {0} already exists")]
    DuplicateId(ItemId),

    /// The item list is being saved and cannot be modified
    #[error("archive is busy saving")]
    ArchiveBusy,

    /// unable to find requested item
    #[error("unable to find item {0}")]
    ItemNotFound(ItemId),

    /// A chunk did not decompress to its declared size
    #[error("chunk {chunk} is corrupt: {reason}")]
    CompressionFormat {
        /// Index of the failing chunk within the item
        chunk: usize,
        /// What was wrong with it
        reason: String,
    },

    /// The operation was cancelled through its [`crate::progress::CancellationToken`]
    #[error("operation cancelled")]
    Cancelled,

    /// {0}
    #[error("{0}")]
    InvalidOperation(String),

    /// Item data does not fit the 32-bit size fields of the header
    #[error("item of {0} bytes is too large for a nefs archive")]
    ItemTooLarge(u64),
}

impl Error {
    pub(crate) fn corrupt(section: HeaderSection, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            section,
            reason: reason.into(),
        }
    }

    /// Whether this error came from a cancellation request rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Identifies the part of a header an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSection {
    /// The fixed size intro at the start of the file
    Intro,
    /// The table of contents following the intro
    TableOfContents,
    /// One of the numbered header parts
    Part(u8),
    /// The item tree assembled from the parts
    Tree,
}

impl fmt::Display for HeaderSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderSection::Intro => write!(f, "intro"),
            HeaderSection::TableOfContents => write!(f, "table of contents"),
            HeaderSection::Part(n) => write!(f, "part {n}"),
            HeaderSection::Tree => write!(f, "item tree"),
        }
    }
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
