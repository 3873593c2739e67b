//! Size information for an item's data.

/// Extracted and stored size of an item.
///
/// An item is stored compressed when it has a chunk list. Chunk `i` holds the compressed form of
/// bytes `[i * CHUNK_SIZE, (i + 1) * CHUNK_SIZE)` of the extracted data (see
/// [`crate::compression::CHUNK_SIZE`]); the last chunk may cover fewer bytes. Items without chunks
/// are stored raw, so their stored size equals their extracted size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemSize {
    extracted: u32,
    chunk_sizes: Vec<u32>,
}

impl ItemSize {
    /// Size of data stored without compression
    pub fn raw(extracted: u32) -> Self {
        Self {
            extracted,
            chunk_sizes: Vec::new(),
        }
    }

    /// Size of chunk-compressed data
    pub fn compressed(extracted: u32, chunk_sizes: Vec<u32>) -> Self {
        Self {
            extracted,
            chunk_sizes,
        }
    }

    /// Size of the data once extracted
    pub fn extracted_size(&self) -> u32 {
        self.extracted
    }

    /// Size of the data as stored in the archive
    pub fn compressed_size(&self) -> u64 {
        if self.is_compressed() {
            self.chunk_sizes.iter().map(|&c| c as u64).sum()
        } else {
            self.extracted as u64
        }
    }

    /// Compressed size of each chunk, in order
    pub fn chunk_sizes(&self) -> &[u32] {
        &self.chunk_sizes
    }

    /// Whether the data is stored as compressed chunks
    pub fn is_compressed(&self) -> bool {
        !self.chunk_sizes.is_empty()
    }

    /// Number of chunks needed to hold `extracted` bytes
    pub fn expected_chunk_count(extracted: u32, chunk_size: u32) -> usize {
        extracted.div_ceil(chunk_size) as usize
    }

    /// Extracted length of the chunk at `index`
    pub fn extracted_chunk_len(&self, index: usize, chunk_size: u32) -> u32 {
        let start = index as u64 * chunk_size as u64;
        (self.extracted as u64)
            .saturating_sub(start)
            .min(chunk_size as u64) as u32
    }
}
