//! Chunked compression and decompression of item data.
//!
//! Item data is split into [`CHUNK_SIZE`] slices that are raw deflated on their own. The header
//! records the compressed size of every chunk, so a chunk can be inflated without touching the
//! others.

use std::io::{Read, Write};

use bon::Builder;
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use rayon::prelude::*;
use tracing::instrument;

use crate::error::{Error, Result};
use crate::progress::OperationContext;
use crate::size::ItemSize;

/// Number of extracted bytes held by every chunk but the last
pub const CHUNK_SIZE: u32 = 0x10000;

/// Splits item data into chunks and deflates them
///
/// ```
/// # fn doit() -> ego_nefs::error::Result<()>
/// # {
/// use std::io::Cursor;
/// use ego_nefs::compression::ChunkCompressor;
/// use ego_nefs::progress::OperationContext;
///
/// let compressor = ChunkCompressor::builder().level(9).build();
/// let ctx = OperationContext::new();
///
/// let data = b"Hello, World!".repeat(100);
/// let mut stored = Vec::new();
/// let size = compressor.compress(&mut &data[..], data.len() as u64, &mut stored, &ctx)?;
///
/// let mut extracted = Vec::new();
/// compressor.decompress(&mut Cursor::new(stored), &size, &mut extracted, &ctx)?;
/// assert_eq!(extracted, data);
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
#[derive(Debug, Clone, Copy, Builder)]
pub struct ChunkCompressor {
    /// Extracted bytes per chunk
    #[builder(default = CHUNK_SIZE)]
    chunk_size: u32,

    /// Deflate level, 0 to 9
    #[builder(default = 6)]
    level: u32,

    /// Number of chunks compressed at once on the current rayon pool
    #[builder(default = 1)]
    parallel: usize,
}

impl Default for ChunkCompressor {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ChunkCompressor {
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Compress `length` bytes from `reader` into `writer`, returning the chunk sizes.
    ///
    /// At most one batch of `parallel` chunks is held in memory.
    #[instrument(skip(self, reader, writer, ctx), err)]
    pub fn compress<R: Read, W: Write>(
        &self,
        reader: &mut R,
        length: u64,
        writer: &mut W,
        ctx: &OperationContext,
    ) -> Result<ItemSize> {
        let extracted = u32::try_from(length).map_err(|_| Error::ItemTooLarge(length))?;
        let count = ItemSize::expected_chunk_count(extracted, self.chunk_size);
        let batch_len = self.parallel.max(1);

        let mut chunk_sizes = Vec::with_capacity(count);
        let mut remaining = length;
        while remaining > 0 {
            ctx.check()?;

            let mut batch = Vec::with_capacity(batch_len);
            while batch.len() < batch_len && remaining > 0 {
                let len = remaining.min(self.chunk_size as u64);
                let mut chunk = vec![0u8; len as usize];
                reader.read_exact(&mut chunk)?;
                remaining -= len;
                batch.push(chunk);
            }

            let compressed: Vec<Vec<u8>> = if batch.len() > 1 {
                batch
                    .par_iter()
                    .map(|chunk| self.deflate(chunk))
                    .collect::<Result<_>>()?
            } else {
                batch
                    .iter()
                    .map(|chunk| self.deflate(chunk))
                    .collect::<Result<_>>()?
            };

            for (raw, chunk) in batch.iter().zip(&compressed) {
                writer.write_all(chunk)?;
                let size = u32::try_from(chunk.len())
                    .map_err(|_| Error::ItemTooLarge(chunk.len() as u64))?;
                chunk_sizes.push(size);
                ctx.advance(raw.len() as u64);
            }
        }

        Ok(ItemSize::compressed(extracted, chunk_sizes))
    }

    fn deflate(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(
            Vec::with_capacity(chunk.len() / 2),
            Compression::new(self.level),
        );
        encoder.write_all(chunk)?;
        Ok(encoder.finish()?)
    }

    /// Write the extracted form of stored data read from `reader`.
    ///
    /// Data without chunks is copied as is. Every chunk must inflate to exactly the number of bytes
    /// it covers.
    #[instrument(skip(self, reader, writer, ctx), err)]
    pub fn decompress<R: Read, W: Write>(
        &self,
        reader: &mut R,
        size: &ItemSize,
        writer: &mut W,
        ctx: &OperationContext,
    ) -> Result<()> {
        if !size.is_compressed() {
            return self.copy_raw(reader, size.extracted_size() as u64, writer, ctx);
        }

        let expected_chunks = ItemSize::expected_chunk_count(size.extracted_size(), self.chunk_size);
        if size.chunk_sizes().len() != expected_chunks {
            return Err(Error::CompressionFormat {
                chunk: size.chunk_sizes().len().min(expected_chunks),
                reason: format!(
                    "expected {expected_chunks} chunks for {} bytes, found {}",
                    size.extracted_size(),
                    size.chunk_sizes().len()
                ),
            });
        }

        let mut stored = Vec::new();
        let mut extracted = Vec::with_capacity(self.chunk_size as usize);
        for (index, &chunk_size) in size.chunk_sizes().iter().enumerate() {
            ctx.check()?;

            stored.resize(chunk_size as usize, 0);
            reader.read_exact(&mut stored)?;

            let expected = size.extracted_chunk_len(index, self.chunk_size) as u64;
            extracted.clear();
            DeflateDecoder::new(&stored[..])
                .take(expected + 1)
                .read_to_end(&mut extracted)
                .map_err(|e| Error::CompressionFormat {
                    chunk: index,
                    reason: e.to_string(),
                })?;

            if extracted.len() as u64 != expected {
                return Err(Error::CompressionFormat {
                    chunk: index,
                    reason: format!(
                        "inflated to {} bytes instead of {expected}",
                        extracted.len()
                    ),
                });
            }

            writer.write_all(&extracted)?;
            ctx.advance(expected);
        }

        Ok(())
    }

    fn copy_raw<R: Read, W: Write>(
        &self,
        reader: &mut R,
        length: u64,
        writer: &mut W,
        ctx: &OperationContext,
    ) -> Result<()> {
        let mut buffer = vec![0u8; self.chunk_size.min(length as u32) as usize];
        let mut remaining = length;
        while remaining > 0 {
            ctx.check()?;
            let len = remaining.min(buffer.len() as u64) as usize;
            reader.read_exact(&mut buffer[..len])?;
            writer.write_all(&buffer[..len])?;
            remaining -= len as u64;
            ctx.advance(len as u64);
        }
        Ok(())
    }
}
