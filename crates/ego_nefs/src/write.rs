//! Writing archives
//!

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bon::Builder;
use rayon::prelude::*;
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, instrument};

use crate::compression::ChunkCompressor;
use crate::error::{Error, Result};
use crate::header::{data_offset_for, DataLayout, Header, HeaderTemplate, NefsVersion};
use crate::item::{Item, ItemId, ItemState};
use crate::list::ItemList;
use crate::progress::OperationContext;
use crate::size::ItemSize;
use crate::source::{ArchiveSource, DataSource, FileSource};

const COPY_BUFFER_SIZE: usize = 0x10000;

/// Options for how the archive should be written
#[derive(Debug, Clone, Copy, Builder)]
pub struct SaveOptions {
    /// Number of worker threads used to compress and copy items
    #[builder(default = 1)]
    pub concurrency: usize,

    /// Deflate level for new data, 0 to 9
    #[builder(default = 6)]
    pub compression_level: u32,

    /// Write a different header version than the archive was read with
    pub version: Option<NefsVersion>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Summary of a finished save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Files whose stored bytes were copied as they were
    pub copied: usize,
    /// Files compressed during the save
    pub compressed: usize,
    pub header_size: u32,
    /// Offset of the first item data
    pub data_offset: u64,
    pub archive_size: u64,
}

/// Rebuilds archives from an [`ItemList`]
///
/// ```no_run
/// # fn doit() -> ego_nefs::error::Result<()>
/// # {
/// use std::path::Path;
/// use ego_nefs::header::{HeaderTemplate, NefsVersion};
/// use ego_nefs::item::ItemFlags;
/// use ego_nefs::list::ItemList;
/// use ego_nefs::progress::OperationContext;
/// use ego_nefs::source::{DataSource, MemorySource};
/// use ego_nefs::write::{ArchiveWriter, SaveOptions};
///
/// let mut items = ItemList::new("new.nefs");
/// let dir = items.add_directory(None, "config")?;
/// items.add_file(
///     Some(dir),
///     "hello_world.txt",
///     DataSource::Memory(MemorySource::new(b"Hello, World!".to_vec())),
///     ItemFlags::empty(),
/// )?;
///
/// ArchiveWriter::save(
///     &items,
///     &HeaderTemplate::new(NefsVersion::V16),
///     Path::new("new.nefs"),
///     SaveOptions::builder().concurrency(4).build(),
///     &OperationContext::new(),
/// )?;
/// # Ok(())
/// # }
/// ```
pub struct ArchiveWriter;

impl ArchiveWriter {
    /// Write `items` as a complete archive at `dest`.
    ///
    /// New data is compressed into staging files first so every item's stored size is known
    /// before the layout is fixed. The archive is assembled in a temporary file next to `dest`
    /// and moved over it at the end. On error or cancellation the temporary files are removed
    /// and `dest` is left as it was.
    #[instrument(skip(items, template, ctx), fields(dest = %dest.display()), err)]
    pub fn save(
        items: &ItemList,
        template: &HeaderTemplate,
        dest: &Path,
        options: SaveOptions,
        ctx: &OperationContext,
    ) -> Result<SaveReport> {
        let _guard = items.lock_for_save()?;
        ctx.check()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.concurrency.max(1))
            .build()
            .map_err(io::Error::other)?;

        let dest_dir = dest
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let mut template = template.clone();
        if let Some(version) = options.version {
            template = template.with_version(version);
        }
        if template.archive_name.is_none() {
            template.archive_name = dest
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
        }

        let mut list = items.renumbered()?;

        // Planning
        let compressor = ChunkCompressor::builder()
            .level(options.compression_level)
            .parallel(options.concurrency.max(1))
            .build();
        let pending: Vec<ItemId> = list
            .enumerate_by_id()
            .filter(|item| item.source().requires_compression())
            .map(Item::id)
            .collect();
        ctx.add_total(
            pending
                .iter()
                .filter_map(|&id| list.get(id))
                .map(|item| item.source().stored_len())
                .sum(),
        );

        // Staging files are held by path; their handles close once an item is compressed
        let staged: Vec<(ItemId, TempPath, ItemSize)> = pool.install(|| {
            pending
                .par_iter()
                .map(|&id| stage(&list, id, dest_dir, &compressor, ctx))
                .collect::<Result<_>>()
        })?;
        for (id, staging, size) in &staged {
            if let Some(item) = list.get_mut(*id) {
                item.set_source_unchecked(DataSource::File(FileSource::precompressed(
                    staging.to_path_buf(),
                    0,
                    size.clone(),
                )));
            }
        }

        // Layout
        let placeholder = Header::build(&template, &list, DataLayout::default())?;
        let header_size = placeholder.header_size();
        let data_offset = data_offset_for(header_size);

        let mut plan = Vec::new();
        let mut offset = data_offset;
        for item in list.enumerate_by_id().filter(|item| !item.is_directory()) {
            plan.push((item.id(), offset));
            offset += item.source().stored_len();
        }
        let archive_size = offset;
        debug!(header_size, data_offset, archive_size, "planned layout");

        // Writing
        let mut output = NamedTempFile::new_in(dest_dir)?;
        output.as_file().set_len(archive_size)?;
        ctx.add_total(archive_size - data_offset);

        let output_path = output.path().to_path_buf();
        pool.install(|| {
            plan.par_iter().try_for_each(|&(id, offset)| {
                ctx.check()?;
                let item = list.get(id).ok_or(Error::ItemNotFound(id))?;
                let mut reader = item.source().open(&list)?;

                let mut file = OpenOptions::new().write(true).open(&output_path)?;
                file.seek(SeekFrom::Start(offset))?;
                let expected = item.source().stored_len();
                let written = copy_with_progress(&mut reader, &mut file, ctx)?;
                if written != expected {
                    return Err(Error::IOError(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("item {id} provided {written} of {expected} bytes"),
                    )));
                }
                Ok(())
            })
        })?;

        // Header rebuild
        for &(id, offset) in &plan {
            if let Some(item) = list.get_mut(id) {
                let chunk_meta = match item.source() {
                    DataSource::Archive(source) => source.chunk_meta().to_vec(),
                    _ => Vec::new(),
                };
                let source = ArchiveSource::new(offset, item.size()).with_chunk_meta(chunk_meta);
                item.set_source_unchecked(DataSource::Archive(source));
                item.set_state(ItemState::Unchanged);
            }
        }
        let header = Header::build(
            &template,
            &list,
            DataLayout {
                first_data_offset: data_offset,
                archive_size,
            },
        )?;
        if header.header_size() != header_size {
            return Err(Error::InvalidOperation(format!(
                "header size changed from {header_size:#x} to {:#x} while saving",
                header.header_size()
            )));
        }

        // Finalize
        ctx.check()?;
        {
            let file = output.as_file_mut();
            file.seek(SeekFrom::Start(0))?;
            header.write(file)?;
            file.sync_all()?;
        }
        output.persist(dest).map_err(|e| Error::IOError(e.error))?;

        let report = SaveReport {
            copied: plan.len() - staged.len(),
            compressed: staged.len(),
            header_size,
            data_offset,
            archive_size,
        };
        info!(
            copied = report.copied,
            compressed = report.compressed,
            archive_size,
            "saved archive"
        );
        Ok(report)
    }
}

/// Compress the data of one item into a staging file
fn stage(
    list: &ItemList,
    id: ItemId,
    dir: &Path,
    compressor: &ChunkCompressor,
    ctx: &OperationContext,
) -> Result<(ItemId, TempPath, ItemSize)> {
    ctx.check()?;
    let item = list.get(id).ok_or(Error::ItemNotFound(id))?;
    let mut reader = item.source().open(list)?;

    let mut staging = NamedTempFile::new_in(dir)?;
    let size = {
        let mut writer = BufWriter::new(staging.as_file_mut());
        let size = compressor.compress(&mut reader, item.source().stored_len(), &mut writer, ctx)?;
        writer.flush()?;
        size
    };

    debug!(
        %id,
        extracted = size.extracted_size(),
        compressed = size.compressed_size(),
        "staged item"
    );
    Ok((id, staging.into_temp_path(), size))
}

fn copy_with_progress<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    ctx: &OperationContext,
) -> Result<u64> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        ctx.check()?;
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(copied),
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer.write_all(&buffer[..read])?;
        copied += read as u64;
        ctx.advance(read as u64);
    }
}
