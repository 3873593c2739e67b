use std::fs;
use std::path::Path;

use ego_nefs::{
    error::{Error, Result},
    header::{part4::ChunkMeta, Header, NefsVersion},
    item::{ItemFlags, ItemState},
    progress::{CancellationToken, OperationContext},
    source::{DataSource, FileSource, MemorySource},
    write::SaveOptions,
    NefsArchive,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use tracing_test::traced_test;

fn memory(data: &[u8]) -> DataSource {
    DataSource::Memory(MemorySource::new(data.to_vec()))
}

/// Repetitive data spanning a few chunks, with a short final chunk
fn large_data() -> Vec<u8> {
    (0..0x2_4000u32).map(|i| (i % 251) as u8).collect()
}

/// Write an archive holding a small tree and return the contents of each file by path
fn create_sample(path: &Path, version: NefsVersion) -> Result<Vec<(&'static str, Vec<u8>)>> {
    let files = vec![
        ("config/game.xml", b"<game name=\"test\"/>".to_vec()),
        ("config/empty.txt", Vec::new()),
        ("data/large.bin", large_data()),
        ("readme.txt", b"Hello, World!".to_vec()),
    ];

    let mut archive = NefsArchive::new(path, version);
    let items = archive.items_mut();
    let config = items.add_directory(None, "config")?;
    let data = items.add_directory(None, "data")?;
    items.add_file(Some(config), "game.xml", memory(&files[0].1), ItemFlags::empty())?;
    items.add_file(Some(config), "empty.txt", memory(&files[1].1), ItemFlags::empty())?;
    items.add_file(Some(data), "large.bin", memory(&files[2].1), ItemFlags::CACHEABLE)?;
    items.add_file(None, "readme.txt", memory(&files[3].1), ItemFlags::empty())?;

    archive.save(path, SaveOptions::default(), &OperationContext::new())?;
    Ok(files)
}

fn extract(archive: &NefsArchive, path: &str) -> Result<Vec<u8>> {
    let id = archive
        .items()
        .find_path(path)
        .ok_or_else(|| Error::InvalidOperation(format!("{path} not found")))?;
    let mut data = Vec::new();
    archive.extract_to(id, &mut data, &OperationContext::new())?;
    Ok(data)
}

#[traced_test]
#[test]
fn save_and_reopen_v16() -> Result<()> {
    save_and_reopen(NefsVersion::V16)
}

#[traced_test]
#[test]
fn save_and_reopen_v20() -> Result<()> {
    save_and_reopen(NefsVersion::V20)
}

fn save_and_reopen(version: NefsVersion) -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.nefs");
    let files = create_sample(&path, version)?;

    let archive = NefsArchive::open(&path)?;
    let header = archive.header().ok_or(Error::InvalidOperation("no header".into()))?;
    assert_eq!(header.version(), version);
    assert_eq!(header.archive_name()?, "sample.nefs");
    assert_eq!(header.first_data_offset(), 0x10000);
    assert_eq!(header.archive_size(), fs::metadata(&path)?.len());
    assert_eq!(archive.items().len(), 6);

    for (path, expected) in &files {
        assert_eq!(&extract(&archive, path)?, expected, "{path}");
    }

    let large = archive
        .items()
        .find_path("data/large.bin")
        .and_then(|id| archive.items().get(id))
        .ok_or(Error::InvalidOperation("large.bin not found".into()))?;
    assert_eq!(large.size().chunk_sizes().len(), 3);
    assert!(large.flags().is_cacheable());
    assert_eq!(large.state(), ItemState::Unchanged);
    Ok(())
}

#[test]
fn unchanged_save_copies_bytes() -> Result<()> {
    let dir = tempdir()?;
    let first = dir.path().join("first.nefs");
    let second = dir.path().join("second.nefs");
    create_sample(&first, NefsVersion::V20)?;

    let archive = NefsArchive::open(&first)?;
    let report = archive.save(
        &second,
        SaveOptions::builder().concurrency(3).build(),
        &OperationContext::new(),
    )?;
    assert_eq!(report.compressed, 0);
    assert_eq!(report.copied, 4);

    assert_eq!(fs::read(&first)?, fs::read(&second)?);
    Ok(())
}

#[test]
fn chunk_meta_survives_save() -> Result<()> {
    let dir = tempdir()?;
    let first = dir.path().join("first.nefs");
    let second = dir.path().join("second.nefs");
    create_sample(&first, NefsVersion::V20)?;

    // Give every chunk record a transform and checksum of its own
    let mut bytes = fs::read(&first)?;
    let Header::V20(nefs) = Header::parse(&bytes)? else {
        panic!("expected a version 2.0 header");
    };
    let offsets = nefs.toc().part_offsets;
    let records = &mut bytes[offsets[3] as usize..offsets[4] as usize];
    for (i, record) in records.chunks_exact_mut(8).enumerate() {
        record[4..6].copy_from_slice(&(0x1000 + i as u16).to_le_bytes());
        record[6..8].copy_from_slice(&(0x2000 + i as u16).to_le_bytes());
    }
    fs::write(&first, &bytes)?;

    let archive = NefsArchive::open(&first)?;
    let large = archive
        .items()
        .find_path("data/large.bin")
        .ok_or(Error::InvalidOperation("large.bin not found".into()))?;
    let header = archive.header().ok_or(Error::InvalidOperation("no header".into()))?;
    let expected = header.chunk_meta(large)?;
    assert_eq!(expected.len(), 3);
    assert!(expected.iter().all(|meta| *meta != ChunkMeta::default()));

    let report = archive.save(&second, SaveOptions::default(), &OperationContext::new())?;
    assert_eq!(report.compressed, 0);
    assert_eq!(fs::read(&first)?, fs::read(&second)?);

    let saved = NefsArchive::open(&second)?;
    let large = saved
        .items()
        .find_path("data/large.bin")
        .ok_or(Error::InvalidOperation("large.bin not found".into()))?;
    let header = saved.header().ok_or(Error::InvalidOperation("no header".into()))?;
    assert_eq!(header.chunk_meta(large)?, expected);
    assert_eq!(extract(&saved, "data/large.bin")?, large_data());
    Ok(())
}

#[test]
fn failed_extraction_removes_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.nefs");
    create_sample(&path, NefsVersion::V16)?;

    let archive = NefsArchive::open(&path)?;
    let large = archive
        .items()
        .find_path("data/large.bin")
        .ok_or(Error::InvalidOperation("large.bin not found".into()))?;
    let header = archive.header().ok_or(Error::InvalidOperation("no header".into()))?;
    let offset = header.data_offset(large)? as usize;

    // 0xFF starts a deflate block of the reserved type
    let mut bytes = fs::read(&path)?;
    bytes[offset..offset + 16].fill(0xFF);
    fs::write(&path, &bytes)?;

    let dest = dir.path().join("out/large.bin");
    assert!(archive
        .extract_file(large, &dest, &OperationContext::new())
        .is_err());
    assert!(!dest.exists());
    Ok(())
}

#[test]
fn edits_are_saved() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.nefs");
    create_sample(&path, NefsVersion::V16)?;

    let mut archive = NefsArchive::open(&path)?;
    let items = archive.items_mut();
    let readme = items.find_path("readme.txt").ok_or(Error::InvalidOperation("readme".into()))?;
    let config = items.find_path("config").ok_or(Error::InvalidOperation("config".into()))?;
    let data = items.find_path("data").ok_or(Error::InvalidOperation("data".into()))?;

    items.replace(readme, memory(b"Goodbye"))?;
    items.rename(readme, "goodbye.txt")?;
    items.remove(config)?;
    items.add_file(Some(data), "new.txt", memory(b"new"), ItemFlags::empty())?;

    let report = archive.save(&path, SaveOptions::default(), &OperationContext::new())?;
    assert_eq!(report.compressed, 2);
    assert_eq!(report.copied, 1);

    let archive = NefsArchive::open(&path)?;
    assert_eq!(archive.items().len(), 4);
    assert_eq!(archive.items().find_path("config"), None);
    assert_eq!(archive.items().find_path("readme.txt"), None);
    assert_eq!(extract(&archive, "goodbye.txt")?, b"Goodbye");
    assert_eq!(extract(&archive, "data/new.txt")?, b"new");
    assert_eq!(extract(&archive, "data/large.bin")?, large_data());

    // Ids are contiguous again after the removal
    let ids: Vec<u32> = archive.items().ids().map(|id| id.value()).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn version_changes_on_save() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.nefs");
    let files = create_sample(&path, NefsVersion::V16)?;

    let converted = dir.path().join("converted.nefs");
    NefsArchive::open(&path)?.save(
        &converted,
        SaveOptions::builder().version(NefsVersion::V20).build(),
        &OperationContext::new(),
    )?;

    let archive = NefsArchive::open(&converted)?;
    assert_eq!(archive.template().version(), NefsVersion::V20);
    for (path, expected) in &files {
        assert_eq!(&extract(&archive, path)?, expected, "{path}");
    }
    Ok(())
}

#[test]
fn file_sources_are_compressed() -> Result<()> {
    let dir = tempdir()?;
    let loose = dir.path().join("loose.bin");
    fs::write(&loose, large_data())?;

    let path = dir.path().join("files.nefs");
    let mut archive = NefsArchive::new(&path, NefsVersion::V20);
    archive.items_mut().add_file(
        None,
        "loose.bin",
        DataSource::File(FileSource::new(&loose)?),
        ItemFlags::empty(),
    )?;
    archive.save(
        &path,
        SaveOptions::builder().concurrency(2).compression_level(9).build(),
        &OperationContext::new(),
    )?;

    let archive = NefsArchive::open(&path)?;
    assert_eq!(extract(&archive, "loose.bin")?, large_data());
    Ok(())
}

#[traced_test]
#[test]
fn cancelled_save_leaves_destination() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.nefs");
    create_sample(&path, NefsVersion::V16)?;
    let original = fs::read(&path)?;

    let mut archive = NefsArchive::open(&path)?;
    let readme = archive
        .items()
        .find_path("readme.txt")
        .ok_or(Error::InvalidOperation("readme".into()))?;
    archive.items_mut().replace(readme, memory(&large_data()))?;

    let token = CancellationToken::new();
    let cancel = token.clone();
    let ctx = OperationContext::with_token(token).with_callback(move |_, _| cancel.cancel());

    let result = archive.save(&path, SaveOptions::default(), &ctx);
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!archive.items().is_busy());

    assert_eq!(fs::read(&path)?, original);
    let entries: Vec<_> = fs::read_dir(dir.path())?.collect::<std::io::Result<_>>()?;
    assert_eq!(entries.len(), 1);
    Ok(())
}

#[test]
fn busy_list_rejects_save_and_edits() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.nefs");
    create_sample(&path, NefsVersion::V16)?;

    let mut archive = NefsArchive::open(&path)?;
    let guard = archive.items().lock_for_save()?;

    assert!(matches!(
        archive.save(&path, SaveOptions::default(), &OperationContext::new()),
        Err(Error::ArchiveBusy)
    ));
    assert!(matches!(
        archive.items_mut().add_directory(None, "more"),
        Err(Error::ArchiveBusy)
    ));

    drop(guard);
    archive.items_mut().add_directory(None, "more")?;
    Ok(())
}

#[traced_test]
#[test]
fn extract_all_recreates_tree() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.nefs");
    let files = create_sample(&path, NefsVersion::V20)?;

    let out = dir.path().join("out");
    let ctx = OperationContext::new();
    let archive = NefsArchive::open(&path)?;
    let report = archive.extract_all(&out, &ctx)?;

    assert_eq!(report.extracted, 4);
    assert!(report.failures.is_empty());
    for (path, expected) in &files {
        assert_eq!(&fs::read(out.join(path))?, expected, "{path}");
    }
    assert_eq!(ctx.processed(), ctx.total());
    Ok(())
}

#[test]
fn extracting_a_directory_fails() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("sample.nefs");
    create_sample(&path, NefsVersion::V16)?;

    let archive = NefsArchive::open(&path)?;
    let config = archive
        .items()
        .find_path("config")
        .ok_or(Error::InvalidOperation("config".into()))?;
    assert!(matches!(
        archive.extract_to(config, &mut Vec::new(), &OperationContext::new()),
        Err(Error::InvalidOperation(_))
    ));
    Ok(())
}
