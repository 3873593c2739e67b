use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

fn get_input() -> Vec<u8> {
    (0..0x40_0000u32)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8 & 0x3F)
        .collect()
}

pub mod compression {
    use std::io::Cursor;

    use divan::Bencher;
    use ego_nefs::compression::ChunkCompressor;
    use ego_nefs::progress::OperationContext;

    use super::get_input;

    #[divan::bench(args = [1, 4])]
    fn compress(bencher: Bencher, parallel: usize) {
        let compressor = ChunkCompressor::builder().parallel(parallel).build();
        let ctx = OperationContext::new();
        bencher.with_inputs(get_input).bench_refs(|data| {
            let mut stored = Vec::new();
            divan::black_box(
                compressor
                    .compress(&mut &data[..], data.len() as u64, &mut stored, &ctx)
                    .unwrap(),
            );
        });
    }

    #[divan::bench]
    fn decompress(bencher: Bencher) {
        let compressor = ChunkCompressor::default();
        let ctx = OperationContext::new();
        let data = get_input();
        let mut stored = Vec::new();
        let size = compressor
            .compress(&mut &data[..], data.len() as u64, &mut stored, &ctx)
            .unwrap();

        bencher.bench_local(|| {
            let mut extracted = Vec::with_capacity(data.len());
            compressor
                .decompress(&mut Cursor::new(&stored), &size, &mut extracted, &ctx)
                .unwrap();
            divan::black_box(extracted);
        });
    }
}

pub mod header {
    use divan::Bencher;
    use ego_nefs::header::{DataLayout, Header, HeaderTemplate, NefsVersion};
    use ego_nefs::item::{Item, ItemFlags, ItemId, ItemState};
    use ego_nefs::list::ItemList;
    use ego_nefs::size::ItemSize;
    use ego_nefs::source::{ArchiveSource, DataSource};

    fn items() -> ItemList {
        let mut items = ItemList::new("bench.nefs");
        let mut offset = 0x10000;
        for dir in 0..50u32 {
            let dir_id = dir * 101;
            items
                .add(Item::directory(
                    ItemId(dir_id),
                    format!("dir{dir:02}"),
                    ItemId(dir_id),
                    ItemState::Unchanged,
                ))
                .unwrap();
            for file in 1..=100u32 {
                let size = ItemSize::compressed(0x18000, vec![0x4000, 0x2000]);
                let item = Item::new(
                    ItemId(dir_id + file),
                    format!("file{file:03}.bin"),
                    ItemId(dir_id),
                    DataSource::Archive(ArchiveSource::new(offset, size)),
                    ItemFlags::empty(),
                    ItemState::Unchanged,
                )
                .unwrap();
                offset += 0x6000;
                items.add(item).unwrap();
            }
        }
        items
    }

    #[divan::bench]
    fn build(bencher: Bencher) {
        let template = HeaderTemplate::new(NefsVersion::V20).with_archive_name("bench.nefs");
        bencher.with_inputs(items).bench_refs(|items| {
            divan::black_box(Header::build(&template, items, DataLayout::default()).unwrap());
        });
    }

    #[divan::bench]
    fn parse(bencher: Bencher) {
        let template = HeaderTemplate::new(NefsVersion::V20).with_archive_name("bench.nefs");
        let bytes = Header::build(&template, &items(), DataLayout::default())
            .unwrap()
            .to_bytes()
            .unwrap();

        bencher.bench_local(|| {
            divan::black_box(Header::parse(&bytes).unwrap());
        });
    }
}
