use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};

use sdfat::fat32::*;

criterion_group!(benches, fat32_format_bench, fat32_component_bench, fat32_io_bench);
criterion_main!(benches);

const SIZE_MB: u32 = 64;

fn formatted() -> VolumeManager<MemSectorStore> {
    let store = MemSectorStore::with_megabytes(SIZE_MB).expect("store");
    VolumeManager::format(store, &FormatOptions::new().with_label("BENCH")).expect("format failed")
}

pub fn fat32_format_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("fat32_format");
    group.throughput(Throughput::Bytes(SIZE_MB as u64 * 1024 * 1024));

    group.bench_function("format_64mb_mem", |b| {
        b.iter(formatted);
    });

    group.bench_function("format_64mb_file", |b| {
        b.iter(|| {
            let file = tempfile::tempfile().expect("tempfile failed");
            let store = StdSectorStore::create_sized(file, SIZE_MB).expect("store");
            VolumeManager::format(store, &FormatOptions::new()).expect("format failed")
        });
    });

    group.finish();
}

pub fn fat32_component_bench(c: &mut Criterion) {
    let base = formatted().close().expect("close failed").into_image();

    c.bench_function("fat32_allocate_1000", |b| {
        b.iter_batched(
            || VolumeManager::init(MemSectorStore::from_image(base.clone()).unwrap()).unwrap(),
            |mut vol| {
                let mut last = None;
                for _ in 0..1000 {
                    last = vol.allocate_cluster(last).expect("allocate failed");
                }
                vol
            },
            BatchSize::LargeInput,
        );
    });

    c.bench_function("fat32_mkdir_100", |b| {
        b.iter_batched(
            || VolumeManager::init(MemSectorStore::from_image(base.clone()).unwrap()).unwrap(),
            |mut vol| {
                for i in 0..100 {
                    vol.mkdir(&format!("dir {i:03}/nested")).expect("mkdir failed");
                }
                vol
            },
            BatchSize::LargeInput,
        );
    });

    c.bench_function("fat32_check", |b| {
        let mut vol = VolumeManager::init(MemSectorStore::from_image(base.clone()).unwrap()).unwrap();
        vol.mkdir("a/b/c").unwrap();
        b.iter(|| vol.check().expect("check failed"));
    });
}

pub fn fat32_io_bench(c: &mut Criterion) {
    const WRITE_SIZE: usize = 4 * 1024 * 1024;
    let base = formatted().close().expect("close failed").into_image();
    let content = vec![0xAAu8; WRITE_SIZE];

    let mut group = c.benchmark_group("fat32_io");
    group.throughput(Throughput::Bytes(WRITE_SIZE as u64));

    group.bench_function("write_4mb", |b| {
        b.iter_batched(
            || VolumeManager::init(MemSectorStore::from_image(base.clone()).unwrap()).unwrap(),
            |mut vol| {
                let mut f = vol.create_file("bench.bin").unwrap();
                f.write(&mut vol, &content).unwrap();
                f.close(&mut vol).unwrap();
                vol
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("read_4mb", |b| {
        let mut vol = VolumeManager::init(MemSectorStore::from_image(base.clone()).unwrap()).unwrap();
        let mut f = vol.create_file("bench.bin").unwrap();
        f.write(&mut vol, &content).unwrap();
        f.close(&mut vol).unwrap();

        b.iter(|| {
            let mut f = vol.open("bench.bin", OpenFlags::O_RDONLY).unwrap().unwrap();
            f.read(&mut vol, WRITE_SIZE).unwrap()
        });
    });

    group.finish();
}
