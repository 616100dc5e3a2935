// SPDX-License-Identifier: MIT

use sdfat::fat32::*;

const SIZE_MB: u32 = 64;
const EOC: u32 = 0x0FFF_FFFF;

fn fresh() -> VolumeManager<MemSectorStore> {
    let store = MemSectorStore::with_megabytes(SIZE_MB).expect("store");
    VolumeManager::format(store, &FormatOptions::new().with_label("SDCARD")).expect("format failed")
}

fn remount(vol: VolumeManager<MemSectorStore>) -> VolumeManager<MemSectorStore> {
    let store = vol.close().expect("close failed");
    VolumeManager::init(store).expect("init failed")
}

#[test]
fn test_fat_entries_are_mirrored_and_range_checked() {
    let mut vol = fresh();
    let count = vol.table().entry_count();

    vol.set_fat_entry(100, 200).unwrap();
    vol.set_fat_entry(count - 1, EOC).unwrap();
    assert_eq!(vol.get_fat_entry(100).unwrap(), 200);
    assert_eq!(vol.get_fat_entry(count - 1).unwrap(), EOC);

    assert_eq!(vol.get_fat_entry_in(100, 1).unwrap(), 200);
    assert_eq!(vol.get_fat_entry_in(count - 1, 1).unwrap(), EOC);

    assert_eq!(vol.get_fat_entry(1), Err(FatTableError::OutOfRange(1)));
    assert_eq!(vol.set_fat_entry(count, 0), Err(FatTableError::OutOfRange(count)));
}

#[test]
fn test_allocations_are_distinct_and_counted() {
    let mut vol = fresh();
    let free_before = vol.fsinfo().free_count();

    let mut seen = std::collections::BTreeSet::new();
    for _ in 0..50 {
        let cluster = vol.allocate_cluster(None).unwrap().expect("volume full");
        assert!(seen.insert(cluster), "cluster {cluster} handed out twice");
        assert_eq!(vol.get_fat_entry(cluster).unwrap(), EOC);
    }
    assert_eq!(vol.fsinfo().free_count(), free_before - 50);

    let first = *seen.iter().next().unwrap();
    let linked = vol.allocate_cluster(Some(first)).unwrap().unwrap();
    assert_eq!(vol.get_fat_entry(first).unwrap(), linked);
    assert_eq!(vol.free_chain(first).unwrap(), 2);
    assert_eq!(vol.fsinfo().free_count(), free_before - 49);
}

#[test]
fn test_nested_mkdir_survives_remount() {
    let mut vol = fresh();
    vol.mkdir("/a/b/c").unwrap();
    let mut vol = remount(vol);
    let c_handle = vol.open("a/b/c", OpenFlags::O_RDONLY).unwrap().expect("a/b/c missing");
    assert!(c_handle.is_dir());

    let a = vol.directory_snapshot("/a").unwrap();
    let b = vol.directory_snapshot("/a/b").unwrap();
    let c = vol.directory_snapshot("/a/b/c").unwrap();

    assert_eq!(a.entries[0].name, ".");
    assert_eq!(a.entries[0].first_cluster, a.first_cluster);
    assert_eq!(a.entries[1].first_cluster, 0, "`..` of a root child is 0");
    assert_eq!(b.entries[1].first_cluster, a.first_cluster);
    assert_eq!(c.entries[1].first_cluster, b.first_cluster);
    assert_eq!(c.entries.len(), 2);
    assert_eq!(c.first_cluster, c_handle.first_cluster());

    assert!(vol.check().unwrap().ok());
}

#[test]
fn test_rm_dir_leaves_tombstones() {
    let mut vol = fresh();
    vol.mkdir("keep").unwrap();
    vol.mkdir("A directory with a long name").unwrap();
    let before = vol.directory_snapshot("/").unwrap().entries.len();
    let free_before = vol.fsinfo().free_count();

    vol.rm_dir("A directory with a long name").unwrap();
    assert_eq!(vol.fsinfo().free_count(), free_before + 1);
    assert!(vol.open("A directory with a long name", OpenFlags::O_RDONLY).unwrap().is_none());

    let root = vol.open_root_directory();
    let names: Vec<String> = vol.read_dir(&root).unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, ["SDCARD     ", "keep"]);
    assert_eq!(vol.directory_snapshot("/").unwrap().entries.len(), before - 1);

    // The four freed slots (three LFN + short) take the next name of that length.
    vol.mkdir("Another long directory name").unwrap();
    let snap = vol.directory_snapshot("/").unwrap();
    assert_eq!(snap.entries.len(), before);
    assert_eq!(snap.entries.last().unwrap().name, "Another long directory name");
}

#[test]
fn test_multi_cluster_file_roundtrip() {
    let mut vol = fresh();
    let bpc = vol.meta().bytes_per_cluster as usize;
    let data: Vec<u8> = (0..5 * bpc + 77).map(|i| (i * 31 % 251) as u8).collect();

    let mut f = vol.create_file("/dump.bin").unwrap();
    assert_eq!(f.write(&mut vol, &data).unwrap(), data.len());
    f.close(&mut vol).unwrap();

    let mut vol = remount(vol);
    let mut f = vol.open("/DUMP.BIN", OpenFlags::O_RDONLY).unwrap().expect("file missing");
    assert_eq!(f.file_size() as usize, data.len());

    let mut back = Vec::new();
    loop {
        let chunk = f.read(&mut vol, 700).unwrap();
        if chunk.is_empty() {
            break;
        }
        back.extend_from_slice(&chunk);
    }
    assert_eq!(back, data);
    assert!(f.read(&mut vol, 1).unwrap().is_empty());
}

#[test]
fn test_listing_starts_with_label() {
    let mut vol = fresh();
    vol.create_file("one.txt").unwrap();
    vol.mkdir("two").unwrap();

    let root = vol.open_root_directory();
    let entries = vol.read_dir(&root).unwrap();
    assert!(entries[0].is_label());
    assert_eq!(entries[0].name, "SDCARD     ");
    assert_eq!(entries[1].name, "one.txt");
    assert!(!entries[1].is_dir());
    assert!(entries[2].is_dir());
}

#[test]
fn test_long_names_roundtrip() {
    let long = "x".repeat(200);
    let names = [
        "The quick brown fox.txt",
        "a much longer name that needs several records.data",
        "Mixed Case.Txt",
        "spaces in the middle",
        "dots.in.the.middle.tar.gz",
        "unicodé naïve.txt",
        "日本語のファイル.bin",
        long.as_str(),
        "+plus,comma;semi=eq[brackets].txt",
        "Save Slot 01.sav",
    ];

    let mut vol = fresh();
    vol.mkdir("long").unwrap();
    for name in names {
        let mut f = vol.create_file(&format!("long/{name}")).unwrap();
        f.write(&mut vol, name.as_bytes()).unwrap();
    }

    let mut vol = remount(vol);
    for name in names {
        let mut f = vol
            .open(&format!("/long/{}", name.to_uppercase()), OpenFlags::O_RDONLY)
            .unwrap()
            .unwrap_or_else(|| panic!("{name} not found"));
        assert_eq!(f.name(), name);
        assert_eq!(f.read(&mut vol, 512).unwrap(), name.as_bytes());
    }

    let snap = vol.directory_snapshot("/long").unwrap();
    let mut shorts: Vec<&str> = snap.entries.iter().map(|e| e.short_name.as_str()).collect();
    shorts.sort_unstable();
    shorts.dedup();
    assert_eq!(shorts.len(), snap.entries.len(), "short names must be unique");
}

#[test]
fn test_mirrors_and_free_count_hold_after_mutations() {
    let mut vol = fresh();
    vol.mkdir("x/y").unwrap();
    for i in 0..20 {
        let mut f = vol.create_file(&format!("x/y/file {i}.dat")).unwrap();
        f.write(&mut vol, &vec![i as u8; 600 * i]).unwrap();
    }
    for i in (0..20).step_by(3) {
        vol.remove(&format!("x/y/file {i}.dat")).unwrap();
    }
    let mut f = vol
        .open("x/y/file 1.dat", OpenFlags::O_WRONLY | OpenFlags::O_TRUNC)
        .unwrap()
        .unwrap();
    f.write(&mut vol, b"short").unwrap();

    let rep = vol.check().unwrap();
    assert!(rep.ok(), "{rep}");
    assert_eq!(rep.count(Severity::Warn), 0, "{rep}");

    let snap = vol.fat_snapshot().unwrap();
    assert_eq!(snap.counted_free(), vol.fsinfo().free_count());

    let vol = remount(vol);
    assert_eq!(vol.fsinfo().free_count(), snap.free_count);
}

#[test]
fn test_full_volume_reports_no_space() {
    let mut vol = fresh();
    let free = vol.fsinfo().free_count();
    let bpc = vol.meta().bytes_per_cluster as usize;

    let mut f = vol.create_file("fill.bin").unwrap();
    let chunk = vec![0xEEu8; 4 << 20];
    let err = loop {
        if let Err(e) = f.write(&mut vol, &chunk) {
            break e;
        }
    };
    assert_eq!(err, FsFileError::NoSpace);
    assert_eq!(vol.fsinfo().free_count(), 0);
    // The bytes that fit are kept and recorded.
    assert_eq!(f.file_size() as usize, free as usize * bpc);
    assert_eq!(vol.mkdir("late"), Err(FsResolverError::NoSpace));

    let vol = remount(vol);
    assert_eq!(vol.fsinfo().free_count(), 0);
}

#[derive(Default)]
struct WriteLog(Vec<u32>);

impl IOTracer for WriteLog {
    fn on_write(&mut self, lba: u32) {
        self.0.push(lba);
    }
}

#[test]
fn test_fat_update_touches_both_copies() {
    let mut store = fresh().close().unwrap();
    let mut vol = VolumeManager::init(TracingStore::new(&mut store, WriteLog::default())).unwrap();
    let fat_start = vol.meta().fat_start_sector(0);
    let fat_size = vol.meta().fat_size_sectors;

    vol.set_fat_entry(300, EOC).unwrap();
    let log = vol.close().unwrap().into_tracer().0;
    let sector = fat_start + 300 / 128;
    assert_eq!(log[..2], [sector, sector + fat_size]);

    let mut counter = IOCounter::new(&mut store);
    let mut vol = VolumeManager::init(&mut counter).unwrap();
    assert_eq!(vol.get_fat_entry(300).unwrap(), EOC);
    drop(vol);
    assert_eq!(counter.snapshot().writes, 0, "mounting and reading must not write");
}
