// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use log::{debug, info, warn};
use sdio::prelude::*;

use crate::{
    core::{errors::*, utils::path_utils::*, utils::time_utils::FatTimestamp},
    fs::fat32::{
        attr::*,
        codec::*,
        constant::*,
        dir::{self, DirEntryInfo, DirListing, DirRecord},
        file::{FileHandle, OpenFlags},
        fsinfo::FsInfoCache,
        meta::Fat32Meta,
        options::FormatOptions,
        snapshot::*,
        table::{AllocatorState, FatTable},
        types::*,
    },
};

/// One step of a resolved path.
#[derive(Debug, Clone)]
enum Node {
    Root,
    Entry(DirRecord),
}

impl Node {
    fn is_dir(&self) -> bool {
        match self {
            Node::Root => true,
            Node::Entry(record) => record.sfn().is_dir(),
        }
    }
}

/// A mounted FAT32 volume.
///
/// Owns the sector store for its whole lifetime, together with the FAT
/// geometry, the FSInfo cache and the allocation cursor; [`close`] hands the
/// store back.
///
/// [`close`]: VolumeManager::close
pub struct VolumeManager<S: SectorStore> {
    pub(crate) store: S,
    pub(crate) meta: Fat32Meta,
    pub(crate) table: FatTable,
    pub(crate) fsinfo: FsInfoCache,
    pub(crate) alloc: AllocatorState,
}

impl<S: SectorStore> VolumeManager<S> {
    /// Lays out a fresh FAT32 volume over the whole store and mounts it.
    pub fn format(mut store: S, opts: &FormatOptions) -> FsFormatterResult<Self> {
        let meta = Fat32Meta::from_options(store.sector_count(), opts)?;
        let table = FatTable::new(&meta);

        // Reserved region: boot sector, FSInfo and their backups.
        store.zero_sectors(0, meta.reserved_sectors as u32)?;
        let vbr = Fat32Vbr::from_meta(&meta);
        for sector in [FAT_VBR_SECTOR, FAT_VBR_BACKUP_SECTOR] {
            store.write_struct(sector as u64 * SECTOR_SIZE as u64, &vbr)?;
        }

        table.clear(&mut store)?;
        table.write_reserved_entries(&mut store)?;

        let mut fsinfo = FsInfoCache::new(meta.cluster_count, meta.cluster_count, FAT_FIRST_CLUSTER);
        fsinfo.persist(&mut store)?;
        let mut alloc = AllocatorState::new(&meta, FAT_FIRST_CLUSTER);

        let root = table
            .allocate_cluster(&mut store, &mut alloc, &mut fsinfo, None)?
            .ok_or(FsFormatterError::Invalid("no cluster for the root directory"))?;
        crate::ensure!(
            root == meta.root_cluster,
            FsFormatterError::Invalid("root directory not at its BPB cluster")
        );
        store.zero_sectors(meta.cluster_to_sector(root), meta.sectors_per_cluster as u32)?;
        let label = Fat32Entry::volume_label(meta.volume_label, FatTimestamp::now());
        store.write_struct(meta.cluster_offset(root), &label)?;
        store.flush()?;

        info!(
            "fat32: formatted {} sectors, {} clusters of {} bytes, FAT {} sectors x{}",
            meta.total_sectors,
            meta.cluster_count,
            meta.bytes_per_cluster,
            meta.fat_size_sectors,
            meta.num_fats
        );

        Ok(Self {
            store,
            meta,
            table,
            fsinfo,
            alloc,
        })
    }

    /// Mounts an existing volume: validates the boot sector and FSInfo, and
    /// seeds the allocation cursor from the FSInfo hint.
    pub fn init(mut store: S) -> FsResult<Self> {
        let vbr: Fat32Vbr = store.read_struct(FAT_VBR_SECTOR as u64 * SECTOR_SIZE as u64)?;
        let meta = Fat32Meta::from_vbr(&vbr)?;
        crate::ensure!(
            meta.total_sectors <= store.sector_count(),
            FsParsingError::Invalid("volume larger than its container")
        );

        let table = FatTable::new(&meta);
        let fsinfo = FsInfoCache::load(&mut store, &meta, &table)?;
        let alloc = AllocatorState::new(&meta, fsinfo.next_free());

        info!(
            "fat32: mounted {} clusters, {} free, cursor {}",
            meta.cluster_count,
            fsinfo.free_count(),
            alloc.cursor()
        );
        Ok(Self {
            store,
            meta,
            table,
            fsinfo,
            alloc,
        })
    }

    /// Flushes the store and hands it back.
    pub fn close(mut self) -> FsResult<S> {
        self.fsinfo.persist(&mut self.store)?;
        self.store.flush()?;
        info!("fat32: closed, {} free clusters", self.fsinfo.free_count());
        Ok(self.store)
    }

    pub fn flush(&mut self) -> FsResult {
        self.fsinfo.persist(&mut self.store)?;
        self.store.flush()?;
        Ok(())
    }

    // === Accessors ===

    #[inline]
    pub fn meta(&self) -> &Fat32Meta {
        &self.meta
    }

    #[inline]
    pub fn table(&self) -> &FatTable {
        &self.table
    }

    #[inline]
    pub fn fsinfo(&self) -> &FsInfoCache {
        &self.fsinfo
    }

    #[inline]
    pub fn allocator(&self) -> &AllocatorState {
        &self.alloc
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // === FAT pass-through ===

    pub fn get_fat_entry(&mut self, cluster: u32) -> FatTableResult<u32> {
        self.table.get(&mut self.store, cluster)
    }

    /// Reads `cluster` from FAT copy `fat_index`, for mirror diagnostics.
    pub fn get_fat_entry_in(&mut self, cluster: u32, fat_index: u8) -> FatTableResult<u32> {
        self.table.get_in(&mut self.store, cluster, fat_index)
    }

    pub fn set_fat_entry(&mut self, cluster: u32, value: u32) -> FatTableResult {
        self.table.set(&mut self.store, cluster, value)
    }

    /// See [`FatTable::allocate_cluster`].
    pub fn allocate_cluster(&mut self, previous: Option<u32>) -> FatTableResult<Option<u32>> {
        self.table
            .allocate_cluster(&mut self.store, &mut self.alloc, &mut self.fsinfo, previous)
    }

    pub fn allocate_contiguous(&mut self, count: u32) -> FatTableResult<Option<u32>> {
        self.table
            .allocate_contiguous(&mut self.store, &mut self.alloc, &mut self.fsinfo, count)
    }

    pub fn free_chain(&mut self, first: u32) -> FatTableResult<u32> {
        self.table
            .free_chain(&mut self.store, &mut self.alloc, &mut self.fsinfo, first)
    }

    // === Handle support ===

    pub(crate) fn next_cluster(&mut self, cluster: u32) -> FatTableResult<Option<u32>> {
        self.table.next_cluster(&mut self.store, cluster)
    }

    pub(crate) fn read_cluster_bytes(
        &mut self,
        cluster: u32,
        offset: u32,
        buf: &mut [u8],
    ) -> SectorIOResult {
        let at = self.meta.cluster_offset(cluster) + offset as u64;
        self.store.read_bytes(at, buf)
    }

    pub(crate) fn write_cluster_bytes(
        &mut self,
        cluster: u32,
        offset: u32,
        data: &[u8],
    ) -> SectorIOResult {
        let at = self.meta.cluster_offset(cluster) + offset as u64;
        self.store.write_bytes(at, data)
    }

    pub(crate) fn read_entry(&mut self, offset: u64) -> SectorIOResult<Fat32Entry> {
        self.store.read_struct(offset)
    }

    pub(crate) fn write_entry(&mut self, offset: u64, entry: &Fat32Entry) -> SectorIOResult {
        self.store.write_struct(offset, entry)
    }

    // === Directory plumbing ===

    fn load_dir(&mut self, cluster: u32) -> FsResolverResult<DirListing> {
        DirListing::load(&mut self.store, &self.meta, &self.table, cluster)
    }

    fn node_cluster(&self, node: &Node) -> u32 {
        match node {
            Node::Root => self.meta.root_cluster,
            Node::Entry(record) => record.sfn().first_cluster(),
        }
    }

    /// Walks `components` from the root. `Ok(None)` as soon as a component
    /// is missing; a file used as a directory is `NotADirectory`.
    fn resolve(&mut self, components: &[&str]) -> FsResolverResult<Option<Vec<Node>>> {
        let mut stack = vec![Node::Root];
        for &component in components {
            let top = stack.last().ok_or(FsResolverError::Invalid("empty path stack"))?;
            crate::ensure!(top.is_dir(), FsResolverError::NotADirectory);

            match validate_name(component)? {
                "." => {}
                ".." => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                name => {
                    let cluster = self.node_cluster(top);
                    let listing = self.load_dir(cluster)?;
                    match listing.find(&self.meta, name)? {
                        Some(record) => stack.push(Node::Entry(record)),
                        None => return Ok(None),
                    }
                }
            }
        }
        Ok(Some(stack))
    }

    /// Resolves `components` and requires the result to be a directory;
    /// returns its first cluster.
    fn resolve_dir(&mut self, components: &[&str]) -> FsResolverResult<Option<u32>> {
        let Some(stack) = self.resolve(components)? else {
            return Ok(None);
        };
        let top = stack.last().ok_or(FsResolverError::Invalid("empty path stack"))?;
        crate::ensure!(top.is_dir(), FsResolverError::NotADirectory);
        Ok(Some(self.node_cluster(top)))
    }

    /// Inserts a new entry set named `name` into the directory at
    /// `dir_cluster`.
    fn insert_entry(
        &mut self,
        dir_cluster: u32,
        name: &str,
        attr: Fat32Attributes,
        cluster: u32,
        stamp: FatTimestamp,
    ) -> FsResolverResult<DirRecord> {
        crate::ensure!(
            !is_dot_component(name),
            FsResolverError::InvalidName("reserved name")
        );
        let mut listing = self.load_dir(dir_cluster)?;
        crate::ensure!(
            listing.find(&self.meta, name)?.is_none(),
            FsResolverError::AlreadyExists
        );

        let short = compute_short_name(name, &listing.short_names())?;
        let entries = encode_entries(name, &short, attr, cluster, 0, stamp);
        let offsets = listing.insert(
            &mut self.store,
            &self.meta,
            &self.table,
            &mut self.alloc,
            &mut self.fsinfo,
            &entries,
        )?;
        Ok(DirRecord {
            name: name.into(),
            entries,
            offsets,
        })
    }

    /// Zeroes a fresh directory cluster and writes its `.` and `..` entries.
    /// `..` holds 0 when the parent is the root.
    fn seed_dir(&mut self, cluster: u32, parent_cluster: u32, stamp: FatTimestamp) -> SectorIOResult {
        self.store
            .zero_sectors(self.meta.cluster_to_sector(cluster), self.meta.sectors_per_cluster as u32)?;
        let dotdot = if parent_cluster == self.meta.root_cluster {
            0
        } else {
            parent_cluster
        };
        let base = self.meta.cluster_offset(cluster);
        self.store.write_struct(base, &Fat32Entry::dot(cluster, stamp))?;
        self.store
            .write_struct(base + FAT_DIR_ENTRY_SIZE as u64, &Fat32Entry::dotdot(dotdot, stamp))
    }

    /// Frees the chain behind `record` and zeroes its size and first
    /// cluster on disk (`O_TRUNC`).
    fn truncate_entry(&mut self, record: &mut DirRecord) -> FsResolverResult {
        let first = record.sfn().first_cluster();
        if first != 0 {
            self.free_chain(first)?;
        }
        let entry = &mut record.entries.entry;
        entry.set_first_cluster(0);
        entry.file_size = 0;
        entry.touch(FatTimestamp::now());
        let entry = *entry;
        self.write_entry(record.sfn_offset(), &entry)?;
        debug!("fat32: truncated {:?}", record.name);
        Ok(())
    }

    /// Creates one directory named `name` under `parent_cluster`.
    fn create_dir(&mut self, parent_cluster: u32, name: &str) -> FsResolverResult<DirRecord> {
        let stamp = FatTimestamp::now();
        let cluster = self
            .allocate_cluster(None)?
            .ok_or(FsResolverError::NoSpace)?;

        let inserted = self
            .seed_dir(cluster, parent_cluster, stamp)
            .map_err(FsResolverError::from)
            .and_then(|_| {
                self.insert_entry(parent_cluster, name, Fat32Attributes::DIRECTORY, cluster, stamp)
            });
        match inserted {
            Ok(record) => {
                debug!("fat32: mkdir {name:?} at cluster {cluster}");
                Ok(record)
            }
            Err(e) => {
                if let Err(free_err) = self.free_chain(cluster) {
                    warn!("fat32: could not release cluster {cluster}: {free_err}");
                }
                Err(e)
            }
        }
    }

    fn handle_for(&mut self, node: &Node, flags: OpenFlags) -> FsResolverResult<FileHandle> {
        match node {
            Node::Root => Ok(FileHandle::root(self.meta.root_cluster)),
            Node::Entry(record) => {
                let first = record.sfn().first_cluster();
                let contiguous = if first == 0 {
                    true
                } else {
                    let chain = self.table.chain(&mut self.store, first)?;
                    chain.windows(2).all(|w| w[1] == w[0] + 1)
                };
                Ok(FileHandle::from_record(record, flags, contiguous))
            }
        }
    }

    // === Public operations ===

    /// The fixed root directory handle (`ROOT32 | DIRECTORY`).
    pub fn open_root_directory(&self) -> FileHandle {
        FileHandle::root(self.meta.root_cluster)
    }

    /// Live entries of the directory behind `dir`: the label, then every
    /// named entry. Tombstones and the `.`/`..` entries are skipped.
    pub fn read_dir(&mut self, dir: &FileHandle) -> FsResolverResult<Vec<DirEntryInfo>> {
        crate::ensure!(dir.is_dir(), FsResolverError::NotADirectory);
        let listing = self.load_dir(dir.first_cluster())?;
        Ok(listing
            .records(&self.meta)?
            .iter()
            .filter(|r| !r.sfn().is_dot_or_dotdot())
            .map(DirRecord::info)
            .collect())
    }

    /// Opens `path`.
    ///
    /// Returns `Ok(None)` when a component is missing, unless `O_CREAT` is
    /// set and only the final component is missing.
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> FsResolverResult<Option<FileHandle>> {
        crate::ensure!(
            flags.is_valid_access(),
            FsResolverError::Invalid("invalid access mode")
        );
        let components = split_path(path);

        if let Some(mut stack) = self.resolve(&components)? {
            crate::ensure!(
                !(flags.contains(OpenFlags::O_CREAT) && flags.contains(OpenFlags::O_EXCL)),
                FsResolverError::AlreadyExists
            );
            let mut node = stack.pop().ok_or(FsResolverError::Invalid("empty path stack"))?;
            crate::ensure!(
                !(node.is_dir() && flags.is_writable()),
                FsResolverError::NotAFile
            );
            if let Node::Entry(record) = &mut node
                && flags.contains(OpenFlags::O_TRUNC)
                && flags.is_writable()
            {
                self.truncate_entry(record)?;
            }

            let handle = self.handle_for(&node, flags)?;
            if flags.contains(OpenFlags::O_AT_END) {
                return Ok(Some(handle.at_end()));
            }
            return Ok(Some(handle));
        }

        if !flags.contains(OpenFlags::O_CREAT) {
            return Ok(None);
        }
        let Some((parent, name)) = split_parent(path) else {
            return Ok(None);
        };
        let Some(dir_cluster) = self.resolve_dir(&parent)? else {
            return Ok(None);
        };
        let name = validate_name(name)?;
        let record = self.insert_entry(
            dir_cluster,
            name,
            Fat32Attributes::ARCHIVE,
            0,
            FatTimestamp::now(),
        )?;
        debug!("fat32: created {path:?}");
        Ok(Some(FileHandle::from_record(&record, flags, true)))
    }

    /// Creates an empty file and returns a read/write handle on it.
    pub fn create_file(&mut self, path: &str) -> FsResolverResult<FileHandle> {
        let flags = OpenFlags::O_RDWR | OpenFlags::O_CREAT | OpenFlags::O_EXCL;
        let (parent, _) = split_parent(path).ok_or(FsResolverError::AlreadyExists)?;
        crate::ensure!(
            self.resolve_dir(&parent)?.is_some(),
            FsResolverError::NotFound
        );
        self.open(path, flags)?.ok_or(FsResolverError::NotFound)
    }

    /// Creates `path` and every missing parent.
    pub fn mkdir(&mut self, path: &str) -> FsResolverResult {
        let components = split_path(path);
        crate::ensure!(!components.is_empty(), FsResolverError::AlreadyExists);

        let mut stack = vec![Node::Root];
        for (i, &component) in components.iter().enumerate() {
            let is_last = i + 1 == components.len();
            let top = stack.last().ok_or(FsResolverError::Invalid("empty path stack"))?;
            crate::ensure!(top.is_dir(), FsResolverError::NotADirectory);
            let cluster = self.node_cluster(top);

            match validate_name(component)? {
                "." | ".." if is_last => crate::bail!(FsResolverError::AlreadyExists),
                "." => {}
                ".." => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                name => {
                    let listing = self.load_dir(cluster)?;
                    match listing.find(&self.meta, name)? {
                        Some(_) if is_last => crate::bail!(FsResolverError::AlreadyExists),
                        Some(record) => {
                            crate::ensure!(record.sfn().is_dir(), FsResolverError::NotADirectory);
                            stack.push(Node::Entry(record));
                        }
                        None => {
                            let record = self.create_dir(cluster, name)?;
                            stack.push(Node::Entry(record));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Removes an empty directory: its entry set is tombstoned in place and
    /// its cluster chain released.
    pub fn rm_dir(&mut self, path: &str) -> FsResolverResult {
        let stack = self
            .resolve(&split_path(path))?
            .ok_or(FsResolverError::NotFound)?;
        let record = match stack.last() {
            Some(Node::Entry(record)) => record.clone(),
            _ => crate::bail!(FsResolverError::RootDirectory),
        };
        crate::ensure!(record.sfn().is_dir(), FsResolverError::NotADirectory);

        // Loading the listing walks the whole chain, so a corrupt chain fails
        // before the entry is tombstoned.
        let first = record.sfn().first_cluster();
        if first != 0 {
            let listing = self.load_dir(first)?;
            crate::ensure!(listing.is_empty(&self.meta)?, FsResolverError::NotEmpty);
        }

        dir::tombstone(&mut self.store, &record)?;
        if first != 0 {
            self.free_chain(first)?;
        }
        debug!("fat32: rmdir {path:?}");
        Ok(())
    }

    /// Removes a file: tombstones its entry set and releases its chain.
    pub fn remove(&mut self, path: &str) -> FsResolverResult {
        let stack = self
            .resolve(&split_path(path))?
            .ok_or(FsResolverError::NotFound)?;
        let record = match stack.last() {
            Some(Node::Entry(record)) => record.clone(),
            _ => crate::bail!(FsResolverError::RootDirectory),
        };
        crate::ensure!(!record.sfn().is_dir(), FsResolverError::NotAFile);

        // A corrupt chain must fail before the entry is gone.
        let first = record.sfn().first_cluster();
        if first != 0 {
            self.table.chain(&mut self.store, first)?;
        }
        dir::tombstone(&mut self.store, &record)?;
        if first != 0 {
            self.free_chain(first)?;
        }
        debug!("fat32: removed {path:?}");
        Ok(())
    }

    // === Snapshots ===

    pub fn state(&self) -> VolumeState {
        VolumeState::capture(&self.meta, &self.fsinfo, &self.alloc)
    }

    /// Entries `0..=lastCluster` of FAT1.
    pub fn fat_snapshot(&mut self) -> FatTableResult<FatTableSnapshot> {
        let entries = self.table.entries(&mut self.store, 0)?;
        Ok(FatTableSnapshot::new(entries, &self.fsinfo))
    }

    pub fn directory_snapshot(&mut self, path: &str) -> FsResolverResult<DirectorySnapshot> {
        let components = split_path(path);
        let first_cluster = self
            .resolve_dir(&components)?
            .ok_or(FsResolverError::NotFound)?;
        let listing = self.load_dir(first_cluster)?;
        let entries = listing
            .records(&self.meta)?
            .iter()
            .map(DirRecord::info)
            .collect();
        Ok(DirectorySnapshot::new(path, first_cluster, entries))
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    fn volume() -> VolumeManager<MemSectorStore> {
        let store = MemSectorStore::with_megabytes(64).unwrap();
        VolumeManager::format(store, &FormatOptions::new().with_label("MY VOLUME")).unwrap()
    }

    #[test]
    fn test_format_layout() {
        let mut vol = volume();
        assert_eq!(vol.fsinfo().free_count(), vol.meta().cluster_count - 1);
        assert_eq!(vol.get_fat_entry(2).unwrap(), FAT_EOC);
        assert_eq!(vol.store.read_u32_at(vol.meta.fat_entry_offset(0, 0)).unwrap(), 0x0FFF_FFF8);
        assert_eq!(vol.store.read_u32_at(vol.meta.fat_entry_offset(1, 1)).unwrap(), 0x0FFF_FFFF);
        assert_eq!(vol.store.read_u16_at(510).unwrap(), 0xAA55);
        assert_eq!(vol.store.read_u16_at(6 * 512 + 510).unwrap(), 0xAA55);

        let root = vol.open_root_directory();
        assert!(root.is_root() && root.is_dir());
        let listing = vol.read_dir(&root).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "MY VOLUME  ");
        assert_eq!(listing[0].attr, 0x28);
    }

    #[test]
    fn test_init_roundtrip() {
        let mut vol = volume();
        vol.mkdir("docs").unwrap();
        let free = vol.fsinfo().free_count();
        let meta = vol.meta().clone();

        let store = vol.close().unwrap();
        let mut vol = VolumeManager::init(store).unwrap();
        assert_eq!(vol.meta(), &meta);
        assert_eq!(vol.fsinfo().free_count(), free);
        assert!(vol.open("DOCS", OpenFlags::O_RDONLY).unwrap().is_some());
    }

    #[test]
    fn test_init_rejects_garbage() {
        let store = MemSectorStore::with_megabytes(64).unwrap();
        assert!(matches!(
            VolumeManager::init(store),
            Err(FsError::Parsing(FsParsingError::Invalid(_)))
        ));
    }

    #[test]
    fn test_open_missing_is_none() {
        let mut vol = volume();
        assert!(vol.open("nope.txt", OpenFlags::O_RDONLY).unwrap().is_none());
        assert!(vol.open("a/b/c", OpenFlags::O_RDONLY).unwrap().is_none());
        assert!(vol
            .open("missing/file", OpenFlags::O_RDWR | OpenFlags::O_CREAT)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_open_flags() {
        let mut vol = volume();
        vol.create_file("f.txt").unwrap();

        assert_eq!(
            vol.open("f.txt", OpenFlags::O_RDWR | OpenFlags::O_CREAT | OpenFlags::O_EXCL)
                .unwrap_err(),
            FsResolverError::AlreadyExists
        );
        assert_eq!(
            vol.open("f.txt", OpenFlags::O_ACCMODE).unwrap_err(),
            FsResolverError::Invalid("invalid access mode")
        );
        vol.mkdir("d").unwrap();
        assert_eq!(
            vol.open("d", OpenFlags::O_WRONLY).unwrap_err(),
            FsResolverError::NotAFile
        );
        assert_eq!(
            vol.open("f.txt/x", OpenFlags::O_RDONLY).unwrap_err(),
            FsResolverError::NotADirectory
        );

        let created = vol
            .open("d/new.txt", OpenFlags::O_WRONLY | OpenFlags::O_CREAT)
            .unwrap()
            .unwrap();
        assert_eq!(created.file_size(), 0);
        assert_eq!(created.first_cluster(), 0);
    }

    #[test]
    fn test_trunc_and_at_end() {
        let mut vol = volume();
        let mut f = vol.create_file("t.bin").unwrap();
        f.write(&mut vol, &[7u8; 3000]).unwrap();
        f.close(&mut vol).unwrap();
        let free = vol.fsinfo().free_count();

        let f = vol.open("t.bin", OpenFlags::O_RDONLY | OpenFlags::O_AT_END).unwrap().unwrap();
        assert_eq!(f.position(), 3000);

        let f = vol.open("t.bin", OpenFlags::O_RDWR | OpenFlags::O_TRUNC).unwrap().unwrap();
        assert_eq!(f.file_size(), 0);
        assert_eq!(f.first_cluster(), 0);
        assert_eq!(vol.fsinfo().free_count(), free + 6);

        let f = vol.open("t.bin", OpenFlags::O_RDONLY).unwrap().unwrap();
        assert_eq!(f.file_size(), 0);
    }

    #[test]
    fn test_mkdir_nested_dot_entries() {
        let mut vol = volume();
        vol.mkdir("a/b/c").unwrap();

        let b = vol.open("a/b", OpenFlags::O_RDONLY).unwrap().unwrap();
        let c = vol.open("a/b/c", OpenFlags::O_RDONLY).unwrap().unwrap();
        let a = vol.open("a", OpenFlags::O_RDONLY).unwrap().unwrap();

        let base = vol.meta.cluster_offset(c.first_cluster());
        let dot: Fat32Entry = vol.store.read_struct(base).unwrap();
        let dotdot: Fat32Entry = vol.store.read_struct(base + 32).unwrap();
        assert_eq!(dot.first_cluster(), c.first_cluster());
        assert_eq!(dotdot.first_cluster(), b.first_cluster());

        let a_dotdot: Fat32Entry = vol
            .store
            .read_struct(vol.meta.cluster_offset(a.first_cluster()) + 32)
            .unwrap();
        assert_eq!(a_dotdot.first_cluster(), 0);

        assert_eq!(vol.mkdir("a/b"), Err(FsResolverError::AlreadyExists));
        assert!(vol.open("a/b/c/../..", OpenFlags::O_RDONLY).unwrap().is_some());
    }

    #[test]
    fn test_mkdir_through_file_fails() {
        let mut vol = volume();
        vol.create_file("plain").unwrap();
        assert_eq!(vol.mkdir("plain/sub"), Err(FsResolverError::NotADirectory));
    }

    #[test]
    fn test_rm_dir_rules() {
        let mut vol = volume();
        vol.mkdir("full/inner").unwrap();
        assert_eq!(vol.rm_dir("/"), Err(FsResolverError::RootDirectory));
        assert_eq!(vol.rm_dir("ghost"), Err(FsResolverError::NotFound));
        assert_eq!(vol.rm_dir("full"), Err(FsResolverError::NotEmpty));

        vol.create_file("full/file.txt").unwrap();
        assert_eq!(vol.rm_dir("full/file.txt"), Err(FsResolverError::NotADirectory));

        let free = vol.fsinfo().free_count();
        vol.rm_dir("full/inner").unwrap();
        assert_eq!(vol.fsinfo().free_count(), free + 1);
        assert!(vol.open("full/inner", OpenFlags::O_RDONLY).unwrap().is_none());
    }

    #[test]
    fn test_rm_dir_tombstones_in_place() {
        let mut vol = volume();
        let root = vol.meta.root_cluster;
        vol.mkdir("Long Directory Name").unwrap();
        let before = vol.load_dir(root).unwrap();

        vol.rm_dir("long directory name").unwrap();
        let after = vol.load_dir(root).unwrap();
        assert_eq!(after.slot_count(), before.slot_count());
        // Label in slot 0, then two LFN records and the short entry.
        for i in 1..4 {
            assert_eq!(after.slot(i).unwrap()[0], FAT_ENTRY_DELETED);
            assert_eq!(after.slot(i).unwrap()[1..], before.slot(i).unwrap()[1..]);
        }
        assert!(vol.open("Long Directory Name", OpenFlags::O_RDONLY).unwrap().is_none());
    }

    #[test]
    fn test_remove_file() {
        let mut vol = volume();
        let mut f = vol.create_file("big.bin").unwrap();
        let free = vol.fsinfo().free_count();
        f.write(&mut vol, &[1u8; 5000]).unwrap();
        f.close(&mut vol).unwrap();
        assert_eq!(vol.fsinfo().free_count(), free - 10);

        vol.mkdir("dir").unwrap();
        assert_eq!(vol.remove("dir"), Err(FsResolverError::NotAFile));
        vol.remove("BIG.BIN").unwrap();
        assert_eq!(vol.fsinfo().free_count(), free - 1);
        assert!(vol.open("big.bin", OpenFlags::O_RDONLY).unwrap().is_none());
        assert_eq!(vol.remove("big.bin"), Err(FsResolverError::NotFound));
    }

    #[test]
    fn test_corrupt_chain_keeps_entry() {
        let mut vol = volume();
        let bpc = vol.meta().bytes_per_cluster as usize;
        let mut f = vol.create_file("frag.bin").unwrap();
        f.write(&mut vol, &vec![7u8; 3 * bpc]).unwrap();
        f.close(&mut vol).unwrap();
        let first = f.first_cluster();
        vol.set_fat_entry(first + 1, FAT_FREE).unwrap();
        let free = vol.fsinfo().free_count();

        assert!(matches!(
            vol.remove("frag.bin"),
            Err(FsResolverError::Table(FatTableError::Corrupt { .. }))
        ));
        assert!(vol.open("frag.bin", OpenFlags::O_RDONLY).unwrap().is_some());
        assert_eq!(vol.get_fat_entry(first).unwrap(), first + 1);

        vol.mkdir("d").unwrap();
        let d = vol.open("d", OpenFlags::O_RDONLY).unwrap().unwrap();
        vol.set_fat_entry(d.first_cluster(), FAT_FREE).unwrap();
        let free_with_dir = vol.fsinfo().free_count();
        assert!(matches!(
            vol.rm_dir("d"),
            Err(FsResolverError::Table(FatTableError::Corrupt { .. }))
        ));
        assert!(vol.open("d", OpenFlags::O_RDONLY).unwrap().is_some());
        assert_eq!(vol.fsinfo().free_count(), free_with_dir);
        assert_eq!(free_with_dir, free - 1);
    }

    #[test]
    fn test_create_file_errors() {
        let mut vol = volume();
        vol.create_file("x.txt").unwrap();
        assert_eq!(vol.create_file("X.TXT").unwrap_err(), FsResolverError::AlreadyExists);
        assert_eq!(vol.create_file("/").unwrap_err(), FsResolverError::AlreadyExists);
        assert_eq!(vol.create_file("no/dir.txt").unwrap_err(), FsResolverError::NotFound);
        assert!(matches!(
            vol.create_file("bad:name").unwrap_err(),
            FsResolverError::InvalidName(_)
        ));
    }

    #[test]
    fn test_root_directory_grows() {
        let mut vol = volume();
        // 16 slots per cluster, one used by the label.
        for i in 0..40 {
            vol.create_file(&format!("file{i:02}.dat")).unwrap();
        }
        let root = vol.open_root_directory();
        assert_eq!(vol.read_dir(&root).unwrap().len(), 41);
        let chain = vol.table.chain(&mut vol.store, 2).unwrap();
        assert_eq!(chain.len(), 3);
    }
}
