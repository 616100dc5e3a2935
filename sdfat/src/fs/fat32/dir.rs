// SPDX-License-Identifier: MIT

//! Directory cluster chains as flat arrays of 32-byte slots.
//!
//! Entries are never moved: deletion writes `0xE5` over the first name byte
//! of every slot of the set, and insertion reuses tombstones or slots past
//! the end marker before growing the chain.

use alloc::{string::String, vec::Vec};

use log::{debug, trace, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use sdio::prelude::*;

use crate::{
    core::errors::*,
    fs::fat32::{
        attr::*, codec::*, constant::*, fsinfo::FsInfoCache, meta::Fat32Meta,
        table::{AllocatorState, FatTable},
        types::*,
    },
};

const SLOT: usize = FAT_DIR_ENTRY_SIZE as usize;

/// A live entry set found in a directory.
#[derive(Debug, Clone)]
pub struct DirRecord {
    /// Long name when a valid LFN chain precedes the short entry, the decoded
    /// short name otherwise.
    pub name: String,
    pub entries: Fat32Entries,
    /// Absolute byte offset of every slot of the set, short entry last.
    pub offsets: Vec<u64>,
}

impl DirRecord {
    #[inline]
    pub fn sfn(&self) -> &Fat32Entry {
        self.entries.sfn_entry()
    }

    /// Offset of the short entry.
    #[inline]
    pub fn sfn_offset(&self) -> u64 {
        self.offsets.last().copied().unwrap_or_default()
    }

    /// Decoded 8.3 name.
    pub fn short_name(&self) -> String {
        let sfn = self.sfn();
        decode_short_name(&sfn.name, sfn.nt_case())
    }

    /// `true` when `name` matches the long name or the short name, ignoring
    /// case.
    pub fn matches(&self, name: &str) -> bool {
        names_equal(&self.name, name) || names_equal(&self.short_name(), name)
    }

    pub fn info(&self) -> DirEntryInfo {
        let sfn = self.sfn();
        DirEntryInfo {
            name: self.name.clone(),
            short_name: self.short_name(),
            attr: sfn.attr,
            first_cluster: sfn.first_cluster(),
            size: sfn.file_size,
        }
    }
}

/// Listing view of a directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DirEntryInfo {
    pub name: String,
    pub short_name: String,
    pub attr: u8,
    pub first_cluster: u32,
    pub size: u32,
}

impl DirEntryInfo {
    #[inline]
    pub fn attributes(&self) -> Fat32Attributes {
        Fat32Attributes::from_bits_truncate(self.attr)
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.attributes().is_dir()
    }

    #[inline]
    pub fn is_label(&self) -> bool {
        !Fat32Attributes::is_lfn_byte(self.attr) && self.attributes().is_label()
    }
}

/// Every slot of one directory chain, loaded in memory.
#[derive(Debug, Clone)]
pub struct DirListing {
    clusters: Vec<u32>,
    slots: Vec<[u8; SLOT]>,
    /// Index of the first `0x00` slot (end of directory), or `slots.len()`.
    end: usize,
    slots_per_cluster: usize,
}

impl DirListing {
    pub fn load<S: SectorStore + ?Sized>(
        store: &mut S,
        meta: &Fat32Meta,
        table: &FatTable,
        first_cluster: u32,
    ) -> FsResolverResult<Self> {
        let clusters = table.chain(store, first_cluster)?;
        let slots_per_cluster = meta.slots_per_cluster() as usize;

        let mut buf = vec![0u8; meta.bytes_per_cluster as usize];
        let mut slots = Vec::with_capacity(clusters.len() * slots_per_cluster);
        for &cluster in &clusters {
            store.read_bytes(meta.cluster_offset(cluster), &mut buf)?;
            for raw in buf.chunks_exact(SLOT) {
                let mut slot = [0u8; SLOT];
                slot.copy_from_slice(raw);
                slots.push(slot);
            }
        }
        let end = slots
            .iter()
            .position(|s| s[0] == FAT_ENTRY_END_OF_DIR)
            .unwrap_or(slots.len());

        Ok(Self {
            clusters,
            slots,
            end,
            slots_per_cluster,
        })
    }

    #[inline]
    pub fn clusters(&self) -> &[u32] {
        &self.clusters
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Raw slot bytes.
    #[inline]
    pub fn slot(&self, index: usize) -> Option<&[u8; SLOT]> {
        self.slots.get(index)
    }

    pub fn slot_offset(&self, meta: &Fat32Meta, index: usize) -> u64 {
        let cluster = self.clusters[index / self.slots_per_cluster];
        meta.cluster_offset(cluster) + ((index % self.slots_per_cluster) * SLOT) as u64
    }

    /// Parses the live entry sets, in directory order.
    ///
    /// An LFN chain that fails validation is dropped and the short name is
    /// used instead; LFN records with no chain start are ignored.
    pub fn records(&self, meta: &Fat32Meta) -> FsResolverResult<Vec<DirRecord>> {
        let mut out = Vec::new();
        let mut pending: Vec<(usize, Fat32LFNEntry)> = Vec::new();

        for (index, raw) in self.slots[..self.end].iter().enumerate() {
            if raw[0] == FAT_ENTRY_DELETED {
                pending.clear();
                continue;
            }

            if Fat32Attributes::is_lfn_byte(raw[11]) {
                let lfn = Fat32LFNEntry::from_raw(raw)?;
                if lfn.is_last() {
                    if !pending.is_empty() {
                        warn!("dir: orphan LFN records before slot {index} ignored");
                    }
                    pending.clear();
                } else if pending.is_empty() {
                    warn!("dir: orphan LFN record at slot {index} ignored");
                    continue;
                }
                pending.push((index, lfn));
                continue;
            }

            let entry = Fat32Entry::from_raw(raw)?;
            let lfn: Vec<Fat32LFNEntry> = pending.iter().map(|(_, e)| *e).collect();
            let long = if entry.is_label() {
                None
            } else {
                decode_lfn_chain(&lfn, &entry.name)
            };
            if long.is_none() && !pending.is_empty() {
                warn!("dir: LFN chain before slot {index} rejected, using short name");
            }

            let (name, lfn, slots) = match long {
                Some(name) => {
                    let slots: Vec<usize> = pending
                        .iter()
                        .map(|(i, _)| *i)
                        .chain(::core::iter::once(index))
                        .collect();
                    (name, lfn, slots)
                }
                None if entry.is_label() => (decode_label(&entry.name), Vec::new(), vec![index]),
                None => (
                    decode_short_name(&entry.name, entry.nt_case()),
                    Vec::new(),
                    vec![index],
                ),
            };
            trace!("dir: slot {index} -> {name:?}");

            out.push(DirRecord {
                name,
                entries: Fat32Entries::new(lfn, entry),
                offsets: slots.iter().map(|&i| self.slot_offset(meta, i)).collect(),
            });
            pending.clear();
        }
        Ok(out)
    }

    /// Looks up `name` among the ordinary entries (the label and the dot
    /// entries never match).
    pub fn find(&self, meta: &Fat32Meta, name: &str) -> FsResolverResult<Option<DirRecord>> {
        Ok(self
            .records(meta)?
            .into_iter()
            .find(|r| !r.sfn().is_label() && !r.sfn().is_dot_or_dotdot() && r.matches(name)))
    }

    /// Raw short names in use, for numeric-tail selection.
    pub fn short_names(&self) -> Vec<[u8; 11]> {
        self.slots[..self.end]
            .iter()
            .filter(|s| s[0] != FAT_ENTRY_DELETED && !Fat32Attributes::is_lfn_byte(s[11]))
            .map(|s| {
                let mut name = [0u8; 11];
                name.copy_from_slice(&s[..11]);
                name
            })
            .collect()
    }

    /// `true` when only `.` and `..` remain.
    pub fn is_empty(&self, meta: &Fat32Meta) -> FsResolverResult<bool> {
        Ok(self
            .records(meta)?
            .iter()
            .all(|r| r.sfn().is_dot_or_dotdot()))
    }

    /// First index of `count` consecutive reusable slots.
    fn find_free_run(&self, count: usize) -> Option<usize> {
        let mut run = 0;
        for index in 0..self.slots.len() {
            let free = index >= self.end || self.slots[index][0] == FAT_ENTRY_DELETED;
            run = if free { run + 1 } else { 0 };
            if run == count {
                return Some(index + 1 - count);
            }
        }
        None
    }

    /// Appends one zeroed cluster to the chain.
    fn grow<S: SectorStore + ?Sized>(
        &mut self,
        store: &mut S,
        meta: &Fat32Meta,
        table: &FatTable,
        alloc: &mut AllocatorState,
        fsinfo: &mut FsInfoCache,
    ) -> FsResolverResult {
        let last = self.clusters.last().copied();
        let cluster = table
            .allocate_cluster(store, alloc, fsinfo, last)?
            .ok_or(FsResolverError::NoSpace)?;
        store.zero_sectors(meta.cluster_to_sector(cluster), meta.sectors_per_cluster as u32)?;

        let old_len = self.slots.len();
        self.clusters.push(cluster);
        self.slots.resize(old_len + self.slots_per_cluster, [0u8; SLOT]);
        debug!("dir: chain grown with cluster {cluster}");
        Ok(())
    }

    /// Writes `entries` into the first free run of slots, growing the chain
    /// when none is large enough. Returns the offsets of the written slots.
    pub fn insert<S: SectorStore + ?Sized>(
        &mut self,
        store: &mut S,
        meta: &Fat32Meta,
        table: &FatTable,
        alloc: &mut AllocatorState,
        fsinfo: &mut FsInfoCache,
        entries: &Fat32Entries,
    ) -> FsResolverResult<Vec<u64>> {
        let need = entries.slot_count();
        let start = loop {
            if let Some(start) = self.find_free_run(need) {
                break start;
            }
            self.grow(store, meta, table, alloc, fsinfo)?;
        };

        let mut buf = Vec::with_capacity(need * SLOT);
        entries.to_raw_buffer(&mut buf);

        let mut offsets = Vec::with_capacity(need);
        for (i, raw) in buf.chunks_exact(SLOT).enumerate() {
            let offset = self.slot_offset(meta, start + i);
            store.write_bytes(offset, raw)?;
            self.slots[start + i].copy_from_slice(raw);
            offsets.push(offset);
        }

        // Keep the end marker right after the set when it was written past
        // the old end.
        let after = start + need;
        if after > self.end {
            if after < self.slots.len() && self.slots[after][0] != FAT_ENTRY_END_OF_DIR {
                store.write_bytes(self.slot_offset(meta, after), &[0u8; SLOT])?;
                self.slots[after] = [0u8; SLOT];
            }
            self.end = after;
        }
        trace!("dir: {need} slot(s) written at index {start}");
        Ok(offsets)
    }
}

/// Tombstones every slot of `record` in place.
pub fn tombstone<S: SectorStore + ?Sized>(store: &mut S, record: &DirRecord) -> SectorIOResult {
    for &offset in &record.offsets {
        store.write_u8_at(offset, FAT_ENTRY_DELETED)?;
    }
    debug!("dir: tombstoned {:?} ({} slot(s))", record.name, record.offsets.len());
    Ok(())
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::{core::utils::time_utils::FatTimestamp, fs::fat32::options::FormatOptions};

    struct Fixture {
        store: MemSectorStore,
        meta: Fat32Meta,
        table: FatTable,
        alloc: AllocatorState,
        fsinfo: FsInfoCache,
        dir: u32,
    }

    fn fixture() -> Fixture {
        let mut store = MemSectorStore::with_megabytes(64).unwrap();
        let meta = Fat32Meta::from_options(store.sector_count(), &FormatOptions::new()).unwrap();
        let table = FatTable::new(&meta);
        let mut alloc = AllocatorState::new(&meta, FAT_FIRST_CLUSTER);
        let mut fsinfo = FsInfoCache::new(meta.cluster_count, meta.cluster_count, FAT_FIRST_CLUSTER);
        let dir = table
            .allocate_cluster(&mut store, &mut alloc, &mut fsinfo, None)
            .unwrap()
            .unwrap();
        Fixture {
            store,
            meta,
            table,
            alloc,
            fsinfo,
            dir,
        }
    }

    fn insert(fx: &mut Fixture, name: &str) -> Vec<u64> {
        let mut listing = DirListing::load(&mut fx.store, &fx.meta, &fx.table, fx.dir).unwrap();
        let short = compute_short_name(name, &listing.short_names()).unwrap();
        let entries = encode_entries(
            name,
            &short,
            Fat32Attributes::ARCHIVE,
            0,
            0,
            FatTimestamp::default(),
        );
        listing
            .insert(
                &mut fx.store,
                &fx.meta,
                &fx.table,
                &mut fx.alloc,
                &mut fx.fsinfo,
                &entries,
            )
            .unwrap()
    }

    fn load(fx: &mut Fixture) -> DirListing {
        DirListing::load(&mut fx.store, &fx.meta, &fx.table, fx.dir).unwrap()
    }

    #[test]
    fn test_insert_and_find() {
        let mut fx = fixture();
        insert(&mut fx, "README.TXT");
        insert(&mut fx, "A long file name.txt");

        let listing = load(&mut fx);
        let records = listing.records(&fx.meta).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "README.TXT");
        assert_eq!(records[1].name, "A long file name.txt");
        assert_eq!(records[1].short_name(), "ALONGF~1.TXT");
        assert_eq!(records[1].offsets.len(), 3);

        let hit = listing.find(&fx.meta, "a LONG file NAME.TXT").unwrap().unwrap();
        assert_eq!(hit.name, "A long file name.txt");
        assert!(listing.find(&fx.meta, "alongf~1.txt").unwrap().is_some());
        assert!(listing.find(&fx.meta, "missing").unwrap().is_none());
    }

    #[test]
    fn test_tombstone_keeps_slot_count_and_reuses_slots() {
        let mut fx = fixture();
        insert(&mut fx, "first file name.bin");
        insert(&mut fx, "KEEP.BIN");

        let listing = load(&mut fx);
        let before = listing.slot_count();
        let victim = listing.find(&fx.meta, "first file name.bin").unwrap().unwrap();
        tombstone(&mut fx.store, &victim).unwrap();

        let listing = load(&mut fx);
        assert_eq!(listing.slot_count(), before);
        for &offset in &victim.offsets {
            assert_eq!(fx.store.read_u8_at(offset).unwrap(), FAT_ENTRY_DELETED);
        }
        assert!(listing.find(&fx.meta, "first file name.bin").unwrap().is_none());

        // The freed run is reused by a set of the same size.
        let offsets = insert(&mut fx, "other file name.bin");
        assert_eq!(offsets, victim.offsets);
    }

    #[test]
    fn test_directory_grows_when_full() {
        let mut fx = fixture();
        let per_cluster = fx.meta.slots_per_cluster() as usize;
        for i in 0..per_cluster {
            insert(&mut fx, &format!("F{i}.BIN"));
        }
        assert_eq!(load(&mut fx).clusters().len(), 1);

        insert(&mut fx, "OVERFLOW.BIN");
        let listing = load(&mut fx);
        assert_eq!(listing.clusters().len(), 2);
        let records = listing.records(&fx.meta).unwrap();
        assert_eq!(records.len(), per_cluster + 1);
        assert_eq!(records[per_cluster].name, "OVERFLOW.BIN");
    }

    #[test]
    fn test_orphan_and_bad_lfn_fall_back_to_short_name() {
        let mut fx = fixture();
        let offsets = insert(&mut fx, "Broken chain name.txt");
        // Corrupt the checksum of the first LFN record.
        fx.store.write_u8_at(offsets[0] + 13, 0x00).unwrap();

        let records = load(&mut fx).records(&fx.meta).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "BROKEN~1.TXT");
        assert_eq!(records[0].offsets.len(), 1);
    }

    #[test]
    fn test_is_empty_ignores_dot_entries() {
        let mut fx = fixture();
        let stamp = FatTimestamp::default();
        let base = fx.meta.cluster_offset(fx.dir);
        fx.store.write_struct(base, &Fat32Entry::dot(fx.dir, stamp)).unwrap();
        fx.store.write_struct(base + 32, &Fat32Entry::dotdot(0, stamp)).unwrap();
        assert!(load(&mut fx).is_empty(&fx.meta).unwrap());

        insert(&mut fx, "X");
        assert!(!load(&mut fx).is_empty(&fx.meta).unwrap());
    }
}
