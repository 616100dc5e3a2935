// SPDX-License-Identifier: MIT

use alloc::vec::Vec;
use ::core::ops::RangeInclusive;

use log::{debug, trace};
use sdio::prelude::*;

use crate::{
    core::errors::*,
    fs::fat32::{constant::*, fsinfo::FsInfoCache, meta::Fat32Meta},
};

/// Decoded meaning of a FAT entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    Reserved,
    Bad,
    /// End of chain (`0x0FFFFFF8..=0x0FFFFFFF`).
    Eoc,
    /// Pointer to the next cluster of the chain.
    Chain(u32),
}

impl FatEntry {
    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self, FatEntry::Free)
    }
}

/// Next-fit allocation cursor.
///
/// Owned by one volume; seeded from `FSI_Nxt_Free` and moved past every
/// allocation, back to the lowest freed cluster on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorState {
    cursor: u32,
    last_cluster: u32,
}

impl AllocatorState {
    /// Starts at `hint` when it names a data cluster, at cluster 2 otherwise.
    pub fn new(meta: &Fat32Meta, hint: u32) -> Self {
        let cursor = if meta.is_data_cluster(hint) {
            hint
        } else {
            FAT_FIRST_CLUSTER
        };
        Self {
            cursor,
            last_cluster: meta.last_cluster(),
        }
    }

    #[inline]
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    fn advance_past(&mut self, cluster: u32) {
        self.cursor = if cluster >= self.last_cluster {
            FAT_FIRST_CLUSTER
        } else {
            cluster + 1
        };
    }

    fn rewind_to(&mut self, cluster: u32) {
        if cluster < self.cursor {
            self.cursor = cluster;
        }
    }
}

/// Both mirrored FAT regions of a volume.
///
/// Holds only geometry; the sector store is passed to every call so the
/// table can be driven by the volume that owns the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatTable {
    fat_start: u32,
    fat_size: u32,
    num_fats: u8,
    entry_count: u32,
    cluster_count: u32,
}

impl FatTable {
    pub fn new(meta: &Fat32Meta) -> Self {
        Self {
            fat_start: meta.fat_start_sector(0),
            fat_size: meta.fat_size_sectors,
            num_fats: meta.num_fats,
            entry_count: meta.fat_entry_count(),
            cluster_count: meta.cluster_count,
        }
    }

    /// `countOfFatEntries`; valid indices are `[2, entry_count)`.
    #[inline]
    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    #[inline]
    pub fn last_cluster(&self) -> u32 {
        self.cluster_count + 1
    }

    #[inline]
    pub fn num_fats(&self) -> u8 {
        self.num_fats
    }

    #[inline]
    fn check_index(&self, cluster: u32) -> FatTableResult {
        crate::ensure!(
            (FAT_FIRST_CLUSTER..self.entry_count).contains(&cluster),
            FatTableError::OutOfRange(cluster)
        );
        Ok(())
    }

    #[inline]
    fn entry_offset(&self, index: u32, fat_index: u8) -> u64 {
        (self.fat_start + fat_index as u32 * self.fat_size) as u64 * SECTOR_SIZE as u64
            + index as u64 * FAT_ENTRY_SIZE as u64
    }

    /// Masked value of `cluster`'s entry in FAT1.
    pub fn get<S: SectorStore + ?Sized>(&self, store: &mut S, cluster: u32) -> FatTableResult<u32> {
        self.get_in(store, cluster, 0)
    }

    /// Masked value of `cluster`'s entry in copy `fat_index`.
    pub fn get_in<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        cluster: u32,
        fat_index: u8,
    ) -> FatTableResult<u32> {
        self.check_index(cluster)?;
        crate::ensure!(fat_index < self.num_fats, FatTableError::Invalid("no such FAT copy"));
        Ok(self.read_raw(store, cluster, fat_index)? & FAT_ENTRY_MASK)
    }

    /// Unchecked raw read, including the reserved entries 0 and 1.
    pub(crate) fn read_raw<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        index: u32,
        fat_index: u8,
    ) -> SectorIOResult<u32> {
        store.read_u32_at(self.entry_offset(index, fat_index))
    }

    /// Writes `value` to `cluster` in every FAT copy.
    ///
    /// The high nibble of the FAT1 word is preserved and the resulting word
    /// is written verbatim to each copy, so the mirrors never diverge.
    pub fn set<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        cluster: u32,
        value: u32,
    ) -> FatTableResult {
        self.check_index(cluster)?;
        let old = self.read_raw(store, cluster, 0)?;
        let word = (old & FAT_ENTRY_HIGH_NIBBLE) | (value & FAT_ENTRY_MASK);
        for fat_index in 0..self.num_fats {
            store.write_u32_at(self.entry_offset(cluster, fat_index), word)?;
        }
        trace!("fat: [{cluster}] <- {value:#010X}");
        Ok(())
    }

    /// Writes the media/EOC words of entries 0 and 1 in every copy.
    pub(crate) fn write_reserved_entries<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
    ) -> SectorIOResult {
        for fat_index in 0..self.num_fats {
            store.write_u32_at(self.entry_offset(0, fat_index), FAT_ENTRY0)?;
            store.write_u32_at(self.entry_offset(1, fat_index), FAT_ENTRY1)?;
        }
        Ok(())
    }

    /// Zeroes every FAT copy.
    pub(crate) fn clear<S: SectorStore + ?Sized>(&self, store: &mut S) -> SectorIOResult {
        store.zero_sectors(self.fat_start, self.fat_size * self.num_fats as u32)
    }

    /// Classifies the value found in `cluster`'s entry.
    ///
    /// A pointer outside `[2, lastCluster]` is corruption, not end of chain.
    pub fn classify(&self, cluster: u32, value: u32) -> FatTableResult<FatEntry> {
        let value = value & FAT_ENTRY_MASK;
        Ok(match value {
            FAT_FREE => FatEntry::Free,
            FAT_RESERVED => FatEntry::Reserved,
            FAT_BAD => FatEntry::Bad,
            FAT_EOC_MIN..=FAT_EOC => FatEntry::Eoc,
            v if (FAT_FIRST_CLUSTER..=self.last_cluster()).contains(&v) => FatEntry::Chain(v),
            v => crate::bail!(FatTableError::Corrupt { cluster, value: v }),
        })
    }

    pub fn entry<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        cluster: u32,
    ) -> FatTableResult<FatEntry> {
        let value = self.get(store, cluster)?;
        self.classify(cluster, value)
    }

    /// Follows one link: `Some(next)`, or `None` at end of chain.
    ///
    /// A free, reserved or bad entry inside a chain is reported as
    /// [`FatTableError::Corrupt`].
    pub fn next_cluster<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        cluster: u32,
    ) -> FatTableResult<Option<u32>> {
        let value = self.get(store, cluster)?;
        match self.classify(cluster, value)? {
            FatEntry::Chain(next) => Ok(Some(next)),
            FatEntry::Eoc => Ok(None),
            _ => Err(FatTableError::Corrupt { cluster, value }),
        }
    }

    /// Every cluster of the chain starting at `first`, in order.
    pub fn chain<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        first: u32,
    ) -> FatTableResult<Vec<u32>> {
        crate::ensure!(
            (FAT_FIRST_CLUSTER..=self.last_cluster()).contains(&first),
            FatTableError::OutOfRange(first)
        );

        let mut clusters = vec![first];
        let mut current = first;
        while let Some(next) = self.next_cluster(store, current)? {
            crate::ensure!(
                clusters.len() < self.cluster_count as usize,
                FatTableError::LoopDetected
            );
            clusters.push(next);
            current = next;
        }
        Ok(clusters)
    }

    /// Sector-batched walk over `range` of copy `fat_index`. Stops at the
    /// first cluster for which `f(cluster, value)` returns `true`.
    fn scan<S, F>(
        &self,
        store: &mut S,
        fat_index: u8,
        range: RangeInclusive<u32>,
        mut f: F,
    ) -> FatTableResult<Option<u32>>
    where
        S: SectorStore + ?Sized,
        F: FnMut(u32, u32) -> bool,
    {
        let base = self.fat_start + fat_index as u32 * self.fat_size;
        let mut sector = [0u8; SECTOR_SIZE];
        let mut loaded = None;

        for cluster in range {
            let lba = base + cluster / FAT_ENTRIES_PER_SECTOR;
            if loaded != Some(lba) {
                store.read_sector(lba, &mut sector)?;
                loaded = Some(lba);
            }
            let at = (cluster % FAT_ENTRIES_PER_SECTOR) as usize * FAT_ENTRY_SIZE as usize;
            let raw = u32::from_le_bytes([sector[at], sector[at + 1], sector[at + 2], sector[at + 3]]);
            if f(cluster, raw & FAT_ENTRY_MASK) {
                return Ok(Some(cluster));
            }
        }
        Ok(None)
    }

    /// First cluster of `len` consecutive free clusters within `range`.
    fn find_free_run<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        range: RangeInclusive<u32>,
        len: u32,
    ) -> FatTableResult<Option<u32>> {
        let mut run_start = 0;
        let mut run_len = 0;
        let hit = self.scan(store, 0, range, |cluster, value| {
            if value != FAT_FREE {
                run_len = 0;
                return false;
            }
            if run_len == 0 {
                run_start = cluster;
            }
            run_len += 1;
            run_len == len
        })?;
        Ok(hit.map(|_| run_start))
    }

    /// Searches from `start` to the last cluster, then wraps once to cover
    /// `[2, start)`.
    fn find_free_wrapping<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        start: u32,
        len: u32,
    ) -> FatTableResult<Option<u32>> {
        if let Some(found) = self.find_free_run(store, start..=self.last_cluster(), len)? {
            return Ok(Some(found));
        }
        if start > FAT_FIRST_CLUSTER {
            // A run may straddle `start`, so the second pass overlaps it.
            let end = (start + len - 1).min(self.last_cluster());
            return self.find_free_run(store, FAT_FIRST_CLUSTER..=end, len);
        }
        Ok(None)
    }

    /// Claims one free cluster and marks it EOC.
    ///
    /// The search starts at the allocation cursor, or just past `previous`
    /// when that lies ahead, and wraps around once. When `previous` is given
    /// its entry is linked to the new cluster before the new cluster is
    /// marked EOC. The cursor and the cached free count follow, and FSInfo is
    /// persisted. Returns `None` when the volume is full.
    pub fn allocate_cluster<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        alloc: &mut AllocatorState,
        fsinfo: &mut FsInfoCache,
        previous: Option<u32>,
    ) -> FatTableResult<Option<u32>> {
        if let Some(prev) = previous {
            crate::ensure!(
                self.entry(store, prev)? == FatEntry::Eoc,
                FatTableError::Invalid("previous cluster is not the end of a chain")
            );
        }

        let start = match previous {
            Some(prev) if prev + 1 > alloc.cursor() && prev < self.last_cluster() => prev + 1,
            _ => alloc.cursor(),
        };

        let Some(cluster) = self.find_free_wrapping(store, start, 1)? else {
            debug!("fat: no free cluster left");
            return Ok(None);
        };

        if let Some(prev) = previous {
            self.set(store, prev, cluster)?;
        }
        self.set(store, cluster, FAT_EOC)?;

        alloc.advance_past(cluster);
        fsinfo.adjust_free_count(-1);
        fsinfo.set_next_free(alloc.cursor());
        fsinfo.persist(store)?;

        trace!("fat: allocated {cluster} (previous {previous:?})");
        Ok(Some(cluster))
    }

    /// Claims `count` consecutive free clusters as one chain and returns its
    /// first cluster, or `None` when no such run exists.
    pub fn allocate_contiguous<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        alloc: &mut AllocatorState,
        fsinfo: &mut FsInfoCache,
        count: u32,
    ) -> FatTableResult<Option<u32>> {
        crate::ensure!(count > 0, FatTableError::Invalid("empty contiguous allocation"));

        let Some(first) = self.find_free_wrapping(store, alloc.cursor(), count)? else {
            debug!("fat: no run of {count} free clusters");
            return Ok(None);
        };

        let last = first + count - 1;
        for cluster in first..last {
            self.set(store, cluster, cluster + 1)?;
        }
        self.set(store, last, FAT_EOC)?;

        alloc.advance_past(last);
        fsinfo.adjust_free_count(-(count as i64));
        fsinfo.set_next_free(alloc.cursor());
        fsinfo.persist(store)?;

        debug!("fat: allocated run {first}..={last}");
        Ok(Some(first))
    }

    /// Releases the chain starting at `first` and returns how many clusters
    /// were freed. The chain is walked completely before anything is
    /// written, so a corrupt chain is left untouched.
    pub fn free_chain<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        alloc: &mut AllocatorState,
        fsinfo: &mut FsInfoCache,
        first: u32,
    ) -> FatTableResult<u32> {
        let clusters = self.chain(store, first)?;
        for &cluster in &clusters {
            self.set(store, cluster, FAT_FREE)?;
        }

        if let Some(&lowest) = clusters.iter().min() {
            alloc.rewind_to(lowest);
        }
        let freed = clusters.len() as u32;
        fsinfo.adjust_free_count(freed as i64);
        fsinfo.set_next_free(alloc.cursor());
        fsinfo.persist(store)?;

        debug!("fat: freed {freed} cluster(s) from {first}");
        Ok(freed)
    }

    /// Full scan of FAT1 counting free data clusters.
    pub fn count_free<S: SectorStore + ?Sized>(&self, store: &mut S) -> FatTableResult<u32> {
        let mut free = 0u32;
        self.scan(store, 0, FAT_FIRST_CLUSTER..=self.last_cluster(), |_, value| {
            if value == FAT_FREE {
                free += 1;
            }
            false
        })?;
        Ok(free)
    }

    /// Masked entries `0..=lastCluster` of copy `fat_index`.
    pub fn entries<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        fat_index: u8,
    ) -> FatTableResult<Vec<u32>> {
        crate::ensure!(fat_index < self.num_fats, FatTableError::Invalid("no such FAT copy"));
        let mut out = Vec::with_capacity(self.last_cluster() as usize + 1);
        self.scan(store, fat_index, 0..=self.last_cluster(), |_, value| {
            out.push(value);
            false
        })?;
        Ok(out)
    }

    /// Indices in `[0, entry_count)` whose raw 32-bit words differ between
    /// FAT1 and copy `fat_index`.
    pub fn mirror_mismatches<S: SectorStore + ?Sized>(
        &self,
        store: &mut S,
        fat_index: u8,
    ) -> FatTableResult<Vec<u32>> {
        crate::ensure!(fat_index < self.num_fats, FatTableError::Invalid("no such FAT copy"));
        let mut primary = [0u8; SECTOR_SIZE];
        let mut mirror = [0u8; SECTOR_SIZE];
        let mut out = Vec::new();

        for sector in 0..self.fat_size {
            store.read_sector(self.fat_start + sector, &mut primary)?;
            store.read_sector(self.fat_start + fat_index as u32 * self.fat_size + sector, &mut mirror)?;
            if primary == mirror {
                continue;
            }
            let words = primary.chunks_exact(4).zip(mirror.chunks_exact(4));
            for (i, (a, b)) in words.enumerate() {
                if a != b {
                    out.push(sector * FAT_ENTRIES_PER_SECTOR + i as u32);
                }
            }
        }
        Ok(out)
    }
}
