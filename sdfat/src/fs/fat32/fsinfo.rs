// SPDX-License-Identifier: MIT

use log::{debug, warn};
use sdio::prelude::*;

use crate::{
    core::errors::*,
    fs::fat32::{constant::*, meta::Fat32Meta, table::FatTable, types::Fat32FsInfo},
};

/// In-memory copy of the FSInfo sector.
///
/// The free count never exceeds the cluster count and never goes below
/// zero. Every change is persisted to sector 1 and its backup at sector 7
/// by [`FsInfoCache::persist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfoCache {
    free_count: u32,
    next_free: u32,
    cluster_count: u32,
}

impl FsInfoCache {
    pub fn new(cluster_count: u32, free_count: u32, next_free: u32) -> Self {
        Self {
            free_count: free_count.min(cluster_count),
            next_free,
            cluster_count,
        }
    }

    /// Loads and validates FSInfo, recounting the free clusters when the
    /// stored count is unknown or implausible.
    pub fn load<S: SectorStore + ?Sized>(
        store: &mut S,
        meta: &Fat32Meta,
        table: &FatTable,
    ) -> FsResult<Self> {
        let raw: Fat32FsInfo = store.read_struct(FAT_FSINFO_SECTOR as u64 * SECTOR_SIZE as u64)?;
        raw.validate()?;

        let stored_free = raw.free_cluster_count;
        let next_free = raw.next_free_cluster;

        if stored_free == FAT_FSINFO_UNKNOWN || stored_free > meta.cluster_count {
            warn!(
                "fsinfo: free count {stored_free:#X} invalid for {} clusters, recounting",
                meta.cluster_count
            );
            let counted = table.count_free(store)?;
            let cache = Self::new(meta.cluster_count, counted, next_free);
            cache.persist(store)?;
            return Ok(cache);
        }

        debug!("fsinfo: free={stored_free} next={next_free}");
        Ok(Self::new(meta.cluster_count, stored_free, next_free))
    }

    #[inline]
    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    #[inline]
    pub fn next_free(&self) -> u32 {
        self.next_free
    }

    /// Applies `delta` to the free count, saturating in `[0, cluster_count]`.
    pub fn adjust_free_count(&mut self, delta: i64) {
        let next = (self.free_count as i64 + delta).clamp(0, self.cluster_count as i64);
        self.free_count = next as u32;
    }

    pub fn set_free_count(&mut self, free: u32) {
        self.free_count = free.min(self.cluster_count);
    }

    /// Records the allocation hint (`FSI_Nxt_Free`).
    pub fn set_next_free(&mut self, hint: u32) {
        self.next_free = hint;
    }

    /// Writes the cache to the FSInfo sector and its backup.
    pub fn persist<S: SectorStore + ?Sized>(&self, store: &mut S) -> SectorIOResult {
        let raw = Fat32FsInfo::new(self.free_count, self.next_free);
        for sector in [FAT_FSINFO_SECTOR, FAT_FSINFO_BACKUP_SECTOR] {
            store.write_struct(sector as u64 * SECTOR_SIZE as u64, &raw)?;
        }
        Ok(())
    }
}
