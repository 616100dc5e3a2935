// SPDX-License-Identifier: MIT

//! Volume utils.
//!
//! Volume identifier generation and FAT layout convergence.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::core::utils::time_utils;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generates a 4-byte volume serial number from the current time.
///
/// Not globally unique, but distinct for two calls in the same process.
pub fn generate_volume_id_32() -> u32 {
    let now = time_utils::now_utc();

    let seconds = now.unix_timestamp() as u32;
    let millis = now.millisecond() as u32;
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let id = (seconds & 0xFFFF) | ((millis & 0xFF) << 16) | ((millis >> 8) << 24);
    id ^ (counter & 0xFF)
}

/// Computes `(fat_size_sectors, cluster_count)` for a FAT layout.
///
/// Iterates until the FAT is just large enough to map every cluster of the
/// data region that remains once the FAT copies are carved out. The result
/// always satisfies `fat_size * sector_size / entry_size >= cluster_count + min_entries`.
pub fn converge_fat_layout(
    sector_size: u32,
    total_sectors: u64,
    reserved_sectors: u32,
    entry_size: u32,
    min_entries: u32,
    num_fats: u8,
    sectors_per_cluster: u32,
) -> (u32, u32) {
    if sector_size == 0 || sectors_per_cluster == 0 || entry_size == 0 {
        return (0, 0);
    }
    let spc = sectors_per_cluster as u64;
    let reserved = reserved_sectors as u64;
    let entries_per_sector = (sector_size / entry_size) as u64;

    let mut cluster_count = 0u64;
    let mut fat_size = 0u64;

    for _ in 0..32 {
        let fat_size_new = (cluster_count + min_entries as u64).div_ceil(entries_per_sector);
        let data_sectors = total_sectors
            .saturating_sub(reserved)
            .saturating_sub(fat_size_new * num_fats as u64);
        let cluster_count_new = data_sectors / spc;

        if cluster_count_new == cluster_count && fat_size_new == fat_size {
            break;
        }

        cluster_count = cluster_count_new;
        fat_size = fat_size_new;
    }

    // An oscillating layout settles on the larger FAT; drop the clusters it
    // cannot map.
    let mappable = (fat_size * entries_per_sector).saturating_sub(min_entries as u64);
    let cluster_count = cluster_count.min(mappable);

    (fat_size.min(u32::MAX as u64) as u32, cluster_count.min(u32::MAX as u64) as u32)
}
