// SPDX-License-Identifier: MIT

//! Versioned value snapshots of volume state, for save-states and
//! debugging views. They never alias live volume data.

use alloc::{string::String, vec::Vec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::fs::fat32::{dir::DirEntryInfo, fsinfo::FsInfoCache, meta::Fat32Meta, table::AllocatorState};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Copy of FAT1, indices `0..=lastCluster`, with the FSInfo counters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FatTableSnapshot {
    pub version: u32,
    pub entries: Vec<u32>,
    pub free_count: u32,
    pub next_free: u32,
}

impl FatTableSnapshot {
    pub fn new(entries: Vec<u32>, fsinfo: &FsInfoCache) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            entries,
            free_count: fsinfo.free_count(),
            next_free: fsinfo.next_free(),
        }
    }

    /// Free data clusters according to the copied entries.
    pub fn counted_free(&self) -> u32 {
        self.entries.iter().skip(2).filter(|&&v| v == 0).count() as u32
    }
}

/// Every live entry of one directory, dot entries and label included.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DirectorySnapshot {
    pub version: u32,
    pub path: String,
    pub first_cluster: u32,
    pub entries: Vec<DirEntryInfo>,
}

impl DirectorySnapshot {
    pub fn new(path: &str, first_cluster: u32, entries: Vec<DirEntryInfo>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            path: path.into(),
            first_cluster,
            entries,
        }
    }
}

/// Geometry and allocation counters of a mounted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeState {
    pub version: u32,
    pub volume_id: u32,
    pub volume_label: String,
    pub total_sectors: u32,
    pub sectors_per_cluster: u8,
    pub bytes_per_cluster: u32,
    pub fat_size_sectors: u32,
    pub first_data_sector: u32,
    pub cluster_count: u32,
    pub fat_entry_count: u32,
    pub root_cluster: u32,
    pub free_count: u32,
    pub next_free: u32,
    pub allocator_cursor: u32,
}

impl VolumeState {
    pub fn capture(meta: &Fat32Meta, fsinfo: &FsInfoCache, alloc: &AllocatorState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            volume_id: meta.volume_id,
            volume_label: meta.volume_label.iter().map(|&b| char::from(b)).collect(),
            total_sectors: meta.total_sectors,
            sectors_per_cluster: meta.sectors_per_cluster,
            bytes_per_cluster: meta.bytes_per_cluster,
            fat_size_sectors: meta.fat_size_sectors,
            first_data_sector: meta.first_data_sector,
            cluster_count: meta.cluster_count,
            fat_entry_count: meta.fat_entry_count(),
            root_cluster: meta.root_cluster,
            free_count: fsinfo.free_count(),
            next_free: fsinfo.next_free(),
            allocator_cursor: alloc.cursor(),
        }
    }
}
