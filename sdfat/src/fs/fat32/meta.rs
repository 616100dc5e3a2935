// SPDX-License-Identifier: MIT

use crate::{
    core::{errors::*, utils::volume_utils::*},
    fs::fat32::{constant::*, options::FormatOptions, types::Fat32Vbr},
};

const GIB_SECTORS: u64 = 1024 * 1024 * 1024 / FAT_SECTOR_SIZE as u64;

/// Derived FAT32 geometry.
///
/// Built either from [`FormatOptions`] when formatting, or from a validated
/// boot sector when mounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat32Meta {
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub oem_name: [u8; 8],

    pub sectors_per_cluster: u8,
    pub bytes_per_cluster: u32,

    pub total_sectors: u32,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub fat_size_sectors: u32,

    /// First sector of the cluster heap (cluster 2).
    pub first_data_sector: u32,
    pub cluster_count: u32,
    pub root_cluster: u32,
}

impl Fat32Meta {
    /// Cluster size policy by volume size: `< 1 GiB` → 1 sector,
    /// `< 2 GiB` → 4, `< 8 GiB` → 8, else 16.
    pub fn default_sectors_per_cluster(total_sectors: u32) -> u8 {
        match total_sectors as u64 {
            s if s < GIB_SECTORS => 1,
            s if s < 2 * GIB_SECTORS => 4,
            s if s < 8 * GIB_SECTORS => 8,
            _ => 16,
        }
    }

    pub fn from_options(total_sectors: u32, opts: &FormatOptions) -> FsFormatterResult<Self> {
        let sectors_per_cluster = opts
            .sectors_per_cluster
            .unwrap_or_else(|| Self::default_sectors_per_cluster(total_sectors));
        crate::ensure!(
            sectors_per_cluster.is_power_of_two(),
            FsFormatterError::Invalid("sectors per cluster must be a power of two")
        );

        let (fat_size_sectors, cluster_count) = converge_fat_layout(
            FAT_SECTOR_SIZE as u32,
            total_sectors as u64,
            FAT_RESERVED_SECTORS as u32,
            FAT_ENTRY_SIZE,
            FAT_FIRST_CLUSTER,
            FAT_NUM_FATS,
            sectors_per_cluster as u32,
        );
        crate::ensure!(cluster_count >= FAT32_MIN_CLUSTERS, FsFormatterError::TooSmall);

        Ok(Self {
            volume_id: opts.volume_id.unwrap_or_else(generate_volume_id_32),
            volume_label: opts.label_bytes()?,
            oem_name: opts.oem_bytes()?,
            sectors_per_cluster,
            bytes_per_cluster: sectors_per_cluster as u32 * FAT_SECTOR_SIZE as u32,
            total_sectors,
            reserved_sectors: FAT_RESERVED_SECTORS,
            num_fats: FAT_NUM_FATS,
            fat_size_sectors,
            first_data_sector: FAT_RESERVED_SECTORS as u32 + FAT_NUM_FATS as u32 * fat_size_sectors,
            cluster_count,
            root_cluster: FAT_ROOT_CLUSTER,
        })
    }

    pub fn from_vbr(vbr: &Fat32Vbr) -> FsParsingResult<Self> {
        vbr.validate()?;

        let spc = vbr.sectors_per_cluster;
        let reserved = vbr.reserved_sectors;
        let total = vbr.total_sectors_32;
        let fat_size = vbr.fat_size_32;
        let first_data_sector = (reserved as u64) + (vbr.num_fats as u64) * fat_size as u64;
        crate::ensure!(
            first_data_sector < total as u64,
            FsParsingError::Invalid("FAT region exceeds volume")
        );

        let data_clusters = (total as u64 - first_data_sector) / spc as u64;
        let mappable = (fat_size as u64 * FAT_ENTRIES_PER_SECTOR as u64).saturating_sub(2);
        let cluster_count = data_clusters.min(mappable) as u32;
        crate::ensure!(
            cluster_count >= FAT32_MIN_CLUSTERS,
            FsParsingError::Invalid("too few clusters for FAT32")
        );

        let meta = Self {
            volume_id: vbr.volume_id,
            volume_label: vbr.volume_label,
            oem_name: vbr.oem_name,
            sectors_per_cluster: spc,
            bytes_per_cluster: spc as u32 * FAT_SECTOR_SIZE as u32,
            total_sectors: total,
            reserved_sectors: reserved,
            num_fats: vbr.num_fats,
            fat_size_sectors: fat_size,
            first_data_sector: first_data_sector as u32,
            cluster_count,
            root_cluster: vbr.root_cluster,
        };
        crate::ensure!(
            meta.is_data_cluster(meta.root_cluster),
            FsParsingError::Invalid("root cluster outside cluster heap")
        );
        Ok(meta)
    }

    /// `BPB_FATSz32 × 128`: number of addressable FAT entries.
    #[inline]
    pub fn fat_entry_count(&self) -> u32 {
        self.fat_size_sectors * FAT_ENTRIES_PER_SECTOR
    }

    /// Highest valid cluster number (`countOfClusters + 1`).
    #[inline]
    pub fn last_cluster(&self) -> u32 {
        self.cluster_count + 1
    }

    #[inline]
    pub fn is_data_cluster(&self, cluster: u32) -> bool {
        (FAT_FIRST_CLUSTER..=self.last_cluster()).contains(&cluster)
    }

    /// First sector of FAT copy `fat_index`.
    #[inline]
    pub fn fat_start_sector(&self, fat_index: u8) -> u32 {
        self.reserved_sectors as u32 + fat_index as u32 * self.fat_size_sectors
    }

    /// Absolute byte offset of `cluster`'s entry in FAT copy `fat_index`.
    #[inline]
    pub fn fat_entry_offset(&self, cluster: u32, fat_index: u8) -> u64 {
        self.fat_start_sector(fat_index) as u64 * FAT_SECTOR_SIZE as u64
            + cluster as u64 * FAT_ENTRY_SIZE as u64
    }

    #[inline]
    pub fn cluster_to_sector(&self, cluster: u32) -> u32 {
        self.first_data_sector + (cluster - FAT_FIRST_CLUSTER) * self.sectors_per_cluster as u32
    }

    #[inline]
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        self.cluster_to_sector(cluster) as u64 * FAT_SECTOR_SIZE as u64
    }

    /// Directory slots per cluster.
    #[inline]
    pub fn slots_per_cluster(&self) -> u32 {
        self.bytes_per_cluster / FAT_DIR_ENTRY_SIZE
    }

    pub fn size_bytes(&self) -> u64 {
        self.total_sectors as u64 * FAT_SECTOR_SIZE as u64
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    const MIB: u32 = 2048;

    #[test]
    fn test_cluster_size_policy() {
        assert_eq!(Fat32Meta::default_sectors_per_cluster(64 * MIB), 1);
        assert_eq!(Fat32Meta::default_sectors_per_cluster(1024 * MIB), 4);
        assert_eq!(Fat32Meta::default_sectors_per_cluster(4096 * MIB), 8);
        assert_eq!(Fat32Meta::default_sectors_per_cluster(8192 * MIB), 16);
    }

    #[test]
    fn test_geometry_64mib() {
        let meta = Fat32Meta::from_options(64 * MIB, &FormatOptions::new().with_volume_id(1)).unwrap();
        assert_eq!(meta.fat_size_sectors, 1009);
        assert_eq!(meta.cluster_count, 129022);
        assert_eq!(meta.first_data_sector, 32 + 2 * 1009);
        assert_eq!(meta.fat_entry_count(), 1009 * 128);
        assert_eq!(meta.last_cluster(), 129023);
        assert_eq!(meta.cluster_to_sector(2), meta.first_data_sector);
        assert_eq!(meta.fat_entry_offset(3, 1), (32 + 1009) as u64 * 512 + 12);
    }

    #[test]
    fn test_too_small() {
        let res = Fat32Meta::from_options(32 * MIB, &FormatOptions::new());
        assert_eq!(res, Err(FsFormatterError::TooSmall));
    }

    #[test]
    fn test_vbr_roundtrip_geometry() {
        let meta = Fat32Meta::from_options(64 * MIB, &FormatOptions::new().with_label("CARD")).unwrap();
        let vbr = Fat32Vbr::from_meta(&meta);
        assert_eq!(Fat32Meta::from_vbr(&vbr).unwrap(), meta);
    }
}
