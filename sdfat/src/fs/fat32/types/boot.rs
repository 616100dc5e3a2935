// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    core::errors::*,
    fs::fat32::{constant::*, meta::Fat32Meta},
};

/// Boot sector with the FAT32 extended BPB (sector 0, backup at sector 6).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct Fat32Vbr {
    pub jump_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media: u8,
    pub fat_size_16: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,

    // FAT32 Extended BPB
    pub fat_size_32: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub fsinfo_sector: u16,
    pub backup_boot_sector: u16,
    pub reserved: [u8; 12],

    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],

    pub boot_code: [u8; FAT_BOOT_CODE_SIZE],
    pub signature: u16,
}

impl Fat32Vbr {
    pub fn from_meta(meta: &Fat32Meta) -> Self {
        Self {
            jump_boot: FAT_JUMP_BOOT,
            oem_name: meta.oem_name,
            bytes_per_sector: FAT_SECTOR_SIZE,
            sectors_per_cluster: meta.sectors_per_cluster,
            reserved_sectors: meta.reserved_sectors,
            num_fats: meta.num_fats,
            root_entry_count: FAT_ROOT_ENTRY_COUNT,
            total_sectors_16: FAT_TOTAL_SECTORS_16,
            media: FAT_MEDIA_DESCRIPTOR,
            fat_size_16: FAT_FAT_SIZE_16,
            sectors_per_track: FAT_SECTORS_PER_TRACK,
            num_heads: FAT_HEADS,
            hidden_sectors: FAT_HIDDEN_SECTORS,
            total_sectors_32: meta.total_sectors,
            fat_size_32: meta.fat_size_sectors,
            ext_flags: FAT_EXT_FLAGS,
            fs_version: FAT_FS_VERSION,
            root_cluster: meta.root_cluster,
            fsinfo_sector: FAT_FSINFO_SECTOR as u16,
            backup_boot_sector: FAT_VBR_BACKUP_SECTOR as u16,
            reserved: [0u8; 12],
            drive_number: FAT_DRIVE_NUMBER,
            reserved1: 0,
            boot_signature: FAT_BOOT_SIGNATURE,
            volume_id: meta.volume_id,
            volume_label: meta.volume_label,
            fs_type: *FAT_FS_TYPE,
            boot_code: [0u8; FAT_BOOT_CODE_SIZE],
            signature: FAT_SIGNATURE,
        }
    }

    /// Checks the fields a FAT32 volume cannot do without.
    pub fn validate(&self) -> FsParsingResult {
        let signature = self.signature;
        let bytes_per_sector = self.bytes_per_sector;
        let spc = self.sectors_per_cluster;
        let root_entry_count = self.root_entry_count;
        let fat_size_16 = self.fat_size_16;
        let fat_size_32 = self.fat_size_32;
        let reserved = self.reserved_sectors;
        let total = self.total_sectors_32;
        let root = self.root_cluster;

        crate::ensure!(signature == FAT_SIGNATURE, FsParsingError::Invalid("missing boot signature"));
        crate::ensure!(
            bytes_per_sector == FAT_SECTOR_SIZE,
            FsParsingError::Invalid("unsupported sector size")
        );
        crate::ensure!(
            spc.is_power_of_two(),
            FsParsingError::Invalid("invalid sectors per cluster")
        );
        crate::ensure!(self.num_fats == FAT_NUM_FATS, FsParsingError::Invalid("unsupported FAT count"));
        crate::ensure!(
            root_entry_count == 0 && fat_size_16 == 0,
            FsParsingError::Invalid("not a FAT32 boot sector")
        );
        crate::ensure!(
            fat_size_32 > 0 && reserved > 0 && total > 0,
            FsParsingError::Invalid("empty FAT32 geometry")
        );
        crate::ensure!(root >= FAT_FIRST_CLUSTER, FsParsingError::Invalid("invalid root cluster"));
        Ok(())
    }
}

/// FSInfo sector (sector 1, backup at sector 7).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct Fat32FsInfo {
    pub lead_signature: [u8; 4],
    pub reserved1: [u8; 480],
    pub struct_signature: [u8; 4],
    pub free_cluster_count: u32,
    pub next_free_cluster: u32,
    pub reserved2: [u8; 12],
    pub trail_signature: [u8; 4],
}

impl Fat32FsInfo {
    pub fn new(free_cluster_count: u32, next_free_cluster: u32) -> Self {
        Self {
            lead_signature: *FAT_FSINFO_LEAD_SIGNATURE,
            reserved1: [0u8; 480],
            struct_signature: *FAT_FSINFO_STRUCT_SIGNATURE,
            free_cluster_count,
            next_free_cluster,
            reserved2: [0u8; 12],
            trail_signature: FAT_FSINFO_TRAIL_SIGNATURE,
        }
    }

    pub fn validate(&self) -> FsParsingResult {
        crate::ensure!(
            &self.lead_signature == FAT_FSINFO_LEAD_SIGNATURE
                && &self.struct_signature == FAT_FSINFO_STRUCT_SIGNATURE
                && self.trail_signature == FAT_FSINFO_TRAIL_SIGNATURE,
            FsParsingError::Invalid("invalid FSInfo signature")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_disk_sizes() {
        assert_eq!(::core::mem::size_of::<Fat32Vbr>(), 512);
        assert_eq!(::core::mem::size_of::<Fat32FsInfo>(), 512);
    }

    #[test]
    fn test_fsinfo_signature_offsets() {
        let info = Fat32FsInfo::new(10, 3);
        let raw = info.as_bytes();
        assert_eq!(&raw[0..4], b"RRaA");
        assert_eq!(&raw[484..488], b"rrAa");
        assert_eq!(&raw[488..492], &10u32.to_le_bytes());
        assert_eq!(&raw[492..496], &3u32.to_le_bytes());
        assert_eq!(&raw[508..512], &[0x00, 0x00, 0x55, 0xAA]);
        assert!(info.validate().is_ok());

        let mut broken = info;
        broken.struct_signature = *b"xxxx";
        assert!(broken.validate().is_err());
    }
}
