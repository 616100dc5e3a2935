// SPDX-License-Identifier: MIT

// === Disk Layout Parameters ===

pub const FAT_SECTOR_SIZE: u16 = 512; // BPB_BytsPerSec
pub const FAT_RESERVED_SECTORS: u16 = 32; // BPB_RsvdSecCnt
pub const FAT_NUM_FATS: u8 = 2; // BPB_NumFATs
pub const FAT_HEADS: u16 = 255; // BPB_NumHeads (CHS hint)
pub const FAT_SECTORS_PER_TRACK: u16 = 63; // BPB_SecPerTrk (CHS hint)
pub const FAT_HIDDEN_SECTORS: u32 = 0; // BPB_HiddSec

/// Smallest cluster count a FAT32 volume may have.
pub const FAT32_MIN_CLUSTERS: u32 = 65525;

// === FAT Region Parameters ===

pub const FAT_ENTRY_SIZE: u32 = 4;
pub const FAT_ENTRIES_PER_SECTOR: u32 = FAT_SECTOR_SIZE as u32 / FAT_ENTRY_SIZE;
pub const FAT_MEDIA_DESCRIPTOR: u8 = 0xF8; // BPB_Media
pub const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;
pub const FAT_ENTRY_HIGH_NIBBLE: u32 = !FAT_ENTRY_MASK;

pub const FAT_FREE: u32 = 0x0000_0000;
pub const FAT_RESERVED: u32 = 0x0000_0001;
pub const FAT_BAD: u32 = 0x0FFF_FFF7;
pub const FAT_EOC_MIN: u32 = 0x0FFF_FFF8;
pub const FAT_EOC: u32 = 0x0FFF_FFFF;

pub const FAT_ENTRY0: u32 = 0x0FFF_FF00 | FAT_MEDIA_DESCRIPTOR as u32; // FAT[0]
pub const FAT_ENTRY1: u32 = FAT_EOC; // FAT[1]

pub const FAT_FIRST_CLUSTER: u32 = 2;
pub const FAT_ROOT_CLUSTER: u32 = 2; // BPB_RootClus

// === Special Sector Numbers ===

pub const FAT_VBR_SECTOR: u32 = 0;
pub const FAT_VBR_BACKUP_SECTOR: u32 = 6;
pub const FAT_FSINFO_SECTOR: u32 = 1;
pub const FAT_FSINFO_BACKUP_SECTOR: u32 = 7;

// === Standard FAT32 BPB / Extended BPB Constants ===

pub const FAT_JUMP_BOOT: [u8; 3] = [0xEB, 0x58, 0x90]; // BS_jmpBoot
pub const FAT_OEM_NAME: &[u8; 8] = b"MSWIN4.1"; // BS_OEMName
pub const FAT_ROOT_ENTRY_COUNT: u16 = 0; // BPB_RootEntCnt (always 0 for FAT32)
pub const FAT_TOTAL_SECTORS_16: u16 = 0; // BPB_TotSec16 (always 0 for FAT32)
pub const FAT_FAT_SIZE_16: u16 = 0; // BPB_FATSz16 (always 0 for FAT32)
pub const FAT_EXT_FLAGS: u16 = 0; // BPB_ExtFlags (mirroring on)
pub const FAT_FS_VERSION: u16 = 0; // BPB_FSVer
pub const FAT_DRIVE_NUMBER: u8 = 0x80; // BS_DrvNum
pub const FAT_BOOT_SIGNATURE: u8 = 0x29; // BS_BootSig
pub const FAT_FS_TYPE: &[u8; 8] = b"FAT32   "; // BS_FilSysType
pub const FAT_SIGNATURE: u16 = 0xAA55; // 55 AA at offset 510
pub const FAT_VOLUME_LABEL_EMPTY: &[u8; 11] = b"NO NAME    ";
pub const FAT_BOOT_CODE_SIZE: usize = 420;

// === FSINFO Constants ===

pub const FAT_FSINFO_LEAD_SIGNATURE: &[u8; 4] = b"RRaA";
pub const FAT_FSINFO_STRUCT_SIGNATURE: &[u8; 4] = b"rrAa";
pub const FAT_FSINFO_TRAIL_SIGNATURE: [u8; 4] = [0x00, 0x00, 0x55, 0xAA];
pub const FAT_FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;

// === Directory Entries ===

pub const FAT_DIR_ENTRY_SIZE: u32 = 32;
pub const FAT_ENTRY_END_OF_DIR: u8 = 0x00;
pub const FAT_ENTRY_DELETED: u8 = 0xE5;
/// Stand-in for a leading 0xE5 byte in a live short name.
pub const FAT_ENTRY_KANJI_E5: u8 = 0x05;

pub const FAT_DOT_NAME: &[u8; 11] = b".          ";
pub const FAT_DOTDOT_NAME: &[u8; 11] = b"..         ";

// === Long File Names ===

pub const FAT_LFN_UNITS_PER_ENTRY: usize = 13;
pub const FAT_LFN_LAST_ENTRY: u8 = 0x40;
pub const FAT_LFN_ORDINAL_MASK: u8 = 0x3F;
pub const FAT_LFN_MAX_UNITS: usize = 255;
pub const FAT_LFN_MAX_ENTRIES: usize = FAT_LFN_MAX_UNITS.div_ceil(FAT_LFN_UNITS_PER_ENTRY);
