// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    core::{errors::*, utils::time_utils::FatTimestamp},
    fs::fat32::{attr::*, constant::*},
};

/// A short entry together with the long-name records stored before it.
#[derive(Debug, Clone)]
pub struct Fat32Entries {
    /// Storage order: highest ordinal (flagged `0x40`) first.
    pub lfn: Vec<Fat32LFNEntry>,
    pub entry: Fat32Entry,
}

impl Fat32Entries {
    pub fn new(lfn: Vec<Fat32LFNEntry>, entry: Fat32Entry) -> Self {
        Self { lfn, entry }
    }

    /// Raw LFN records in storage order.
    #[inline]
    pub fn name_entries(&self) -> &[Fat32LFNEntry] {
        &self.lfn
    }

    #[inline]
    pub fn sfn_entry(&self) -> &Fat32Entry {
        &self.entry
    }

    /// Number of 32-byte directory slots the set occupies.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.lfn.len() + 1
    }

    /// Serializes the set, slot by slot, in storage order.
    pub fn to_raw_buffer(&self, buf: &mut Vec<u8>) {
        for lfn in &self.lfn {
            buf.extend_from_slice(lfn.as_bytes());
        }
        buf.extend_from_slice(self.entry.as_bytes());
    }
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C, packed)]
pub struct Fat32Entry {
    pub name: [u8; 11],
    pub attr: u8,
    pub nt_reserved: u8,
    pub creation_time_tenth: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub access_date: u16,
    pub first_cluster_high: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster_low: u16,
    pub file_size: u32,
}

impl Fat32Entry {
    pub fn new(
        name: [u8; 11],
        attr: Fat32Attributes,
        nt_case: NtCase,
        cluster: u32,
        size: u32,
        stamp: FatTimestamp,
    ) -> Self {
        Self {
            name,
            attr: attr.bits() & !Fat32Attributes::ROOT32.bits(),
            nt_reserved: nt_case.bits(),
            creation_time_tenth: stamp.tenth,
            creation_time: stamp.time,
            creation_date: stamp.date,
            access_date: stamp.date,
            first_cluster_high: (cluster >> 16) as u16,
            write_time: stamp.time,
            write_date: stamp.date,
            first_cluster_low: (cluster & 0xFFFF) as u16,
            file_size: size,
        }
    }

    /// `.` entry of a directory whose first cluster is `own_cluster`.
    pub fn dot(own_cluster: u32, stamp: FatTimestamp) -> Self {
        Self::new(
            *FAT_DOT_NAME,
            Fat32Attributes::DIRECTORY,
            NtCase::empty(),
            own_cluster,
            0,
            stamp,
        )
    }

    /// `..` entry; `parent_cluster` is 0 when the parent is the root.
    pub fn dotdot(parent_cluster: u32, stamp: FatTimestamp) -> Self {
        Self::new(
            *FAT_DOTDOT_NAME,
            Fat32Attributes::DIRECTORY,
            NtCase::empty(),
            parent_cluster,
            0,
            stamp,
        )
    }

    pub fn volume_label(label: [u8; 11], stamp: FatTimestamp) -> Self {
        Self::new(
            label,
            Fat32Attributes::ARCHIVE | Fat32Attributes::LABEL,
            NtCase::empty(),
            0,
            0,
            stamp,
        )
    }

    pub fn from_raw(raw: &[u8]) -> FsParsingResult<Self> {
        Self::read_from_bytes(raw).map_err(|_| FsParsingError::Invalid("Invalid SFN entry"))
    }

    #[inline]
    pub fn first_cluster(&self) -> u32 {
        ((self.first_cluster_high as u32) << 16) | (self.first_cluster_low as u32)
    }

    #[inline]
    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.first_cluster_high = (cluster >> 16) as u16;
        self.first_cluster_low = (cluster & 0xFFFF) as u16;
    }

    #[inline]
    pub fn attributes(&self) -> Fat32Attributes {
        Fat32Attributes::from_bits_truncate(self.attr)
    }

    #[inline]
    pub fn nt_case(&self) -> NtCase {
        NtCase::from_bits_truncate(self.nt_reserved)
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.attributes().is_dir()
    }

    #[inline]
    pub fn is_label(&self) -> bool {
        !Fat32Attributes::is_lfn_byte(self.attr) && self.attributes().is_label()
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.name[0] == FAT_ENTRY_DELETED
    }

    #[inline]
    pub fn is_end_of_dir(&self) -> bool {
        self.name[0] == FAT_ENTRY_END_OF_DIR
    }

    #[inline]
    pub fn is_dot_or_dotdot(&self) -> bool {
        &self.name == FAT_DOT_NAME || &self.name == FAT_DOTDOT_NAME
    }

    /// Refreshes the modification stamp.
    pub fn touch(&mut self, stamp: FatTimestamp) {
        self.write_time = stamp.time;
        self.write_date = stamp.date;
        self.access_date = stamp.date;
    }
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C, packed)]
pub struct Fat32LFNEntry {
    pub order: u8,
    pub name1: [u16; 5],
    pub attr: u8,
    pub type_field: u8,
    pub checksum: u8,
    pub name2: [u16; 6],
    pub zero: u16,
    pub name3: [u16; 2],
}

impl Fat32LFNEntry {
    /// Builds one record from a fragment of at most 13 UTF-16 units; missing
    /// units stay `0xFFFF`.
    pub fn new(order: u8, is_last: bool, fragment: &[u16], checksum: u8) -> Self {
        let mut units = [0xFFFFu16; FAT_LFN_UNITS_PER_ENTRY];
        for (slot, &u) in units.iter_mut().zip(fragment) {
            *slot = u;
        }

        let mut name1 = [0u16; 5];
        let mut name2 = [0u16; 6];
        let mut name3 = [0u16; 2];
        name1.copy_from_slice(&units[0..5]);
        name2.copy_from_slice(&units[5..11]);
        name3.copy_from_slice(&units[11..13]);

        Self {
            order: if is_last { order | FAT_LFN_LAST_ENTRY } else { order },
            name1,
            attr: Fat32Attributes::LFN.bits(),
            type_field: 0,
            checksum,
            name2,
            zero: 0,
            name3,
        }
    }

    pub fn from_raw(raw: &[u8]) -> FsParsingResult<Self> {
        Self::read_from_bytes(raw).map_err(|_| FsParsingError::Invalid("Invalid LFN structure"))
    }

    #[inline]
    pub fn ordinal(&self) -> u8 {
        self.order & FAT_LFN_ORDINAL_MASK
    }

    #[inline]
    pub fn is_last(&self) -> bool {
        self.order & FAT_LFN_LAST_ENTRY != 0
    }

    pub fn extract_utf16(&self) -> [u16; FAT_LFN_UNITS_PER_ENTRY] {
        let mut out = [0xFFFFu16; FAT_LFN_UNITS_PER_ENTRY];
        let name1 = self.name1;
        let name2 = self.name2;
        let name3 = self.name3;
        out[0..5].copy_from_slice(&name1);
        out[5..11].copy_from_slice(&name2);
        out[11..13].copy_from_slice(&name3);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_disk_sizes() {
        assert_eq!(::core::mem::size_of::<Fat32Entry>(), 32);
        assert_eq!(::core::mem::size_of::<Fat32LFNEntry>(), 32);
    }

    #[test]
    fn test_lfn_entry_layout() {
        let name: Vec<u16> = "hello_world".encode_utf16().collect();
        let lfn = Fat32LFNEntry::new(1, true, &name, 0xAB);
        let raw = lfn.as_bytes();

        assert_eq!(raw[0], 0x41);
        assert_eq!(raw[11], 0x0F);
        assert_eq!(raw[12], 0x00);
        assert_eq!(raw[13], 0xAB);
        assert_eq!(&raw[26..28], &[0, 0]);
        assert_eq!(lfn.extract_utf16()[..11], name[..]);
        assert_eq!(lfn.extract_utf16()[11], 0xFFFF);
    }

    #[test]
    fn test_first_cluster_split() {
        let mut e = Fat32Entry::new(
            *b"FILE    TXT",
            Fat32Attributes::ARCHIVE,
            NtCase::empty(),
            0x0012_3456,
            99,
            FatTimestamp::default(),
        );
        assert_eq!({ e.first_cluster_high }, 0x0012);
        assert_eq!({ e.first_cluster_low }, 0x3456);
        assert_eq!(e.first_cluster(), 0x0012_3456);

        e.set_first_cluster(7);
        assert_eq!(e.first_cluster(), 7);
        assert!(!e.is_dir());
    }

    #[test]
    fn test_special_entries() {
        let stamp = FatTimestamp::default();
        assert!(Fat32Entry::dot(5, stamp).is_dot_or_dotdot());
        assert_eq!(Fat32Entry::dotdot(0, stamp).first_cluster(), 0);

        let label = Fat32Entry::volume_label(*b"MY VOLUME  ", stamp);
        assert_eq!(label.attr, 0x28);
        assert!(label.is_label());
    }
}
