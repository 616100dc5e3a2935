// SPDX-License-Identifier: MIT

bitflags::bitflags! {
    /// `DIR_Attr` bits, plus the handle-only `ROOT32` marker.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Fat32Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
        /// Never stored on disk; marks the root directory handle.
        const ROOT32    = 0x80;
        const LFN       = 0x0F;
    }
}

impl Fat32Attributes {
    pub const LABEL: Self = Self::VOLUME_ID;

    /// `true` when a raw `DIR_Attr` byte denotes a long-name record.
    #[inline]
    pub fn is_lfn_byte(attr: u8) -> bool {
        attr & 0x3F == Self::LFN.bits()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.contains(Self::DIRECTORY)
    }

    #[inline]
    pub fn is_label(&self) -> bool {
        self.contains(Self::VOLUME_ID) && !self.contains(Self::LFN)
    }
}

bitflags::bitflags! {
    /// `DIR_NTRes` case bits: the stored upper-case 8.3 name is displayed
    /// lower-case in the flagged part.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NtCase: u8 {
        const LOWER_BASE = 0x08;
        const LOWER_EXT  = 0x10;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfn_and_label_detection() {
        assert!(Fat32Attributes::is_lfn_byte(0x0F));
        assert!(Fat32Attributes::is_lfn_byte(0x4F));
        assert!(!Fat32Attributes::is_lfn_byte(0x10));

        let label = Fat32Attributes::ARCHIVE | Fat32Attributes::LABEL;
        assert_eq!(label.bits(), 0x28);
        assert!(label.is_label());
        assert!(!Fat32Attributes::LFN.is_label());
    }
}
