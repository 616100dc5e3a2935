// SPDX-License-Identifier: MIT

//! Rotate-right-then-add checksum tying long-name records to their short
//! entry, computed over the 11 raw bytes of `DIR_Name`.

/// Checksum stored in every LFN record belonging to `short_name`.
#[inline]
pub fn lfn_checksum(short_name: &[u8; 11]) -> u8 {
    short_name
        .iter()
        .fold(0u8, |sum, &b| sum.rotate_right(1).wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfn_checksum_known_values() {
        assert_eq!(lfn_checksum(b"FOO     BAR"), 0x53);
        assert_eq!(lfn_checksum(b"THEQUI~1FOX"), 0x07);
        assert_eq!(lfn_checksum(b"           "), 0xF7);
    }
}
