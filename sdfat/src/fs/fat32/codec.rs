// SPDX-License-Identifier: MIT

//! Short (8.3) and long file name encoding.
//!
//! Names that fit 8.3 losslessly, with a case the NT bits can express, are
//! stored as a single short entry. Everything else gets a numeric-tail short
//! alias (`THEQUI~1.FOX`) plus a chain of LFN records carrying the UTF-16
//! name.

use alloc::{string::String, vec::Vec};

use crate::{
    core::{errors::*, utils::checksum_utils::lfn_checksum, utils::time_utils::FatTimestamp},
    fs::fat32::{attr::*, constant::*, types::*},
};

/// Characters that can never appear in a name component.
const FORBIDDEN_CHARS: &str = "\"*/:<>?\\|";

/// Characters replaced by `_` in a lossy short name.
const SFN_REPLACED_CHARS: &str = "*+,./:;<=>\"|[\\]?";

/// Punctuation allowed as-is in a short name.
const SFN_EXTRA_CHARS: &[u8] = b"$%'-_@~`!(){}^#&";

const MAX_NUMERIC_TAIL: u32 = 999_999;

/// Outcome of short-name generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortName {
    /// Space padded, upper-case `DIR_Name`.
    pub raw: [u8; 11],
    pub nt_case: NtCase,
    /// The long name must be kept in an LFN chain.
    pub needs_lfn: bool,
}

/// Validates one path component and returns it with surrounding spaces and
/// trailing dots removed. `.` and `..` pass through unchanged.
pub fn validate_name(name: &str) -> FsResolverResult<&str> {
    if name == "." || name == ".." {
        return Ok(name);
    }
    let name = name
        .trim_start_matches(' ')
        .trim_end_matches([' ', '.']);

    crate::ensure!(!name.is_empty(), FsResolverError::InvalidName("empty name"));
    crate::ensure!(
        !name.chars().any(|c| c.is_control() || FORBIDDEN_CHARS.contains(c)),
        FsResolverError::InvalidName("invalid character in name")
    );
    crate::ensure!(
        name.encode_utf16().count() <= FAT_LFN_MAX_UNITS,
        FsResolverError::InvalidName("name too long")
    );
    Ok(name)
}

/// Case-insensitive name comparison used for lookups.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_uppercase)
        .eq(b.chars().flat_map(char::to_uppercase))
}

#[inline]
fn is_sfn_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || SFN_EXTRA_CHARS.contains(&b)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Case {
    Neutral,
    Lower,
    Upper,
    Mixed,
}

fn case_of(part: &str) -> Case {
    let lower = part.bytes().any(|b| b.is_ascii_lowercase());
    let upper = part.bytes().any(|b| b.is_ascii_uppercase());
    match (lower, upper) {
        (false, false) => Case::Neutral,
        (true, false) => Case::Lower,
        (false, true) => Case::Upper,
        (true, true) => Case::Mixed,
    }
}

/// 8.3 form of `name` when it needs no long-name record.
fn lossless_short_name(name: &str) -> Option<ShortName> {
    let (base, ext) = match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 || name.ends_with('.') {
        return None;
    }
    if !base.bytes().chain(ext.bytes()).all(is_sfn_byte) {
        return None;
    }

    let mut nt_case = NtCase::empty();
    match case_of(base) {
        Case::Mixed => return None,
        Case::Lower => nt_case |= NtCase::LOWER_BASE,
        _ => {}
    }
    match case_of(ext) {
        Case::Mixed => return None,
        Case::Lower => nt_case |= NtCase::LOWER_EXT,
        _ => {}
    }

    let mut raw = [b' '; 11];
    for (slot, b) in raw[..8].iter_mut().zip(base.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    for (slot, b) in raw[8..].iter_mut().zip(ext.bytes()) {
        *slot = b.to_ascii_uppercase();
    }
    Some(ShortName {
        raw,
        nt_case,
        needs_lfn: false,
    })
}

/// Maps one character of a long name into the short-name alphabet.
fn lossy_byte(c: char) -> Option<u8> {
    if c == ' ' || ('\u{9}'..='\u{D}').contains(&c) || !c.is_ascii() {
        return None;
    }
    if c.is_ascii_control() || SFN_REPLACED_CHARS.contains(c) {
        return Some(b'_');
    }
    Some(c.to_ascii_uppercase() as u8)
}

/// Computes the short name for `name` among `siblings` (the raw short
/// names already present in the directory).
pub fn compute_short_name(name: &str, siblings: &[[u8; 11]]) -> FsResolverResult<ShortName> {
    if let Some(short) = lossless_short_name(name)
        && !siblings.contains(&short.raw)
    {
        return Ok(short);
    }

    let stripped = name.trim_start_matches('.');
    let (base_src, ext_src) = match stripped.rfind('.') {
        Some(i) => (&stripped[..i], &stripped[i + 1..]),
        None => (stripped, ""),
    };
    let mut base: Vec<u8> = base_src.chars().filter_map(lossy_byte).collect();
    let ext: Vec<u8> = ext_src.chars().filter_map(lossy_byte).take(3).collect();
    if base.is_empty() {
        base.push(b'_');
    }

    let mut raw = [b' '; 11];
    raw[8..8 + ext.len()].copy_from_slice(&ext);

    for n in 1..=MAX_NUMERIC_TAIL {
        let tail = format!("~{n}");
        let keep = base.len().min(8 - tail.len());

        raw[..8].fill(b' ');
        raw[..keep].copy_from_slice(&base[..keep]);
        raw[keep..keep + tail.len()].copy_from_slice(tail.as_bytes());

        if !siblings.contains(&raw) {
            return Ok(ShortName {
                raw,
                nt_case: NtCase::empty(),
                needs_lfn: true,
            });
        }
    }
    Err(FsResolverError::Invalid("short name numeric tails exhausted"))
}

/// LFN records for `name` in storage order (highest ordinal first).
pub fn encode_lfn_chain(name: &str, short_name: &[u8; 11]) -> Vec<Fat32LFNEntry> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let count = units.len().div_ceil(FAT_LFN_UNITS_PER_ENTRY);
    let checksum = lfn_checksum(short_name);

    (1..=count)
        .rev()
        .map(|ordinal| {
            let start = (ordinal - 1) * FAT_LFN_UNITS_PER_ENTRY;
            let end = (start + FAT_LFN_UNITS_PER_ENTRY).min(units.len());
            let mut fragment = [0xFFFFu16; FAT_LFN_UNITS_PER_ENTRY];
            fragment[..end - start].copy_from_slice(&units[start..end]);
            if end - start < FAT_LFN_UNITS_PER_ENTRY {
                fragment[end - start] = 0x0000;
            }
            Fat32LFNEntry::new(ordinal as u8, ordinal == count, &fragment, checksum)
        })
        .collect()
}

/// Reassembles the long name from `entries` (storage order).
///
/// Returns `None` for a chain with a missing `0x40` flag, out-of-sequence
/// ordinals or a checksum that does not match `short_name`, so the caller
/// falls back to the short name.
pub fn decode_lfn_chain(entries: &[Fat32LFNEntry], short_name: &[u8; 11]) -> Option<String> {
    let count = entries.len();
    if count == 0 || count > FAT_LFN_MAX_ENTRIES || !entries[0].is_last() {
        return None;
    }
    let checksum = lfn_checksum(short_name);
    for (i, entry) in entries.iter().enumerate() {
        let in_sequence = entry.ordinal() as usize == count - i;
        if !in_sequence || entry.checksum != checksum || (i > 0 && entry.is_last()) {
            return None;
        }
    }

    let mut units: Vec<u16> = Vec::with_capacity(count * FAT_LFN_UNITS_PER_ENTRY);
    for entry in entries.iter().rev() {
        units.extend_from_slice(&entry.extract_utf16());
    }
    if let Some(end) = units.iter().position(|&u| u == 0x0000) {
        units.truncate(end);
    }
    while units.last() == Some(&0xFFFF) {
        units.pop();
    }
    if units.is_empty() {
        return None;
    }
    String::from_utf16(&units).ok()
}

/// `NAME.EXT` form of a raw short name with the NT case bits applied.
pub fn decode_short_name(raw: &[u8; 11], nt_case: NtCase) -> String {
    let decode = |bytes: &[u8], lower: bool| -> String {
        let mut out = String::new();
        for (i, &b) in bytes.iter().enumerate() {
            let b = if i == 0 && b == FAT_ENTRY_KANJI_E5 {
                FAT_ENTRY_DELETED
            } else {
                b
            };
            let c = char::from(b);
            out.push(if lower { c.to_ascii_lowercase() } else { c });
        }
        String::from(out.trim_end_matches(' '))
    };

    let base = decode(&raw[..8], nt_case.contains(NtCase::LOWER_BASE));
    let ext = decode(&raw[8..], nt_case.contains(NtCase::LOWER_EXT));
    if ext.is_empty() {
        base
    } else {
        format!("{base}.{ext}")
    }
}

/// Volume label text: the 11 raw bytes, padding included.
pub fn decode_label(raw: &[u8; 11]) -> String {
    raw.iter().map(|&b| char::from(b)).collect()
}

/// Builds the complete entry set (LFN chain, if any, then the short entry).
pub fn encode_entries(
    name: &str,
    short: &ShortName,
    attr: Fat32Attributes,
    cluster: u32,
    size: u32,
    stamp: FatTimestamp,
) -> Fat32Entries {
    let lfn = if short.needs_lfn {
        encode_lfn_chain(name, &short.raw)
    } else {
        Vec::new()
    };
    let entry = Fat32Entry::new(short.raw, attr, short.nt_case, cluster, size, stamp);
    Fat32Entries::new(lfn, entry)
}
