// SPDX-License-Identifier: MIT

use alloc::string::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    core::errors::*,
    fs::fat32::constant::{FAT_OEM_NAME, FAT_VOLUME_LABEL_EMPTY},
};

/// Knobs for [`VolumeManager::format`](crate::fat32::VolumeManager::format).
///
/// Every field is optional; unset fields fall back to the default geometry
/// policy, a time-derived volume id and the `NO NAME` label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FormatOptions {
    pub volume_label: Option<String>,
    pub sectors_per_cluster: Option<u8>,
    pub volume_id: Option<u32>,
    pub oem_name: Option<String>,
}

impl FormatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.volume_label = Some(label.into());
        self
    }

    pub fn with_sectors_per_cluster(mut self, spc: u8) -> Self {
        self.sectors_per_cluster = Some(spc);
        self
    }

    pub fn with_volume_id(mut self, id: u32) -> Self {
        self.volume_id = Some(id);
        self
    }

    pub fn with_oem_name(mut self, oem: impl Into<String>) -> Self {
        self.oem_name = Some(oem.into());
        self
    }

    /// Label as stored in the BPB and the root label entry: upper-cased and
    /// space padded to 11 bytes.
    pub fn label_bytes(&self) -> FsFormatterResult<[u8; 11]> {
        match &self.volume_label {
            None => Ok(*FAT_VOLUME_LABEL_EMPTY),
            Some(label) => {
                let trimmed = label.trim_end();
                crate::ensure!(!trimmed.is_empty(), FsFormatterError::Invalid("empty volume label"));
                pad_ascii(trimmed, b"\"*+,./:;<=>?[\\]|")
                    .ok_or(FsFormatterError::Invalid("invalid volume label"))
            }
        }
    }

    pub fn oem_bytes(&self) -> FsFormatterResult<[u8; 8]> {
        match &self.oem_name {
            None => Ok(*FAT_OEM_NAME),
            Some(oem) => pad_ascii(oem, b"").ok_or(FsFormatterError::Invalid("invalid OEM name")),
        }
    }
}

/// Upper-cases `text` into a space padded ASCII field of `N` bytes.
fn pad_ascii<const N: usize>(text: &str, forbidden: &[u8]) -> Option<[u8; N]> {
    if text.len() > N {
        return None;
    }
    let mut out = [b' '; N];
    for (slot, b) in out.iter_mut().zip(text.bytes()) {
        if !(0x20..0x7F).contains(&b) || forbidden.contains(&b) {
            return None;
        }
        *slot = b.to_ascii_uppercase();
    }
    Some(out)
}
