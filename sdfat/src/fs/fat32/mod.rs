// SPDX-License-Identifier: MIT

pub mod attr;
pub mod checker;
pub mod codec;
pub mod constant;
pub mod dir;
pub mod file;
pub mod fsinfo;
pub mod meta;
pub mod options;
pub mod snapshot;
pub mod table;
pub mod types;
pub mod volume;

// === Public Interface ===
pub mod prelude {
    pub use super::attr::{Fat32Attributes, NtCase};
    pub use super::checker::{Fat32CheckOptions, Fat32Checker, Finding, Severity, VerifyReport};
    pub use super::codec::{
        ShortName, compute_short_name, decode_label, decode_lfn_chain, decode_short_name,
        encode_entries, encode_lfn_chain, names_equal, validate_name,
    };
    pub use super::dir::{DirEntryInfo, DirListing, DirRecord};
    pub use super::file::{FileHandle, HandleState, OpenFlags};
    pub use super::fsinfo::FsInfoCache;
    pub use super::meta::Fat32Meta;
    pub use super::options::FormatOptions;
    pub use super::snapshot::{DirectorySnapshot, FatTableSnapshot, SNAPSHOT_VERSION, VolumeState};
    pub use super::table::{AllocatorState, FatEntry, FatTable};
    pub use super::types::{Fat32Entries, Fat32Entry, Fat32FsInfo, Fat32LFNEntry, Fat32Vbr};
    pub use super::volume::VolumeManager;
    pub use crate::core::errors::*;
    pub use sdio::prelude::*;
}
