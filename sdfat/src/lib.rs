// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
extern crate alloc;

// Core Modules
pub mod core;
pub mod fs;

// Error types and shared utilities
pub use crate::core::errors::*;
pub use crate::core::utils::{path_utils::*, time_utils::*, volume_utils::*};

/// FAT32 volume manager.
///
/// See [`fat32::VolumeManager`], [`fat32::FileHandle`] and [`fat32::FatTable`].
pub mod fat32 {
    pub use super::fs::fat32::prelude::*;
}
