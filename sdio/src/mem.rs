// SPDX-License-Identifier: MIT

use alloc::vec;
use alloc::vec::Vec;

use crate::{
    BYTES_PER_MEGABYTE, SECTOR_SIZE, SECTORS_PER_MEGABYTE, Sector, SectorIOError, SectorIOResult,
    SectorStore,
};

/// In-memory container.
///
/// Backs emulated cards in tests and in hosts that keep the whole image in
/// RAM. The byte layout is exactly the flat disk image, so conversion to and
/// from an image is a move.
#[derive(Debug, Clone)]
pub struct MemSectorStore {
    data: Vec<u8>,
}

impl MemSectorStore {
    /// Zero-filled store of `sector_count` sectors.
    pub fn new(sector_count: u32) -> Self {
        Self {
            data: vec![0u8; sector_count as usize * SECTOR_SIZE],
        }
    }

    /// Zero-filled store of `megabytes` MiB.
    pub fn with_megabytes(megabytes: u32) -> SectorIOResult<Self> {
        if megabytes == 0 {
            return Err(SectorIOError::Invalid("container size must be at least 1 MiB"));
        }
        let sectors = megabytes
            .checked_mul(SECTORS_PER_MEGABYTE)
            .ok_or(SectorIOError::Invalid("container size exceeds 32-bit sector range"))?;
        Ok(Self::new(sectors))
    }

    /// Wraps a flat disk image. Its length must be a non-zero multiple of the
    /// sector size.
    pub fn from_image(image: Vec<u8>) -> SectorIOResult<Self> {
        if image.is_empty() || image.len() % SECTOR_SIZE != 0 {
            return Err(SectorIOError::Invalid("image length is not a whole number of sectors"));
        }
        if (image.len() / SECTOR_SIZE) as u64 > u32::MAX as u64 {
            return Err(SectorIOError::Invalid("image exceeds 32-bit sector range"));
        }
        Ok(Self { data: image })
    }

    /// Returns the flat disk image.
    #[inline]
    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Container size in whole megabytes (rounded down).
    #[inline]
    pub fn megabytes(&self) -> u64 {
        self.data.len() as u64 / BYTES_PER_MEGABYTE
    }

    #[inline]
    fn range(&self, lba: u32) -> SectorIOResult<core::ops::Range<usize>> {
        self.check_lba(lba)?;
        let start = lba as usize * SECTOR_SIZE;
        Ok(start..start + SECTOR_SIZE)
    }
}

impl SectorStore for MemSectorStore {
    #[inline(always)]
    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> SectorIOResult {
        let range = self.range(lba)?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    #[inline(always)]
    fn write_sector(&mut self, lba: u32, data: &Sector) -> SectorIOResult {
        let range = self.range(lba)?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    fn sector_count(&self) -> u32 {
        (self.data.len() / SECTOR_SIZE) as u32
    }

    #[inline]
    fn flush(&mut self) -> SectorIOResult {
        Ok(())
    }
}
