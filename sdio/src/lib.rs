// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Core modules
pub mod errors;
mod macros;
pub mod stats;

// Backend modules
#[cfg(feature = "mem")]
mod mem;

#[cfg(feature = "std")]
mod stream;

#[cfg(feature = "std")]
pub mod image;

// Prelude re-exports (central entrypoint)
pub mod prelude {
    pub use super::errors::*;
    pub use super::stats::*;
    pub use super::{SECTOR_SIZE, Sector, SectorStore, SectorStoreExt, SectorStoreStructExt};

    #[cfg(feature = "mem")]
    pub use super::mem::MemSectorStore;

    #[cfg(feature = "std")]
    pub use super::stream::StdSectorStore;
}

// Internal use
use errors::*;

// Constants

/// Size of one addressable sector, in bytes. SD cards in SPI mode always
/// transfer 512-byte blocks.
pub const SECTOR_SIZE: usize = 512;

/// Containers are sized in whole megabytes.
pub const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

/// Sectors in one megabyte of container.
pub const SECTORS_PER_MEGABYTE: u32 = (BYTES_PER_MEGABYTE / SECTOR_SIZE as u64) as u32;

/// One sector worth of bytes.
pub type Sector = [u8; SECTOR_SIZE];

// Traits

/// Fixed-size block device abstraction.
///
/// A store exposes `sector_count()` sectors of [`SECTOR_SIZE`] bytes and moves
/// exactly one sector per call, like an SD card answering CMD17/CMD24.
/// Implementations may target RAM, files, or a host-provided container.
pub trait SectorStore {
    /// Reads sector `lba` into `buf`.
    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> SectorIOResult;

    /// Writes `data` to sector `lba`.
    fn write_sector(&mut self, lba: u32, data: &Sector) -> SectorIOResult;

    /// Number of addressable sectors.
    fn sector_count(&self) -> u32;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&mut self) -> SectorIOResult;

    /// Total capacity in bytes.
    #[inline]
    fn size_bytes(&self) -> u64 {
        self.sector_count() as u64 * SECTOR_SIZE as u64
    }

    /// Returns `OutOfBounds` unless `lba` addresses an existing sector.
    #[inline]
    fn check_lba(&self, lba: u32) -> SectorIOResult {
        if lba >= self.sector_count() {
            return Err(SectorIOError::OutOfBounds);
        }
        Ok(())
    }
}

impl<S: SectorStore + ?Sized> SectorStore for &mut S {
    #[inline]
    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> SectorIOResult {
        (**self).read_sector(lba, buf)
    }

    #[inline]
    fn write_sector(&mut self, lba: u32, data: &Sector) -> SectorIOResult {
        (**self).write_sector(lba, data)
    }

    #[inline]
    fn sector_count(&self) -> u32 {
        (**self).sector_count()
    }

    #[inline]
    fn flush(&mut self) -> SectorIOResult {
        (**self).flush()
    }
}

/// Byte-granular helpers built on whole-sector transfers.
///
/// Partial sectors are handled with read-modify-write, so callers can address
/// a FAT entry or a 32-byte directory slot directly by absolute byte offset.
pub trait SectorStoreExt: SectorStore {
    /// Reads `buf.len()` bytes starting at absolute byte `offset`.
    fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> SectorIOResult {
        let mut sector = [0u8; SECTOR_SIZE];
        let mut pos = 0usize;
        let mut off = offset;

        while pos < buf.len() {
            let lba = lba_of(off)?;
            let in_sector = (off % SECTOR_SIZE as u64) as usize;
            let n = (SECTOR_SIZE - in_sector).min(buf.len() - pos);

            self.read_sector(lba, &mut sector)?;
            buf[pos..pos + n].copy_from_slice(&sector[in_sector..in_sector + n]);

            pos += n;
            off += n as u64;
        }

        Ok(())
    }

    /// Writes `data` starting at absolute byte `offset`.
    fn write_bytes(&mut self, offset: u64, data: &[u8]) -> SectorIOResult {
        let mut sector = [0u8; SECTOR_SIZE];
        let mut pos = 0usize;
        let mut off = offset;

        while pos < data.len() {
            let lba = lba_of(off)?;
            let in_sector = (off % SECTOR_SIZE as u64) as usize;
            let n = (SECTOR_SIZE - in_sector).min(data.len() - pos);

            // Whole sectors skip the read half of read-modify-write.
            if n != SECTOR_SIZE {
                self.read_sector(lba, &mut sector)?;
            }
            sector[in_sector..in_sector + n].copy_from_slice(&data[pos..pos + n]);
            self.write_sector(lba, &sector)?;

            pos += n;
            off += n as u64;
        }

        Ok(())
    }

    /// Fills `count` sectors starting at `first` with zeroes.
    ///
    /// Used for FAT region clears and fresh directory clusters.
    fn zero_sectors(&mut self, first: u32, count: u32) -> SectorIOResult {
        const ZERO: Sector = [0u8; SECTOR_SIZE];
        let end = first.checked_add(count).ok_or(SectorIOError::OutOfBounds)?;
        for lba in first..end {
            self.write_sector(lba, &ZERO)?;
        }
        Ok(())
    }

    // Implements read/write helpers for primitive types (u8, u16, u32, u64)
    sector_store_impl_primitive_rw!(u8, u16, u32, u64);
}

impl<T: SectorStore + ?Sized> SectorStoreExt for T {}

/// Extension trait for reading and writing structs using zerocopy.
///
/// On-disk records (boot sector, FSInfo, directory slots) are declared as
/// `#[repr(C, packed)]` zerocopy types and moved through these helpers.
pub trait SectorStoreStructExt: SectorStore {
    /// Reads a struct of type `T` from absolute byte `offset`.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
    ) -> SectorIOResult<T> {
        const MAX: usize = 2 * SECTOR_SIZE;
        let size = core::mem::size_of::<T>();
        if size > MAX {
            return Err(SectorIOError::Invalid("read_struct: type too large"));
        }
        let mut buf = [0u8; MAX];
        self.read_bytes(offset, &mut buf[..size])?;
        T::read_from_bytes(&buf[..size]).map_err(|_| SectorIOError::Other("read_struct failed"))
    }

    /// Writes a struct of type `T` at absolute byte `offset`.
    fn write_struct<T: zerocopy::IntoBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
        val: &T,
    ) -> SectorIOResult {
        self.write_bytes(offset, val.as_bytes())
    }
}

impl<T: SectorStore + ?Sized> SectorStoreStructExt for T {}

#[inline]
fn lba_of(offset: u64) -> SectorIOResult<u32> {
    u32::try_from(offset / SECTOR_SIZE as u64).map_err(|_| SectorIOError::OutOfBounds)
}
