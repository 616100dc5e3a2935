// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io::{Error, ErrorKind, Read, Seek, SeekFrom, Write};

use crate::{SECTOR_SIZE, SECTORS_PER_MEGABYTE, Sector, SectorIOError, SectorIOResult, SectorStore};

/// Container backed by any seekable byte stream (typically a host file).
///
/// `base_offset` lets the volume start inside a larger image.
#[derive(Debug)]
pub struct StdSectorStore<T: Read + Write + Seek> {
    io: T,
    sector_count: u32,
    base_offset: u64,
}

impl<T: Read + Write + Seek> StdSectorStore<T> {
    #[inline]
    pub fn new(io: T, sector_count: u32) -> Self {
        Self {
            io,
            sector_count,
            base_offset: 0,
        }
    }

    #[inline]
    pub fn new_with_offset(io: T, sector_count: u32, base_offset: u64) -> Self {
        Self {
            io,
            sector_count,
            base_offset,
        }
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.io
    }

    #[inline]
    fn seek_to(&mut self, lba: u32) -> SectorIOResult {
        self.check_lba(lba)?;
        let abs = self.base_offset + lba as u64 * SECTOR_SIZE as u64;
        self.io.seek(SeekFrom::Start(abs))?;
        Ok(())
    }
}

impl StdSectorStore<File> {
    /// Sizes `file` to `megabytes` MiB and wraps it.
    pub fn create_sized(file: File, megabytes: u32) -> SectorIOResult<Self> {
        let sectors = megabytes
            .checked_mul(SECTORS_PER_MEGABYTE)
            .filter(|&s| s > 0)
            .ok_or(SectorIOError::Invalid("invalid container size"))?;
        file.set_len(sectors as u64 * SECTOR_SIZE as u64)?;
        Ok(Self::new(file, sectors))
    }

    /// Wraps an existing container, deriving the sector count from its length.
    pub fn open(file: File) -> SectorIOResult<Self> {
        let len = file.metadata()?.len();
        if len == 0 || len % SECTOR_SIZE as u64 != 0 {
            return Err(SectorIOError::Invalid("container length is not a whole number of sectors"));
        }
        let sectors = u32::try_from(len / SECTOR_SIZE as u64)
            .map_err(|_| SectorIOError::Invalid("container exceeds 32-bit sector range"))?;
        Ok(Self::new(file, sectors))
    }
}

impl<T: Read + Write + Seek> SectorStore for StdSectorStore<T> {
    fn read_sector(&mut self, lba: u32, buf: &mut Sector) -> SectorIOResult {
        self.seek_to(lba)?;
        self.io.read_exact(buf)?;
        Ok(())
    }

    fn write_sector(&mut self, lba: u32, data: &Sector) -> SectorIOResult {
        self.seek_to(lba)?;
        self.io.write_all(data)?;
        Ok(())
    }

    #[inline]
    fn sector_count(&self) -> u32 {
        self.sector_count
    }

    fn flush(&mut self) -> SectorIOResult {
        self.io.flush()?;
        Ok(())
    }
}

impl From<Error> for SectorIOError {
    #[cold]
    #[inline(never)]
    fn from(e: Error) -> Self {
        match e.kind() {
            ErrorKind::UnexpectedEof => SectorIOError::OutOfBounds,
            ErrorKind::Unsupported => SectorIOError::Unsupported,
            ErrorKind::NotFound => SectorIOError::Other("container not found"),
            ErrorKind::PermissionDenied => SectorIOError::Other("container permission denied"),
            ErrorKind::WriteZero => SectorIOError::Other("container refused write"),
            ErrorKind::InvalidInput => SectorIOError::Invalid("invalid container access"),
            _ => SectorIOError::Other("container I/O error"),
        }
    }
}
