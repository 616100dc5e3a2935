// SPDX-License-Identifier: MIT

//! Flat disk image conversion.
//!
//! A container is losslessly convertible to the raw byte stream a host tool
//! (or `dd`) would see on a real card, and back.

use std::io::{ErrorKind, Read, Write};

use crate::{SECTOR_SIZE, SectorIOError, SectorIOResult, SectorStore};

/// Streams every sector of `store` into `out`. Returns the number of bytes
/// written.
pub fn export_image<S, W>(store: &mut S, out: &mut W) -> SectorIOResult<u64>
where
    S: SectorStore + ?Sized,
    W: Write + ?Sized,
{
    let mut sector = [0u8; SECTOR_SIZE];
    for lba in 0..store.sector_count() {
        store.read_sector(lba, &mut sector)?;
        out.write_all(&sector)?;
    }
    out.flush()?;
    Ok(store.size_bytes())
}

/// Fills `store` from a flat image read from `input`.
///
/// The image must cover the container exactly: a short image, a trailing
/// partial sector or surplus bytes are rejected.
pub fn import_image<S, R>(store: &mut S, input: &mut R) -> SectorIOResult<u32>
where
    S: SectorStore + ?Sized,
    R: Read + ?Sized,
{
    let mut sector = [0u8; SECTOR_SIZE];
    let count = store.sector_count();
    for lba in 0..count {
        input.read_exact(&mut sector).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => SectorIOError::Invalid("image shorter than container"),
            _ => SectorIOError::from(e),
        })?;
        store.write_sector(lba, &sector)?;
    }

    let mut probe = [0u8; 1];
    if input.read(&mut probe)? != 0 {
        return Err(SectorIOError::Invalid("image larger than container"));
    }
    store.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_export_then_import_roundtrip() {
        let mut src = MemSectorStore::new(8);
        src.write_bytes(1234, b"sector payload").unwrap();

        let mut image = Vec::new();
        let written = export_image(&mut src, &mut image).unwrap();
        assert_eq!(written, 8 * SECTOR_SIZE as u64);
        assert_eq!(image.as_slice(), src.as_bytes());

        let mut dst = MemSectorStore::new(8);
        assert_eq!(import_image(&mut dst, &mut Cursor::new(&image)).unwrap(), 8);
        assert_eq!(dst.as_bytes(), src.as_bytes());
    }

    #[test]
    fn test_import_rejects_size_mismatch() {
        let mut dst = MemSectorStore::new(2);
        let short = vec![0u8; SECTOR_SIZE + 10];
        assert_eq!(
            import_image(&mut dst, &mut Cursor::new(&short)),
            Err(SectorIOError::Invalid("image shorter than container"))
        );

        let long = vec![0u8; 3 * SECTOR_SIZE];
        assert_eq!(
            import_image(&mut dst, &mut Cursor::new(&long)),
            Err(SectorIOError::Invalid("image larger than container"))
        );
    }
}
