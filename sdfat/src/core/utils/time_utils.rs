// SPDX-License-Identifier: MIT

//! Time utilities for directory entry timestamps.
//!
//! - In `std` mode, uses the system clock.
//! - In `no_std`, returns `UNIX_EPOCH`, which packs to the FAT epoch
//!   (1980-01-01 00:00:00).

use time::OffsetDateTime;

/// Returns the current UTC time.
pub fn now_utc() -> OffsetDateTime {
    #[cfg(feature = "std")]
    {
        OffsetDateTime::now_utc()
    }

    #[cfg(not(feature = "std"))]
    {
        OffsetDateTime::UNIX_EPOCH
    }
}

/// Packed FAT date/time triple as stored in a short directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FatTimestamp {
    pub date: u16,
    pub time: u16,
    /// Creation time fine resolution, 10 ms units in `0..=199`.
    pub tenth: u8,
}

impl FatTimestamp {
    pub const FAT_EPOCH_YEAR: i32 = 1980;

    pub fn now() -> Self {
        Self::from_datetime(now_utc())
    }

    /// Packs `dt`, clamping to the representable 1980..=2107 range.
    pub fn from_datetime(dt: OffsetDateTime) -> Self {
        let year = dt.year();
        if year < Self::FAT_EPOCH_YEAR {
            return Self {
                date: (1 << 5) | 1,
                time: 0,
                tenth: 0,
            };
        }
        let year = (year - Self::FAT_EPOCH_YEAR).min(127) as u16;
        let month = u8::from(dt.month()) as u16;
        let day = dt.day() as u16;
        let second = dt.second();

        Self {
            date: (year << 9) | (month << 5) | day,
            time: ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (second as u16 / 2),
            tenth: (second % 2) * 100 + (dt.millisecond() / 10) as u8,
        }
    }

    /// Year, month, day, hour, minute, second.
    pub fn unpack(&self) -> (u16, u8, u8, u8, u8, u8) {
        (
            (self.date >> 9) + Self::FAT_EPOCH_YEAR as u16,
            ((self.date >> 5) & 0x0F) as u8,
            (self.date & 0x1F) as u8,
            (self.time >> 11) as u8,
            ((self.time >> 5) & 0x3F) as u8,
            ((self.time & 0x1F) * 2) as u8 + self.tenth / 100,
        )
    }
}
