// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for sector store operations.
pub type SectorIOResult<T = ()> = core::result::Result<T, SectorIOError>;

/// Error type for sector store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorIOError {
    /// Sector address past the end of the container.
    OutOfBounds,
    /// Operation not supported by this backend.
    Unsupported,
    Invalid(&'static str),
    Other(&'static str),
}

impl SectorIOError {
    pub fn msg(&self) -> &'static str {
        match self {
            SectorIOError::OutOfBounds => "Out of bounds",
            SectorIOError::Unsupported => "Unsupported operation",
            SectorIOError::Invalid(msg) => msg,
            SectorIOError::Other(msg) => msg,
        }
    }
}

impl From<&'static str> for SectorIOError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        SectorIOError::Other(msg)
    }
}

impl fmt::Display for SectorIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

impl core::error::Error for SectorIOError {}
