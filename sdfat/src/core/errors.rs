// SPDX-License-Identifier: MIT

use core::fmt;

pub use sdio::errors::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatTableError {
    IO(SectorIOError),
    /// FAT index outside `[2, countOfFatEntries)`.
    OutOfRange(u32),
    /// Entry that is neither free, bad, EOC nor a valid pointer.
    Corrupt { cluster: u32, value: u32 },
    LoopDetected,
    Invalid(&'static str),
    Other(&'static str),
}

impl FatTableError {
    pub fn msg(&self) -> &'static str {
        match self {
            FatTableError::IO(_) => "IO error",
            FatTableError::OutOfRange(_) => "FAT index out of range",
            FatTableError::Corrupt { .. } => "Corrupt FAT entry",
            FatTableError::LoopDetected => "Loop detected in FAT chain",
            FatTableError::Invalid(msg) => msg,
            FatTableError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FatTableError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }
}

impl fmt::Display for FatTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        match self {
            FatTableError::OutOfRange(cluster) => write!(f, " (cluster: {cluster})")?,
            FatTableError::Corrupt { cluster, value } => {
                write!(f, " (cluster: {cluster}, value: {value:#010X})")?
            }
            _ => {}
        }
        let mut current = self.source();
        while let Some(src) = current {
            write!(f, "\n  caused by: {}", src.msg())?;
            current = src.source();
        }
        Ok(())
    }
}

impl core::error::Error for FatTableError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsParsingError {
    IO(SectorIOError),
    Corrupted,
    Invalid(&'static str),
    Other(&'static str),
}

impl FsParsingError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsParsingError::IO(_) => "IO error",
            FsParsingError::Corrupted => "Corrupted structure",
            FsParsingError::Invalid(msg) => msg,
            FsParsingError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsParsingError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsFormatterError {
    IO(SectorIOError),
    Table(FatTableError),
    /// Container too small to hold the minimum FAT32 cluster count.
    TooSmall,
    Invalid(&'static str),
    Other(&'static str),
}

impl FsFormatterError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsFormatterError::IO(_) => "IO error",
            FsFormatterError::Table(_) => "FAT table error",
            FsFormatterError::TooSmall => "Volume too small for FAT32",
            FsFormatterError::Invalid(msg) => msg,
            FsFormatterError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsFormatterError::IO(e) => Some(FsError::IO(*e)),
            FsFormatterError::Table(e) => Some(FsError::Table(*e)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsResolverError {
    IO(SectorIOError),
    Table(FatTableError),
    Parsing(FsParsingError),
    InvalidName(&'static str),
    NotADirectory,
    NotAFile,
    AlreadyExists,
    NotFound,
    NotEmpty,
    NoSpace,
    /// Operation not permitted on the root directory.
    RootDirectory,
    Invalid(&'static str),
    Other(&'static str),
}

impl FsResolverError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsResolverError::IO(_) => "IO error",
            FsResolverError::Table(_) => "FAT table error",
            FsResolverError::Parsing(_) => "Parsing error",
            FsResolverError::InvalidName(msg) => msg,
            FsResolverError::NotADirectory => "Not a directory",
            FsResolverError::NotAFile => "Not a file",
            FsResolverError::AlreadyExists => "Entry already exists",
            FsResolverError::NotFound => "Path not found",
            FsResolverError::NotEmpty => "Directory not empty",
            FsResolverError::NoSpace => "No space left on volume",
            FsResolverError::RootDirectory => "Operation not permitted on root directory",
            FsResolverError::Invalid(msg) => msg,
            FsResolverError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsResolverError::IO(e) => Some(FsError::IO(*e)),
            FsResolverError::Table(e) => Some(FsError::Table(*e)),
            FsResolverError::Parsing(e) => Some(FsError::Parsing(*e)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsFileError {
    IO(SectorIOError),
    Table(FatTableError),
    /// Handle already closed.
    Closed,
    NotReadable,
    NotWritable,
    NoSpace,
    SeekOutOfRange,
    /// The directory entry backing the handle was tombstoned.
    EntryDeleted,
    Invalid(&'static str),
    Other(&'static str),
}

impl FsFileError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsFileError::IO(_) => "IO error",
            FsFileError::Table(_) => "FAT table error",
            FsFileError::Closed => "File handle is closed",
            FsFileError::NotReadable => "File not opened for reading",
            FsFileError::NotWritable => "File not opened for writing",
            FsFileError::NoSpace => "No space left on volume",
            FsFileError::SeekOutOfRange => "Seek position out of range",
            FsFileError::EntryDeleted => "Directory entry was deleted",
            FsFileError::Invalid(msg) => msg,
            FsFileError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsFileError::IO(e) => Some(FsError::IO(*e)),
            FsFileError::Table(e) => Some(FsError::Table(*e)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsCheckerError {
    IO(SectorIOError),
    Table(FatTableError),
    Parsing(FsParsingError),
    Resolver(FsResolverError),
    Invalid(&'static str),
    Other(&'static str),
}

impl FsCheckerError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsCheckerError::IO(_) => "IO error",
            FsCheckerError::Table(_) => "FAT table error",
            FsCheckerError::Parsing(_) => "Parsing error",
            FsCheckerError::Resolver(_) => "Resolver error",
            FsCheckerError::Invalid(msg) => msg,
            FsCheckerError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsCheckerError::IO(e) => Some(FsError::IO(*e)),
            FsCheckerError::Table(e) => Some(FsError::Table(*e)),
            FsCheckerError::Parsing(e) => Some(FsError::Parsing(*e)),
            FsCheckerError::Resolver(e) => Some(FsError::Resolver(*e)),
            _ => None,
        }
    }
}

/// Top-level error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    IO(SectorIOError),
    Table(FatTableError),
    Parsing(FsParsingError),
    Formatter(FsFormatterError),
    Resolver(FsResolverError),
    File(FsFileError),
    Checker(FsCheckerError),
    Other(&'static str),
}

impl FsError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsError::IO(e) => e.msg(),
            FsError::Table(e) => e.msg(),
            FsError::Parsing(e) => e.msg(),
            FsError::Formatter(e) => e.msg(),
            FsError::Resolver(e) => e.msg(),
            FsError::File(e) => e.msg(),
            FsError::Checker(e) => e.msg(),
            FsError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsError::Table(e) => e.source(),
            FsError::Parsing(e) => e.source(),
            FsError::Formatter(e) => e.source(),
            FsError::Resolver(e) => e.source(),
            FsError::File(e) => e.source(),
            FsError::Checker(e) => e.source(),
            FsError::IO(_) => None,
            FsError::Other(_) => None,
        }
    }
}

crate::fs_error_display!(
    FsParsingError,
    FsFormatterError,
    FsResolverError,
    FsFileError,
    FsCheckerError,
    FsError,
);

// === type Fs*Result ===

pub type FsResult<T = ()> = Result<T, FsError>;
pub type FatTableResult<T = ()> = Result<T, FatTableError>;
pub type FsParsingResult<T = ()> = Result<T, FsParsingError>;
pub type FsFormatterResult<T = ()> = Result<T, FsFormatterError>;
pub type FsResolverResult<T = ()> = Result<T, FsResolverError>;
pub type FsFileResult<T = ()> = Result<T, FsFileError>;
pub type FsCheckerResult<T = ()> = Result<T, FsCheckerError>;

crate::fs_error_wiring! {
    top => FsError {
        SectorIOError    : IO,
        FatTableError    : Table,
        FsParsingError   : Parsing,
        FsFormatterError : Formatter,
        FsResolverError  : Resolver,
        FsFileError      : File,
        FsCheckerError   : Checker,
    },
    str_into => [
        FatTableError,
        FsParsingError,
        FsFormatterError,
        FsResolverError,
        FsFileError,
        FsCheckerError,
    ],
    sub => {
        SectorIOError   => [ FatTableError::IO, FsParsingError::IO, FsFormatterError::IO, FsResolverError::IO, FsFileError::IO, FsCheckerError::IO ],
        FatTableError   => [ FsFormatterError::Table, FsResolverError::Table, FsFileError::Table, FsCheckerError::Table ],
        FsParsingError  => [ FsResolverError::Parsing, FsCheckerError::Parsing ],
        FsResolverError => [ FsCheckerError::Resolver ],
    },
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_display() {
        let low = SectorIOError::OutOfBounds;
        let table = FatTableError::from(low);
        let top = FsError::Resolver(FsResolverError::Table(table));

        let text = top.to_string();
        assert!(text.starts_with("FAT table error"));
        assert!(text.contains("caused by: FAT table error"));
        assert!(text.ends_with("caused by: Out of bounds"));
    }

    #[test]
    fn test_table_error_details() {
        let e = FatTableError::Corrupt {
            cluster: 7,
            value: 1,
        };
        assert_eq!(
            e.to_string(),
            "Corrupt FAT entry (cluster: 7, value: 0x00000001)"
        );
        assert_eq!(
            FatTableError::OutOfRange(1).to_string(),
            "FAT index out of range (cluster: 1)"
        );
    }

    #[test]
    fn test_question_mark_wiring() {
        fn io() -> SectorIOResult {
            Err(SectorIOError::Unsupported)
        }
        fn lift() -> FsFileResult {
            io()?;
            Ok(())
        }
        assert_eq!(lift(), Err(FsFileError::IO(SectorIOError::Unsupported)));

        let from_str: FsResolverError = "boom".into();
        assert_eq!(from_str, FsResolverError::Other("boom"));
    }
}
