//! The error taxonomy shared by every fallible operation in the crate.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("database not open")]
    NotOpen,

    #[error("database already open")]
    AlreadyOpen,

    #[error("file position could not be established")]
    Offset,

    #[error("timestamp {timestamp} is ahead of now ({now})")]
    FutureTimestamp { timestamp: u32, now: u32 },

    #[error("sample is {diff}s old, not covered by any archive (max retention {max_retention}s)")]
    Retention { diff: u32, max_retention: u32 },

    #[error("invalid archive configuration: {0}")]
    Archive(&'static str),

    #[error("point out of bounds")]
    PointOob,

    #[error("unknown aggregation function {0}")]
    UnknownAggregation(u32),

    #[error("archive headers are not aligned")]
    ArchiveMisaligned,

    #[error("invalid time interval: from {from} until {until}")]
    TimeInterval { from: u32, until: u32 },

    #[error("neither read nor write mode requested")]
    IoMode,

    #[error("mmap failed: {0}")]
    Mmap(#[source] io::Error),

    #[error("could not allocate file size: {0}")]
    Ftruncate(#[source] io::Error),

    #[error("could not flush file: {0}")]
    Fsync(#[source] io::Error),

    #[error("could not open file: {0}")]
    Open(#[source] io::Error),

    #[error("could not open file stream: {0}")]
    Fopen(#[source] io::Error),

    #[error("backend instance is gone")]
    IoMissing,

    #[error("{len} bytes at offset {offset} fall outside the backed region ({size} bytes)")]
    IoOffset { offset: u64, len: usize, size: u64 },
}

impl Error {
    /// The OS error subcode accompanying a backend failure, when one exists.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            Error::Io(e)
            | Error::Mmap(e)
            | Error::Ftruncate(e)
            | Error::Fsync(e)
            | Error::Open(e)
            | Error::Fopen(e) => e.raw_os_error(),
            _ => None,
        }
    }
}
