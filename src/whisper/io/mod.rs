//! Pluggable byte-addressed storage behind the database core.
//!
//! Every backend realizes the same uniform interface over one open store;
//! the on-disk format is identical across backends, so a database created by
//! one is readable by any other.

use std::borrow::Cow;
use std::ops::BitOr;
use std::path::Path;

use super::archive::{Archive, ARCHIVE_INFO_SIZE};
use super::error::{Error, Result};
use super::header::{Metadata, METADATA_SIZE};

mod file;
pub mod memory;
mod mmap;

pub use self::file::FileBackend;
pub use self::memory::{MemoryBackend, MemoryRegistry};
pub use self::mmap::MmapBackend;

/// Which backend realizes a database path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    File = 1,
    Mmap = 2,
    Memory = 3,
}

/// Open-mode bitset; at least one of `READ` and `WRITE` must be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const READ: OpenFlags = OpenFlags(0x01);
    pub const WRITE: OpenFlags = OpenFlags(0x02);

    pub fn read(self) -> bool {
        self.0 & Self::READ.0 != 0
    }

    pub fn write(self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }

    pub(crate) fn check(self) -> Result<()> {
        if self.read() || self.write() {
            Ok(())
        } else {
            Err(Error::IoMode)
        }
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

/// Uniform byte-addressable interface over one open store.
///
/// `read` may return a borrowed zero-copy view (mmap) or an owned buffer
/// (file, memory); `read_into` always copies into caller memory. A borrowed
/// view stays valid until the next mutation of the same instance.
pub trait Storage {
    fn read(&mut self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>>;

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Overwrite in place.
    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Release the instance. Further operations fail with `IoMissing`;
    /// closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Acquire a backend instance for an existing store.
pub fn open(mapping: Mapping, path: &Path, flags: OpenFlags) -> Result<Box<dyn Storage>> {
    match mapping {
        Mapping::File => Ok(Box::new(FileBackend::open(path, flags)?)),
        Mapping::Mmap => Ok(Box::new(MmapBackend::open(path, flags)?)),
        Mapping::Memory => Ok(Box::new(MemoryBackend::open(
            MemoryRegistry::global(),
            path,
            flags,
        )?)),
    }
}

/// Allocate a new store of exactly `total_size` bytes with the header region
/// filled in and the point regions zeroed.
pub fn create(
    mapping: Mapping,
    path: &Path,
    total_size: u64,
    archives: &[Archive],
    metadata: &Metadata,
) -> Result<()> {
    match mapping {
        Mapping::File => FileBackend::create(path, total_size, archives, metadata),
        Mapping::Mmap => MmapBackend::create(path, total_size, archives, metadata),
        Mapping::Memory => {
            MemoryBackend::create(MemoryRegistry::global(), path, total_size, archives, metadata)
        }
    }
}

/// Serialize the header region (metadata, then the descriptor table) into
/// the front of `buf`.
pub(crate) fn dump_header(buf: &mut [u8], archives: &[Archive], metadata: &Metadata) {
    metadata.write_to(&mut buf[..METADATA_SIZE]);
    for (index, archive) in archives.iter().enumerate() {
        let at = METADATA_SIZE + index * ARCHIVE_INFO_SIZE;
        archive.write_to(&mut buf[at..at + ARCHIVE_INFO_SIZE]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whisper::aggregate::Aggregation;
    use crate::whisper::header::archives_start;

    #[test]
    fn flags_compose() {
        let both = OpenFlags::READ | OpenFlags::WRITE;
        assert!(both.read());
        assert!(both.write());
        assert!(!OpenFlags::READ.write());
        assert!(!OpenFlags::WRITE.read());
    }

    #[test]
    fn empty_flags_are_rejected() {
        let none = OpenFlags(0);
        assert!(matches!(none.check(), Err(Error::IoMode)));
        assert!(OpenFlags::READ.check().is_ok());
    }

    #[test]
    fn header_region_layout() {
        let archives = [
            Archive {
                offset: 40,
                seconds_per_point: 60,
                points: 10,
            },
            Archive {
                offset: 160,
                seconds_per_point: 120,
                points: 6,
            },
        ];
        let metadata = Metadata {
            aggregation: Aggregation::Average,
            max_retention: 720,
            x_files_factor: 0.5,
            archives_count: 2,
        };

        let mut buf = vec![0u8; archives_start(archives.len())];
        dump_header(&mut buf, &archives, &metadata);

        assert_eq!(Metadata::from_bytes(&buf).unwrap(), metadata);
        assert_eq!(Archive::from_bytes(&buf[16..28]), archives[0]);
        assert_eq!(Archive::from_bytes(&buf[28..40]), archives[1]);
    }
}
