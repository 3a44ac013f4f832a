use std::borrow::Cow;
use std::fs::OpenOptions;
use std::path::Path;

use memmap2::{Mmap, MmapMut};

use super::super::archive::Archive;
use super::super::error::{Error, Result};
use super::super::header::{archives_start, Metadata};
use super::{dump_header, OpenFlags, Storage};

enum Map {
    Ro(Mmap),
    Rw(MmapMut),
}

impl Map {
    fn bytes(&self) -> &[u8] {
        match self {
            Map::Ro(map) => map,
            Map::Rw(map) => map,
        }
    }
}

/// Shared-mapping backend sized to the file. Reads are zero-copy views into
/// the map.
pub struct MmapBackend {
    map: Option<Map>,
}

impl MmapBackend {
    pub fn open(path: &Path, flags: OpenFlags) -> Result<MmapBackend> {
        flags.check()?;
        // Safety: the mapping is shared with the file; the engine never
        // resizes a database after creation.
        let map = if flags.write() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(Error::Open)?;
            Map::Rw(unsafe { MmapMut::map_mut(&file) }.map_err(Error::Mmap)?)
        } else {
            let file = OpenOptions::new().read(true).open(path).map_err(Error::Open)?;
            Map::Ro(unsafe { Mmap::map(&file) }.map_err(Error::Mmap)?)
        };
        Ok(MmapBackend { map: Some(map) })
    }

    pub fn create(
        path: &Path,
        total_size: u64,
        archives: &[Archive],
        metadata: &Metadata,
    ) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(Error::Open)?;
        file.set_len(total_size).map_err(Error::Ftruncate)?;
        file.sync_all().map_err(Error::Fsync)?;

        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(Error::Mmap)?;
        dump_header(&mut map[..archives_start(archives.len())], archives, metadata);
        map.flush().map_err(Error::Fsync)?;
        Ok(())
    }

    fn check_range(map: &Map, offset: u64, len: usize) -> Result<usize> {
        let size = map.bytes().len() as u64;
        let end = offset
            .checked_add(len as u64)
            .ok_or(Error::IoOffset { offset, len, size })?;
        if end > size {
            return Err(Error::IoOffset { offset, len, size });
        }
        Ok(offset as usize)
    }
}

impl Storage for MmapBackend {
    fn read(&mut self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        let map = self.map.as_ref().ok_or(Error::IoMissing)?;
        let start = Self::check_range(map, offset, len)?;
        Ok(Cow::Borrowed(&map.bytes()[start..start + len]))
    }

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let map = self.map.as_ref().ok_or(Error::IoMissing)?;
        let start = Self::check_range(map, offset, buf.len())?;
        buf.copy_from_slice(&map.bytes()[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let map = self.map.as_mut().ok_or(Error::IoMissing)?;
        let start = Self::check_range(map, offset, buf.len())?;
        match map {
            Map::Rw(map) => {
                map[start..start + buf.len()].copy_from_slice(buf);
                Ok(())
            }
            Map::Ro(_) => Err(Error::IoMode),
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(Map::Rw(map)) = self.map.take() {
            map.flush().map_err(Error::Fsync)?;
        }
        Ok(())
    }
}
