use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::super::archive::Archive;
use super::super::error::{Error, Result};
use super::super::header::{archives_start, Metadata};
use super::{dump_header, OpenFlags, Storage};

/// Plain file-descriptor backend with explicit seek/tell. Reads return owned
/// buffers.
#[derive(Debug)]
pub struct FileBackend {
    file: Option<File>,
}

impl FileBackend {
    pub fn open(path: &Path, flags: OpenFlags) -> Result<FileBackend> {
        flags.check()?;
        let file = OpenOptions::new()
            .read(flags.read())
            .write(flags.write())
            .open(path)
            .map_err(Error::Fopen)?;
        Ok(FileBackend { file: Some(file) })
    }

    pub fn create(
        path: &Path,
        total_size: u64,
        archives: &[Archive],
        metadata: &Metadata,
    ) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(path)
            .map_err(Error::Fopen)?;
        // Sizes the file to the full layout and zero-fills the point regions.
        file.set_len(total_size).map_err(Error::Ftruncate)?;
        file.flush().map_err(Error::Fsync)?;

        let mut header = vec![0u8; archives_start(archives.len())];
        dump_header(&mut header, archives, metadata);
        file.seek(SeekFrom::Start(0)).map_err(|_| Error::Offset)?;
        file.write_all(&header)?;
        file.flush().map_err(Error::Fsync)?;
        Ok(())
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(Error::IoMissing)
    }

    /// Reposition the descriptor when the stream is not already at `offset`.
    fn seek_to(&mut self, offset: u64) -> Result<()> {
        let file = self.file()?;
        let at = file.stream_position().map_err(|_| Error::Offset)?;
        if at != offset {
            file.seek(SeekFrom::Start(offset)).map_err(|_| Error::Offset)?;
        }
        Ok(())
    }
}

impl Storage for FileBackend {
    fn read(&mut self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        self.seek_to(offset)?;
        let mut buf = vec![0u8; len];
        self.file()?.read_exact(&mut buf)?;
        Ok(Cow::Owned(buf))
    }

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.seek_to(offset)?;
        self.file()?.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset)).map_err(|_| Error::Offset)?;
        file.write_all(buf)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().map_err(Error::Fsync)?;
        }
        Ok(())
    }
}
