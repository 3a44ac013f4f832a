//! In-process backend, primarily used to exercise the full pipeline without
//! touching the filesystem.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use once_cell::sync::Lazy;

use super::super::archive::Archive;
use super::super::error::{Error, Result};
use super::super::header::{archives_start, Metadata};
use super::{dump_header, OpenFlags, Storage};

static GLOBAL: Lazy<MemoryRegistry> = Lazy::new(MemoryRegistry::new);

#[derive(Debug)]
struct MemoryFile {
    data: RwLock<Vec<u8>>,
}

/// Name → buffer store backing `Mapping::Memory`.
///
/// The mapping dispatch uses the process-wide `global()` instance; fresh
/// registries can be constructed for tests and embedders that want isolated
/// namespaces.
pub struct MemoryRegistry {
    files: Mutex<HashMap<String, Arc<MemoryFile>>>,
}

impl MemoryRegistry {
    pub fn new() -> MemoryRegistry {
        MemoryRegistry {
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static MemoryRegistry {
        &GLOBAL
    }

    fn find(&self, name: &str) -> Option<Arc<MemoryFile>> {
        self.lock().get(name).cloned()
    }

    /// Insert or replace by exact name; a replaced entry's buffer is dropped.
    fn insert(&self, name: &str, data: Vec<u8>) {
        self.lock().insert(
            name.to_owned(),
            Arc::new(MemoryFile {
                data: RwLock::new(data),
            }),
        );
    }

    /// Whether an entry exists under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Size in bytes of the entry under `name`, if present.
    pub fn size_of(&self, name: &str) -> Option<usize> {
        let file = self.find(name)?;
        let len = file.data.read().unwrap_or_else(|e| e.into_inner()).len();
        Some(len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<MemoryFile>>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryRegistry {
    fn default() -> MemoryRegistry {
        MemoryRegistry::new()
    }
}

/// Backend instance over one registry entry. Reads copy out of the shared
/// buffer.
#[derive(Debug)]
pub struct MemoryBackend {
    file: Option<Arc<MemoryFile>>,
}

impl MemoryBackend {
    pub fn open(registry: &MemoryRegistry, path: &Path, flags: OpenFlags) -> Result<MemoryBackend> {
        flags.check()?;
        let name = path.to_string_lossy();
        let file = registry.find(&name).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such in-memory database: {name}"),
            ))
        })?;
        Ok(MemoryBackend { file: Some(file) })
    }

    pub fn create(
        registry: &MemoryRegistry,
        path: &Path,
        total_size: u64,
        archives: &[Archive],
        metadata: &Metadata,
    ) -> Result<()> {
        // The complete buffer is computed up front so a failure can never
        // leave a partial entry under the name.
        let mut data = vec![0u8; total_size as usize];
        dump_header(&mut data[..archives_start(archives.len())], archives, metadata);
        registry.insert(&path.to_string_lossy(), data);
        Ok(())
    }

    fn file(&self) -> Result<&MemoryFile> {
        self.file.as_deref().ok_or(Error::IoMissing)
    }

    fn check_range(size: usize, offset: u64, len: usize) -> Result<usize> {
        let end = offset.checked_add(len as u64);
        match end {
            Some(end) if end <= size as u64 => Ok(offset as usize),
            _ => Err(Error::IoOffset {
                offset,
                len,
                size: size as u64,
            }),
        }
    }
}

impl Storage for MemoryBackend {
    fn read(&mut self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        let data = self.file()?.data.read().unwrap_or_else(|e| e.into_inner());
        let start = Self::check_range(data.len(), offset, len)?;
        Ok(Cow::Owned(data[start..start + len].to_vec()))
    }

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.file()?.data.read().unwrap_or_else(|e| e.into_inner());
        let start = Self::check_range(data.len(), offset, buf.len())?;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut data = self.file()?.data.write().unwrap_or_else(|e| e.into_inner());
        let start = Self::check_range(data.len(), offset, buf.len())?;
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whisper::aggregate::Aggregation;

    fn sample_layout() -> (Vec<Archive>, Metadata) {
        let archives = vec![Archive {
            offset: 28,
            seconds_per_point: 60,
            points: 5,
        }];
        let metadata = Metadata {
            aggregation: Aggregation::Last,
            max_retention: 300,
            x_files_factor: 0.0,
            archives_count: 1,
        };
        (archives, metadata)
    }

    #[test]
    fn absent_name_is_an_io_error() {
        let registry = MemoryRegistry::new();
        let err =
            MemoryBackend::open(&registry, Path::new("nothing-here"), OpenFlags::READ).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn create_registers_a_sized_buffer() {
        let registry = MemoryRegistry::new();
        let (archives, metadata) = sample_layout();
        MemoryBackend::create(&registry, Path::new("sized"), 88, &archives, &metadata).unwrap();

        assert!(registry.contains("sized"));
        assert_eq!(registry.size_of("sized"), Some(88));
        assert!(!registry.contains("something-else"));
    }

    #[test]
    fn create_replaces_by_exact_name() {
        let registry = MemoryRegistry::new();
        let (archives, metadata) = sample_layout();
        MemoryBackend::create(&registry, Path::new("twice"), 88, &archives, &metadata).unwrap();
        MemoryBackend::create(&registry, Path::new("twice"), 148, &archives, &metadata).unwrap();
        assert_eq!(registry.size_of("twice"), Some(148));
    }

    #[test]
    fn writes_are_visible_to_later_opens() {
        let registry = MemoryRegistry::new();
        let (archives, metadata) = sample_layout();
        MemoryBackend::create(&registry, Path::new("shared"), 88, &archives, &metadata).unwrap();

        let mut writer = MemoryBackend::open(
            &registry,
            Path::new("shared"),
            OpenFlags::READ | OpenFlags::WRITE,
        )
        .unwrap();
        writer.write(28, &[5, 6, 7]).unwrap();
        writer.close().unwrap();

        let mut reader =
            MemoryBackend::open(&registry, Path::new("shared"), OpenFlags::READ).unwrap();
        let bytes = reader.read(28, 3).unwrap();
        assert_eq!(&bytes[..], &[5, 6, 7]);
    }

    #[test]
    fn out_of_range_access_is_io_offset() {
        let registry = MemoryRegistry::new();
        let (archives, metadata) = sample_layout();
        MemoryBackend::create(&registry, Path::new("bounds"), 88, &archives, &metadata).unwrap();

        let mut backend =
            MemoryBackend::open(&registry, Path::new("bounds"), OpenFlags::READ).unwrap();
        assert!(matches!(
            backend.read(88, 1),
            Err(Error::IoOffset { offset: 88, len: 1, size: 88 })
        ));
        let mut buf = [0u8; 12];
        assert!(matches!(
            backend.read_into(80, &mut buf),
            Err(Error::IoOffset { .. })
        ));
    }

    #[test]
    fn closed_instance_reports_missing() {
        let registry = MemoryRegistry::new();
        let (archives, metadata) = sample_layout();
        MemoryBackend::create(&registry, Path::new("done"), 88, &archives, &metadata).unwrap();

        let mut backend =
            MemoryBackend::open(&registry, Path::new("done"), OpenFlags::READ).unwrap();
        backend.close().unwrap();
        backend.close().unwrap();
        assert!(matches!(backend.read(0, 1), Err(Error::IoMissing)));
    }
}
