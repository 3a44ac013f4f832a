//! Whisper database files: fixed-size, multi-resolution, circular
//! time-series storage.
//!
//! A database holds a metadata header, a table of archive descriptors and
//! one ring of timestamped samples per archive, finest resolution first.
//! Writes land in the finest archive whose retention still covers the
//! sample's age and are rolled up into every coarser archive through the
//! configured aggregation function, gated by the x-files factor. The on-disk
//! format is big-endian and identical across the file, mmap and in-memory
//! backends.
//!
//! ```
//! use std::path::Path;
//! use whisperdb::{Aggregation, ArchiveSpec, Database, Mapping, OpenFlags, PointInput};
//!
//! # fn main() -> whisperdb::Result<()> {
//! let specs = [
//!     ArchiveSpec { seconds_per_point: 60, points: 60 },
//!     ArchiveSpec { seconds_per_point: 300, points: 60 },
//! ];
//! Database::create(Path::new("demo"), &specs, Aggregation::Average, 0.5, Mapping::Memory)?;
//!
//! let mut db = Database::new();
//! db.open(Path::new("demo"), Mapping::Memory, OpenFlags::READ | OpenFlags::WRITE)?;
//! db.update(&PointInput { timestamp: 0, value: 1.0 })?; // timestamp 0: "now"
//! db.close()?;
//! # Ok(())
//! # }
//! ```

pub mod whisper;

pub use whisper::{
    aggregate, archive, error, header, io, parse, point, time, Aggregated, Aggregation, Archive,
    ArchiveSpec, Database, Error, Mapping, MemoryRegistry, Metadata, OpenFlags, Point, PointInput,
    Result, Storage, ARCHIVE_INFO_SIZE, METADATA_SIZE, POINT_SIZE,
};
