use std::path::Path;

use log::{debug, trace};

pub mod aggregate;
pub mod archive;
pub mod error;
pub mod header;
pub mod io;
pub mod parse;
pub mod point;
pub mod time;

pub use self::aggregate::{Aggregated, Aggregation};
pub use self::archive::{Archive, ArchiveSpec, ARCHIVE_INFO_SIZE};
pub use self::error::{Error, Result};
pub use self::header::{Metadata, METADATA_SIZE};
pub use self::io::{Mapping, MemoryRegistry, OpenFlags, Storage};
pub use self::point::{Point, PointInput, POINT_SIZE};

/// An open whisper database: the metadata header and descriptor table loaded
/// at open time, plus the storage backend realizing the byte store.
///
/// One handle is meant for one thread; the engine exposes no locking.
pub struct Database {
    meta: Metadata,
    archives: Vec<Archive>,
    storage: Option<Box<dyn Storage>>,
}

impl Database {
    pub fn new() -> Database {
        Database {
            meta: Metadata::default(),
            archives: Vec::new(),
            storage: None,
        }
    }

    /// Lay out and allocate a new database.
    ///
    /// Archives must be ordered finest to coarsest: strictly increasing
    /// seconds per point, each resolution a multiple of the previous one,
    /// with strictly increasing retention.
    pub fn create(
        path: &Path,
        specs: &[ArchiveSpec],
        aggregation: Aggregation,
        x_files_factor: f32,
        mapping: Mapping,
    ) -> Result<()> {
        if specs.is_empty() {
            return Err(Error::Archive("at least one archive is required"));
        }

        let mut archives = Vec::with_capacity(specs.len());
        let mut offset = header::archives_start(specs.len()) as u64;
        let mut max_retention = 0u64;

        for (index, spec) in specs.iter().enumerate() {
            if spec.seconds_per_point == 0 {
                return Err(Error::Archive("seconds per point must be nonzero"));
            }
            if spec.points == 0 {
                return Err(Error::Archive("point count must be nonzero"));
            }
            if index > 0 {
                let prev = &specs[index - 1];
                if spec.seconds_per_point <= prev.seconds_per_point {
                    return Err(Error::Archive("seconds per point must strictly increase"));
                }
                if spec.seconds_per_point % prev.seconds_per_point != 0 {
                    return Err(Error::Archive(
                        "seconds per point must be a multiple of the previous archive's",
                    ));
                }
                if spec.retention() <= prev.retention() {
                    return Err(Error::Archive("retention must strictly increase"));
                }
            }
            if offset > u64::from(u32::MAX) {
                return Err(Error::Archive("archives exceed the addressable file size"));
            }
            max_retention = max_retention.max(spec.retention());
            archives.push(Archive {
                offset: offset as u32,
                seconds_per_point: spec.seconds_per_point,
                points: spec.points,
            });
            offset += spec.points as u64 * POINT_SIZE as u64;
        }

        if max_retention > u64::from(u32::MAX) {
            return Err(Error::Archive("retention exceeds the representable range"));
        }

        let metadata = Metadata {
            aggregation,
            max_retention: max_retention as u32,
            x_files_factor,
            archives_count: specs.len() as u32,
        };

        debug!(
            "creating {} with {} archives, {} bytes",
            path.display(),
            specs.len(),
            offset
        );
        io::create(mapping, path, offset, &archives, &metadata)
    }

    /// Bind this handle to an existing database.
    ///
    /// On failure the handle reverts to its pre-open state.
    pub fn open(&mut self, path: &Path, mapping: Mapping, flags: OpenFlags) -> Result<()> {
        if self.storage.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let mut storage = io::open(mapping, path, flags)?;

        let mut buf = [0u8; METADATA_SIZE];
        storage.read_into(0, &mut buf)?;
        let meta = Metadata::from_bytes(&buf)?;

        let mut archives: Vec<Archive> = Vec::new();
        for index in 0..meta.archives_count {
            let mut buf = [0u8; ARCHIVE_INFO_SIZE];
            storage.read_into(header::archives_start(index as usize) as u64, &mut buf)?;
            let cur = Archive::from_bytes(&buf);
            if let Some(prev) = archives.last() {
                // Adjacent archives must nest cleanly for propagation to
                // line up.
                if cur.seconds_per_point % prev.seconds_per_point != 0
                    || cur.points % prev.points != 0
                {
                    return Err(Error::ArchiveMisaligned);
                }
            }
            archives.push(cur);
        }

        debug!(
            "opened {}: {:?}, {} archives, max retention {}s",
            path.display(),
            meta.aggregation,
            meta.archives_count,
            meta.max_retention
        );
        self.meta = meta;
        self.archives = archives;
        self.storage = Some(storage);
        Ok(())
    }

    /// Release the backend and the loaded descriptors. Closing an
    /// already-closed handle is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let archives = self.archives.len();
        self.archives.clear();
        if let Some(mut storage) = self.storage.take() {
            storage.close()?;
            debug!("closed database, released {archives} archives");
        }
        self.meta = Metadata::default();
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.storage.is_some()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    pub fn archives(&self) -> &[Archive] {
        &self.archives
    }

    /// Insert a sample using the wall clock as "now".
    pub fn update(&mut self, input: &PointInput) -> Result<()> {
        self.update_at(input, time::now())
    }

    /// Insert a sample relative to an explicit "now".
    ///
    /// The sample lands in the highest-precision archive whose retention
    /// still covers it, then rolls up into each coarser archive until the
    /// aggregation reports too few valid points. A timestamp of zero asks
    /// for "now". The per-archive writes are sequenced finest first and are
    /// not journaled; a crash mid-propagation can leave coarser archives
    /// behind the finest one.
    pub fn update_at(&mut self, input: &PointInput, now: u32) -> Result<()> {
        if self.storage.is_none() {
            return Err(Error::NotOpen);
        }

        let timestamp = if input.timestamp == 0 {
            now
        } else {
            input.timestamp
        };
        if timestamp > now {
            return Err(Error::FutureTimestamp { timestamp, now });
        }

        let start = self.find_highest_precision(now - timestamp)?;

        let mut prev = self.archive(start)?;
        let mut prev_base = self.update_point(&prev, timestamp, input.value)?;

        for index in start + 1..self.archives.len() {
            let cur = self.archive(index)?;
            let floored = cur.bucket(timestamp);

            // Gather the block of finer points this coarser slot covers,
            // anchored at the previous archive's pre-write base.
            let gather_from = prev.index_of(prev_base.timestamp, floored);
            let gather_count = cur.seconds_per_point / prev.seconds_per_point;
            let fresh_base = self.load_point(&prev, 0)?;
            let block =
                self.fetch_archive_points(&prev, &fresh_base, i64::from(gather_from), gather_count)?;

            let aggregated = self.meta.aggregation.apply(&block, self.meta.x_files_factor);
            if aggregated.skip {
                debug!("propagation stopped at archive {index}: too few valid points");
                break;
            }

            prev_base = self.update_point(&cur, timestamp, aggregated.value)?;
            prev = cur;
        }

        Ok(())
    }

    /// Insert a batch of samples in order, sharing one wall-clock sample.
    pub fn update_many(&mut self, inputs: &[PointInput]) -> Result<()> {
        let now = time::now();
        for input in inputs {
            self.update_at(input, now)?;
        }
        Ok(())
    }

    /// Raw unfiltered read of `size` points starting at slot `offset`. Does
    /// not wrap around the ring seam.
    pub fn load_points(&mut self, archive_index: usize, offset: u32, size: u32) -> Result<Vec<Point>> {
        let archive = self.archive(archive_index)?;
        if u64::from(offset) + u64::from(size) > u64::from(archive.points) {
            return Err(Error::PointOob);
        }
        let mut out = Vec::with_capacity(size as usize);
        self.load_region(&archive, offset, size, &mut out)?;
        Ok(out)
    }

    /// Wrap-aware fetch of `count` filtered points starting at the signed
    /// slot offset `offset` relative to the archive's base point.
    ///
    /// Every returned slot holds either the stored sample whose timestamp
    /// matches the expected one, or `(expected, NaN)` where a stale entry
    /// from another ring cycle (or an empty slot) was found.
    pub fn fetch_points(&mut self, archive_index: usize, offset: i64, count: u32) -> Result<Vec<Point>> {
        let archive = self.archive(archive_index)?;
        let base = self.load_point(&archive, 0)?;
        self.fetch_archive_points(&archive, &base, offset, count)
    }

    /// Windowed fetch between two timestamps, inclusive at both ends after
    /// flooring to the archive's resolution.
    pub fn fetch_time_points(&mut self, archive_index: usize, from: u32, until: u32) -> Result<Vec<Point>> {
        let archive = self.archive(archive_index)?;
        if from > until {
            return Err(Error::TimeInterval { from, until });
        }
        let base = self.load_point(&archive, 0)?;

        let spp = i64::from(archive.seconds_per_point);
        let from_floored = archive.bucket(from);
        let until_floored = archive.bucket(until);
        let offset = (i64::from(from_floored) - i64::from(base.timestamp)) / spp;
        let count = (i64::from(until_floored) - i64::from(from_floored)) / spp + 1;
        let count = count.min(i64::from(archive.points)) as u32;

        self.fetch_archive_points(&archive, &base, offset, count)
    }

    /// Write a run of points starting at slot `offset`, splitting into two
    /// writes when the run passes the end of the archive.
    pub fn write_points(&mut self, archive_index: usize, offset: u32, points: &[Point]) -> Result<()> {
        let archive = self.archive(archive_index)?;
        if points.len() as u64 >= u64::from(archive.points) || offset >= archive.points {
            return Err(Error::PointOob);
        }

        let length = points.len() as u32;
        if u64::from(offset) + u64::from(length) <= u64::from(archive.points) {
            self.write_run(&archive, offset, points)
        } else {
            let first = (archive.points - offset) as usize;
            self.write_run(&archive, offset, &points[..first])?;
            self.write_run(&archive, 0, &points[first..])
        }
    }

    fn storage(&mut self) -> Result<&mut dyn Storage> {
        match self.storage {
            Some(ref mut s) => Ok(s.as_mut()),
            None => Err(Error::NotOpen),
        }
    }

    fn archive(&self, index: usize) -> Result<Archive> {
        if self.storage.is_none() {
            return Err(Error::NotOpen);
        }
        self.archives
            .get(index)
            .copied()
            .ok_or(Error::Archive("no such archive"))
    }

    /// The first archive precise enough to still cover a sample `diff`
    /// seconds old.
    fn find_highest_precision(&self, diff: u32) -> Result<usize> {
        if u64::from(diff) >= u64::from(self.meta.max_retention) {
            return Err(Error::Retention {
                diff,
                max_retention: self.meta.max_retention,
            });
        }
        self.archives
            .iter()
            .position(|archive| archive.retention() >= u64::from(diff))
            .ok_or(Error::Archive("no archive covers the timestamp"))
    }

    /// Write one floored sample into `archive`, returning the base point as
    /// it was before the write.
    fn update_point(&mut self, archive: &Archive, timestamp: u32, value: f64) -> Result<Point> {
        let base = self.load_point(archive, 0)?;
        let floored = archive.bucket(timestamp);
        // An empty archive anchors its ring at the first write.
        let index = if base.timestamp == 0 {
            0
        } else {
            archive.index_of(base.timestamp, floored)
        };
        self.save_point(archive, index, &Point::new(floored, value))?;
        Ok(base)
    }

    fn load_point(&mut self, archive: &Archive, index: u32) -> Result<Point> {
        let mut buf = [0u8; POINT_SIZE];
        self.storage()?.read_into(archive.point_offset(index), &mut buf)?;
        let point = Point::from_bytes(&buf);
        trace!(
            "loaded ({}, {}) from slot {index} at offset {}",
            point.timestamp,
            point.value,
            archive.offset
        );
        Ok(point)
    }

    fn save_point(&mut self, archive: &Archive, index: u32, point: &Point) -> Result<()> {
        if index >= archive.points {
            return Err(Error::PointOob);
        }
        let mut buf = [0u8; POINT_SIZE];
        point.write_to(&mut buf);
        trace!(
            "saving ({}, {}) to slot {index} at offset {}",
            point.timestamp,
            point.value,
            archive.offset
        );
        self.storage()?.write(archive.point_offset(index), &buf)
    }

    /// Linear region load; the caller splits across the ring seam.
    fn load_region(&mut self, archive: &Archive, offset: u32, size: u32, out: &mut Vec<Point>) -> Result<()> {
        if size == 0 {
            return Ok(());
        }
        let storage = self.storage()?;
        let bytes = storage.read(archive.point_offset(offset), size as usize * POINT_SIZE)?;
        point::parse_points(&bytes, out);
        Ok(())
    }

    fn write_run(&mut self, archive: &Archive, offset: u32, points: &[Point]) -> Result<()> {
        let mut buf = vec![0u8; points.len() * POINT_SIZE];
        point::dump_points(points, &mut buf);
        self.storage()?.write(archive.point_offset(offset), &buf)
    }

    fn fetch_archive_points(
        &mut self,
        archive: &Archive,
        base: &Point,
        offset: i64,
        count: u32,
    ) -> Result<Vec<Point>> {
        let count = count.min(archive.points);
        let mut raw = Vec::with_capacity(count as usize);

        if count > 0 {
            let from = archive::wrap_index(offset, i64::from(archive.points));
            let until = archive::wrap_index(offset + i64::from(count), i64::from(archive.points));

            if until <= from && from != 0 {
                // Two linear loads around the ring seam.
                self.load_region(archive, from, archive.points - from, &mut raw)?;
                self.load_region(archive, 0, until, &mut raw)?;
            } else {
                self.load_region(archive, from, count, &mut raw)?;
            }
        }

        // Mask slots that belong to a different ring cycle.
        let mut out = Vec::with_capacity(count as usize);
        for (i, point) in raw.iter().enumerate() {
            let expected = i64::from(base.timestamp)
                + i64::from(archive.seconds_per_point) * (offset + i as i64);
            if i64::from(point.timestamp) == expected {
                out.push(*point);
            } else {
                out.push(Point::new(expected as u32, f64::NAN));
            }
        }
        Ok(out)
    }
}

impl Default for Database {
    fn default() -> Database {
        Database::new()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Best-effort release; close is idempotent.
        let _ = self.close();
    }
}
