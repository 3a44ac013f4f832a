use byteorder::{BigEndian, ByteOrder};

use super::aggregate::Aggregation;
use super::archive::ARCHIVE_INFO_SIZE;
use super::error::Result;

/// Bytes occupied by the metadata header on disk.
pub const METADATA_SIZE: usize = 16;

/// Database-wide header: written once by `create`, immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metadata {
    pub aggregation: Aggregation,
    pub max_retention: u32,
    pub x_files_factor: f32,
    pub archives_count: u32,
}

impl Default for Metadata {
    fn default() -> Metadata {
        Metadata {
            aggregation: Aggregation::Average,
            max_retention: 0,
            x_files_factor: 0.0,
            archives_count: 0,
        }
    }
}

impl Metadata {
    /// Decode the big-endian header record from the first `METADATA_SIZE`
    /// bytes. Fails on an unrecognized aggregation value.
    pub fn from_bytes(buf: &[u8]) -> Result<Metadata> {
        Ok(Metadata {
            aggregation: Aggregation::from_wire(BigEndian::read_u32(&buf[0..4]))?,
            max_retention: BigEndian::read_u32(&buf[4..8]),
            x_files_factor: BigEndian::read_f32(&buf[8..12]),
            archives_count: BigEndian::read_u32(&buf[12..16]),
        })
    }

    /// Encode into the first `METADATA_SIZE` bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) {
        BigEndian::write_u32(&mut buf[0..4], self.aggregation.to_wire());
        BigEndian::write_u32(&mut buf[4..8], self.max_retention);
        BigEndian::write_f32(&mut buf[8..12], self.x_files_factor);
        BigEndian::write_u32(&mut buf[12..16], self.archives_count);
    }
}

/// Absolute offset of the byte after the descriptor table, which is both
/// where the first point region starts and where descriptor `n` would sit.
pub fn archives_start(archive_count: usize) -> usize {
    METADATA_SIZE + ARCHIVE_INFO_SIZE * archive_count
}
