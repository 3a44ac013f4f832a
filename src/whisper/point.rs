use byteorder::{BigEndian, ByteOrder};

/// Bytes occupied by one point on disk: 4-byte timestamp + 8-byte value.
pub const POINT_SIZE: usize = 12;

/// One stored sample. A timestamp of zero marks an empty slot; a NaN value
/// marks a slot without a valid sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub timestamp: u32,
    pub value: f64,
}

impl Point {
    pub fn new(timestamp: u32, value: f64) -> Point {
        Point { timestamp, value }
    }

    /// Decode one big-endian point record from the first `POINT_SIZE` bytes.
    pub fn from_bytes(buf: &[u8]) -> Point {
        Point {
            timestamp: BigEndian::read_u32(&buf[0..4]),
            value: BigEndian::read_f64(&buf[4..12]),
        }
    }

    /// Encode into the first `POINT_SIZE` bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) {
        BigEndian::write_u32(&mut buf[0..4], self.timestamp);
        BigEndian::write_f64(&mut buf[4..12], self.value);
    }
}

/// Decode a contiguous run of point records, appending to `out`.
pub fn parse_points(buf: &[u8], out: &mut Vec<Point>) {
    for chunk in buf.chunks_exact(POINT_SIZE) {
        out.push(Point::from_bytes(chunk));
    }
}

/// Encode a contiguous run of point records into `buf`.
pub fn dump_points(points: &[Point], buf: &mut [u8]) {
    for (point, chunk) in points.iter().zip(buf.chunks_exact_mut(POINT_SIZE)) {
        point.write_to(chunk);
    }
}

/// A sample as handed to `update`. A timestamp of zero means "now".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointInput {
    pub timestamp: u32,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    // whisper-create.py blah.wsp 60:5; first point of the archive block
    const SAMPLE_POINT: [u8; 12] = [
        0x55, 0xD9, 0x33, 0xE8, // timestamp 1440297960
        0x40, 0x59, 0x00, 0x00, // value 100.0
        0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn decodes_big_endian() {
        let point = Point::from_bytes(&SAMPLE_POINT);
        assert_eq!(point.timestamp, 1440297960);
        assert_eq!(point.value, 100.0);
    }

    #[test]
    fn encodes_big_endian() {
        let mut buf = [0u8; POINT_SIZE];
        Point::new(1440297960, 100.0).write_to(&mut buf);
        assert_eq!(buf, SAMPLE_POINT);
    }

    #[test]
    fn empty_slot_is_all_zeroes() {
        let mut buf = [0xFFu8; POINT_SIZE];
        Point::default().write_to(&mut buf);
        assert_eq!(buf, [0u8; POINT_SIZE]);
    }

    #[test]
    fn slice_roundtrip() {
        let points = vec![
            Point::new(1440392088, 100.0),
            Point::new(1440392090, -2.5),
            Point::new(0, f64::NAN),
        ];
        let mut buf = vec![0u8; points.len() * POINT_SIZE];
        dump_points(&points, &mut buf);

        let mut decoded = Vec::new();
        parse_points(&buf, &mut decoded);
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0], points[0]);
        assert_eq!(decoded[1], points[1]);
        assert_eq!(decoded[2].timestamp, 0);
        assert!(decoded[2].value.is_nan());
    }
}
