//! Reducers that collapse a block of finer-resolution points into one
//! coarser-resolution point during write propagation.

use super::error::{Error, Result};
use super::point::Point;

/// Aggregation function, stored by wire value in the metadata header and
/// resolved at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Average,
    Sum,
    Last,
    Max,
    Min,
}

/// Outcome of one aggregation. `skip` stops the propagation loop when too
/// few valid points were present to form a meaningful aggregate.
#[derive(Debug, Clone, Copy)]
pub struct Aggregated {
    pub value: f64,
    pub skip: bool,
}

impl Aggregation {
    /// Decode the on-disk enum value.
    pub fn from_wire(value: u32) -> Result<Aggregation> {
        match value {
            1 => Ok(Aggregation::Average),
            2 => Ok(Aggregation::Sum),
            3 => Ok(Aggregation::Last),
            4 => Ok(Aggregation::Max),
            5 => Ok(Aggregation::Min),
            other => Err(Error::UnknownAggregation(other)),
        }
    }

    pub fn to_wire(self) -> u32 {
        match self {
            Aggregation::Average => 1,
            Aggregation::Sum => 2,
            Aggregation::Last => 3,
            Aggregation::Max => 4,
            Aggregation::Min => 5,
        }
    }

    /// Reduce a block of points. NaN values do not count as valid samples;
    /// when the valid fraction falls below `x_files_factor` the result is NaN
    /// and `skip` is set. `Last` reports the newest slot as-is and never
    /// skips.
    pub fn apply(self, points: &[Point], x_files_factor: f32) -> Aggregated {
        let Some(last) = points.last() else {
            return Aggregated { value: f64::NAN, skip: false };
        };

        if self == Aggregation::Last {
            return Aggregated { value: last.value, skip: false };
        }

        let mut valid = 0u32;
        let mut total = 0f64;
        let mut max = f64::NAN;
        let mut min = f64::NAN;

        for point in points {
            let v = point.value;
            if v.is_nan() {
                continue;
            }
            valid += 1;
            total += v;
            if max.is_nan() || v > max {
                max = v;
            }
            if min.is_nan() || v < min {
                min = v;
            }
        }

        let known = valid as f32 / points.len() as f32;
        if known < x_files_factor {
            return Aggregated { value: f64::NAN, skip: true };
        }

        let value = match self {
            Aggregation::Average => total / f64::from(valid),
            Aggregation::Sum => total,
            Aggregation::Max => max,
            Aggregation::Min => min,
            Aggregation::Last => last.value,
        };

        Aggregated { value, skip: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(values: &[f64]) -> Vec<Point> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Point::new(60 * (i as u32 + 1), v))
            .collect()
    }

    #[test]
    fn wire_values_roundtrip() {
        for value in 1..=5 {
            assert_eq!(Aggregation::from_wire(value).unwrap().to_wire(), value);
        }
        assert!(matches!(
            Aggregation::from_wire(6),
            Err(Error::UnknownAggregation(6))
        ));
        assert!(matches!(
            Aggregation::from_wire(0),
            Err(Error::UnknownAggregation(0))
        ));
    }

    #[test]
    fn average_over_valid_points() {
        let out = Aggregation::Average.apply(&block(&[1.0, 2.0, 3.0, 6.0]), 0.5);
        assert_eq!(out.value, 3.0);
        assert!(!out.skip);
    }

    #[test]
    fn average_ignores_nan_in_divisor() {
        let out = Aggregation::Average.apply(&block(&[2.0, f64::NAN, 4.0, f64::NAN]), 0.5);
        assert_eq!(out.value, 3.0);
        assert!(!out.skip);
    }

    #[test]
    fn sum_of_valid_points() {
        let out = Aggregation::Sum.apply(&block(&[1.0, f64::NAN, 2.5]), 0.5);
        assert_eq!(out.value, 3.5);
        assert!(!out.skip);
    }

    #[test]
    fn max_and_min() {
        let values = block(&[3.0, f64::NAN, -1.0, 7.0]);
        assert_eq!(Aggregation::Max.apply(&values, 0.5).value, 7.0);
        assert_eq!(Aggregation::Min.apply(&values, 0.5).value, -1.0);
    }

    #[test]
    fn min_of_all_negative_points() {
        let out = Aggregation::Min.apply(&block(&[-3.0, -9.0, -1.0]), 0.5);
        assert_eq!(out.value, -9.0);
    }

    #[test]
    fn xff_gates_and_skips() {
        // One valid point out of two is below a 0.9 factor.
        let out = Aggregation::Average.apply(&block(&[1.0, f64::NAN]), 0.9);
        assert!(out.value.is_nan());
        assert!(out.skip);

        let out = Aggregation::Sum.apply(&block(&[1.0, f64::NAN]), 0.9);
        assert!(out.value.is_nan());
        assert!(out.skip);
    }

    #[test]
    fn last_never_skips() {
        let out = Aggregation::Last.apply(&block(&[1.0, f64::NAN, 9.0]), 1.0);
        assert_eq!(out.value, 9.0);
        assert!(!out.skip);

        // Even a NaN tail is reported without a skip.
        let out = Aggregation::Last.apply(&block(&[1.0, f64::NAN]), 1.0);
        assert!(out.value.is_nan());
        assert!(!out.skip);
    }

    #[test]
    fn empty_block_is_nan_without_skip() {
        for aggregation in [
            Aggregation::Average,
            Aggregation::Sum,
            Aggregation::Last,
            Aggregation::Max,
            Aggregation::Min,
        ] {
            let out = aggregation.apply(&[], 0.5);
            assert!(out.value.is_nan());
            assert!(!out.skip);
        }
    }
}
