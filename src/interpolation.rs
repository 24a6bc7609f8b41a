//! Linear interpolation over a recorded time series.
//!
//! During forward filtering the query times are almost always increasing, so
//! the interpolator keeps a cursor at the last matched interval and scans
//! circularly from there instead of searching the whole series. The cursor
//! is an explicit per-caller value passed in and returned: the interpolator
//! itself holds no mutable state, so concurrent sigma-point workers can
//! query the same series each with their own cursor.

use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;
use crate::variables::DataSeries;

/// Scan cursor: index of the last matched interval.
///
/// `Cursor::default()` starts the scan at the beginning of the series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    index: usize,
}

impl Cursor {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Point queries with linear interpolation over one variable's data series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesInterpolator {
    series: DataSeries,
}

impl TimeSeriesInterpolator {
    /// The series itself is validated at construction ([`DataSeries::new`]),
    /// so a degenerate single-sample series can never reach this point.
    pub fn new(series: DataSeries) -> Self {
        TimeSeriesInterpolator { series }
    }

    pub fn series(&self) -> &DataSeries {
        &self.series
    }

    /// Interpolated value at time `t`, plus the updated cursor.
    ///
    /// Fails with [`EstimatorError::OutOfRange`] when `t` lies strictly
    /// outside `[first_time, last_time]`; a query exactly at an endpoint
    /// returns that endpoint's sample. Starting at the cursor, at most N
    /// intervals are probed, wrapping around the series; when no non-wrap
    /// interval brackets `t` the last interval is used.
    pub fn interpolate(&self, t: f64, cursor: Cursor) -> Result<(f64, Cursor), EstimatorError> {
        let time = self.series.time();
        let values = self.series.values();
        let n = time.len();

        if t < time[0] || t > time[n - 1] {
            return Err(EstimatorError::OutOfRange {
                time: t,
                min: time[0],
                max: time[n - 1],
            });
        }

        // Fallback: the last interval, as when the circular scan exhausts
        // all indices without a non-wrap match.
        let mut lo = n - 2;
        let mut hi = n - 1;

        let start = cursor.index.min(n - 1);
        for k in 0..n {
            let i = (start + k) % n;
            if i == n - 1 {
                // The pair (last, first) wraps around; never a valid bracket.
                continue;
            }
            if t >= time[i] && t <= time[i + 1] {
                lo = i;
                hi = i + 1;
                break;
            }
        }

        let span = time[hi] - time[lo];
        // Repeated time stamps give a zero-width bracket; take the newer sample.
        let value = if span <= 0.0 {
            values[hi]
        } else {
            ((t - time[lo]) * values[hi] + (time[hi] - t) * values[lo]) / span
        };

        Ok((value, Cursor { index: lo }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> TimeSeriesInterpolator {
        // value(t) = 2t over [0, 4]
        let series = DataSeries::new(
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            vec![0.0, 2.0, 4.0, 6.0, 8.0],
        )
        .unwrap();
        TimeSeriesInterpolator::new(series)
    }

    #[test]
    fn test_exact_at_every_sample() {
        let interp = ramp();
        let mut cursor = Cursor::default();
        for (&t, &v) in interp
            .series()
            .time()
            .iter()
            .zip(interp.series().values().iter())
        {
            let (value, next) = interp.interpolate(t, cursor).unwrap();
            assert_eq!(value, v);
            cursor = next;
        }
    }

    #[test]
    fn test_midpoint_lies_between_neighbors() {
        let series =
            DataSeries::new(vec![0.0, 1.0, 2.0], vec![1.0, 5.0, 2.0]).unwrap();
        let interp = TimeSeriesInterpolator::new(series);
        let (v, _) = interp.interpolate(1.5, Cursor::default()).unwrap();
        assert!(v > 2.0 && v < 5.0);
        assert!((v - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let interp = ramp();
        assert!(matches!(
            interp.interpolate(-0.1, Cursor::default()),
            Err(EstimatorError::OutOfRange { .. })
        ));
        assert!(matches!(
            interp.interpolate(4.1, Cursor::default()),
            Err(EstimatorError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_endpoints_return_endpoint_samples() {
        let interp = ramp();
        let (first, _) = interp.interpolate(0.0, Cursor::default()).unwrap();
        let (last, _) = interp.interpolate(4.0, Cursor::default()).unwrap();
        assert_eq!(first, 0.0);
        assert_eq!(last, 8.0);
    }

    #[test]
    fn test_cursor_advances_with_monotone_queries() {
        let interp = ramp();
        let (_, c1) = interp.interpolate(0.5, Cursor::default()).unwrap();
        assert_eq!(c1.index(), 0);
        let (_, c2) = interp.interpolate(2.5, c1).unwrap();
        assert_eq!(c2.index(), 2);
        let (_, c3) = interp.interpolate(3.9, c2).unwrap();
        assert_eq!(c3.index(), 3);
    }

    #[test]
    fn test_wraparound_finds_earlier_interval() {
        let interp = ramp();
        let (_, late) = interp.interpolate(3.5, Cursor::default()).unwrap();
        // Query before the cursor position: the circular scan must wrap and
        // still find the right bracket.
        let (v, back) = interp.interpolate(0.5, late).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
        assert_eq!(back.index(), 0);
    }

    #[test]
    fn test_zero_width_bracket_returns_newer_sample() {
        let series =
            DataSeries::new(vec![0.0, 1.0, 1.0, 2.0], vec![0.0, 2.0, 3.0, 4.0]).unwrap();
        let interp = TimeSeriesInterpolator::new(series);
        let (v, cursor) = interp.interpolate(1.0, Cursor::default()).unwrap();
        // First bracket [0, 1] matches; exact linear endpoint.
        assert_eq!(v, 2.0);
        // From the repeated stamp onward the zero-width interval resolves to
        // the newer sample.
        let (v2, _) = interp.interpolate(1.0, Cursor { index: 1 }).unwrap();
        assert_eq!(v2, 3.0);
        let _ = cursor;
    }
}
