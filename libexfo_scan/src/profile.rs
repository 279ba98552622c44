use ndarray::{Array1, ArrayView2};
use std::collections::BTreeMap;

use super::error::{ContractViolation, ScanError};
use super::position_key::PositionKey;
use super::stats;

/// Every signal sample observed at each (rounded) position, across all passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionBuckets {
    buckets: BTreeMap<PositionKey, Vec<f64>>,
}

impl PositionBuckets {
    /// Bucket a stack of passes.
    ///
    /// Each pass is first collapsed to a position -> signal map, so a position repeated
    /// within one pass contributes only its last sample. Across passes samples accumulate.
    pub fn from_stack(
        positions: ArrayView2<f64>,
        signals: ArrayView2<f64>,
        precision: Option<u32>,
    ) -> Result<Self, ScanError> {
        ContractViolation::check("aggregator rows", positions.nrows(), signals.nrows())?;
        ContractViolation::check("aggregator columns", positions.ncols(), signals.ncols())?;
        let mut buckets: BTreeMap<PositionKey, Vec<f64>> = BTreeMap::new();
        for (pos_row, sig_row) in positions.rows().into_iter().zip(signals.rows()) {
            let mut pass: BTreeMap<PositionKey, f64> = BTreeMap::new();
            for (p, s) in pos_row.iter().zip(sig_row.iter()) {
                pass.insert(PositionKey::new(*p, precision), *s);
            }
            for (key, value) in pass {
                buckets.entry(key).or_default().push(value);
            }
        }
        Ok(Self { buckets })
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, position: f64, precision: Option<u32>) -> Option<&Vec<f64>> {
        self.buckets.get(&PositionKey::new(position, precision))
    }

    /// Mean, std, n and SEM per bucket in ascending position order
    pub fn aggregate(&self) -> PositionProfile {
        let n = self.buckets.len();
        let mut profile = PositionProfile {
            mean: Array1::zeros(n),
            std: Array1::zeros(n),
            n: Array1::zeros(n),
            sem: Array1::zeros(n),
            position: Array1::zeros(n),
        };
        for (idx, (key, values)) in self.buckets.iter().enumerate() {
            let std = stats::std_dev(values);
            let count = values.len() as f64;
            profile.mean[idx] = stats::mean(values);
            profile.std[idx] = std;
            profile.n[idx] = count;
            profile.sem[idx] = std / count.sqrt();
            profile.position[idx] = key.value();
        }
        profile
    }

    /// Mean absolute deviation of each bucket from its own mean. NaN buckets are dropped.
    pub fn error_by_position(&self) -> Vec<f64> {
        self.buckets
            .values()
            .map(|values| {
                let mu = stats::mean(values);
                values.iter().map(|v| (v - mu).abs()).sum::<f64>() / values.len() as f64
            })
            .filter(|v| !v.is_nan())
            .collect()
    }
}

/// The canonical per-position statistics of one direction, sorted by position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionProfile {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
    pub n: Array1<f64>,
    pub sem: Array1<f64>,
    pub position: Array1<f64>,
}

impl PositionProfile {
    /// Build the aggregate directly from a stack
    pub fn from_stack(
        positions: ArrayView2<f64>,
        signals: ArrayView2<f64>,
        precision: Option<u32>,
    ) -> Result<Self, ScanError> {
        Ok(PositionBuckets::from_stack(positions, signals, precision)?.aggregate())
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Position -> mean lookup keyed like the buckets were
    pub fn mean_lookup(&self, precision: Option<u32>) -> BTreeMap<PositionKey, f64> {
        self.position
            .iter()
            .zip(self.mean.iter())
            .map(|(p, m)| (PositionKey::new(*p, precision), *m))
            .collect()
    }

    /// Index of the sample at `position`, by rounded equality
    pub fn index_of(&self, position: f64, precision: Option<u32>) -> Option<usize> {
        let key = PositionKey::new(position, precision);
        self.position
            .iter()
            .position(|p| PositionKey::new(*p, precision) == key)
    }

    /// Linearly resample every statistic onto `grid`
    pub fn resample(&self, grid: &[f64]) -> Self {
        let xp = self.position.to_vec();
        let resample = |data: &Array1<f64>| -> Array1<f64> {
            let fp = data.to_vec();
            grid.iter().map(|x| stats::interp(*x, &xp, &fp)).collect()
        };
        Self {
            mean: resample(&self.mean),
            std: resample(&self.std),
            n: resample(&self.n),
            sem: resample(&self.sem),
            position: Array1::from(grid.to_vec()),
        }
    }

    /// Keep `len` samples starting at `start`
    pub fn slice(&self, start: usize, len: usize) -> Self {
        let end = (start + len).min(self.len());
        let cut = |data: &Array1<f64>| data.slice(ndarray::s![start..end]).to_owned();
        Self {
            mean: cut(&self.mean),
            std: cut(&self.std),
            n: cut(&self.n),
            sem: cut(&self.sem),
            position: cut(&self.position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_constant_signal() {
        let k = 4;
        let positions = Array2::from_shape_fn((k, 10), |(_, j)| 41.0 + j as f64 * 0.01);
        let signals = Array2::from_elem((k, 10), 2.5);
        let profile = PositionProfile::from_stack(positions.view(), signals.view(), Some(2)).unwrap();
        assert_eq!(profile.len(), 10);
        for idx in 0..profile.len() {
            assert_eq!(profile.mean[idx], 2.5);
            assert_eq!(profile.std[idx], 0.0);
            assert_eq!(profile.n[idx], k as f64);
            assert_eq!(profile.sem[idx], 0.0);
        }
    }

    #[test]
    fn test_positions_sorted_and_unique() {
        // backward pass positions run high to low
        let positions = Array2::from_shape_fn((3, 6), |(i, j)| 50.0 - j as f64 * 0.01 - i as f64 * 0.01);
        let signals = Array2::from_shape_fn((3, 6), |(i, j)| (i * 6 + j) as f64);
        let profile = PositionProfile::from_stack(positions.view(), signals.view(), Some(2)).unwrap();
        assert_eq!(profile.len(), 8);
        for pair in profile.position.as_slice().unwrap().windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(profile.n.sum(), 18.0);
    }

    #[test]
    fn test_repeat_within_pass_keeps_last() {
        let positions = Array2::from_shape_vec((1, 3), vec![41.0, 41.0, 41.01]).unwrap();
        let signals = Array2::from_shape_vec((1, 3), vec![1.0, 3.0, 5.0]).unwrap();
        let buckets = PositionBuckets::from_stack(positions.view(), signals.view(), Some(2)).unwrap();
        assert_eq!(buckets.get(41.0, Some(2)), Some(&vec![3.0]));
    }

    #[test]
    fn test_pass_offsets() {
        let k = 5;
        let base = 3.0;
        let positions = Array2::from_shape_fn((k, 8), |(_, j)| 45.0 + j as f64 * 0.01);
        let signals = Array2::from_shape_fn((k, 8), |(i, _)| base + i as f64);
        let buckets = PositionBuckets::from_stack(positions.view(), signals.view(), Some(2)).unwrap();
        let profile = buckets.aggregate();
        let true_mean = (0..k).map(|i| i as f64).sum::<f64>() / k as f64 + base;
        assert!(profile.mean.iter().all(|m| (m - true_mean).abs() < 1e-12));
        // mean |i - 2| over 0..5 is 1.2
        assert!(buckets
            .error_by_position()
            .iter()
            .all(|e| (e - 1.2).abs() < 1e-12));
    }

    #[test]
    fn test_resample_and_slice() {
        let positions = Array2::from_shape_fn((1, 3), |(_, j)| 41.0 + j as f64 * 0.02);
        let signals = Array2::from_shape_fn((1, 3), |(_, j)| j as f64 * 2.0);
        let profile = PositionProfile::from_stack(positions.view(), signals.view(), Some(2)).unwrap();
        let resampled = profile.resample(&[41.0, 41.01, 41.02, 41.03, 41.04]);
        assert!((resampled.mean[1] - 1.0).abs() < 1e-9);
        let cut = resampled.slice(1, 3);
        assert_eq!(cut.len(), 3);
        assert_eq!(cut.index_of(41.03, Some(2)), Some(2));
    }
}
