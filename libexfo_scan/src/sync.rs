use std::collections::BTreeMap;

use super::error::{ContractViolation, SyncError};
use super::position_key::{PositionKey, DEFAULT_PRECISION};
use super::stats;

/// Controls what counts as "the same" x coordinate across two series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOptions {
    /// Decimals x is rounded to before matching. None matches raw values.
    pub precision: Option<u32>,
    /// Subtract each series' own mean from its y values before matching
    pub demean: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            precision: Some(DEFAULT_PRECISION),
            demean: false,
        }
    }
}

impl SyncOptions {
    pub fn demeaned(mut self) -> Self {
        self.demean = true;
        self
    }
}

/// Two series restricted to their common x coordinates, sorted ascending.
///
/// An empty pair is a valid result meaning the series share no coordinate; callers must
/// check `is_empty` before computing statistics on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncedPair {
    pub x: Vec<f64>,
    pub y1: Vec<f64>,
    pub y2: Vec<f64>,
}

impl SyncedPair {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// y2 - y1 at every shared coordinate
    pub fn difference(&self) -> Vec<f64> {
        self.y1.iter().zip(&self.y2).map(|(a, b)| b - a).collect()
    }
}

/// Build the x -> y map of one series. Duplicate x values keep the last y.
fn keyed_series(
    x: &[f64],
    y: &[f64],
    options: &SyncOptions,
) -> Result<BTreeMap<PositionKey, f64>, SyncError> {
    ContractViolation::check("synchronizer series (x vs y)", x.len(), y.len())?;
    let offset = if options.demean && !y.is_empty() {
        stats::mean(y)
    } else {
        0.0
    };
    Ok(x.iter()
        .zip(y)
        .map(|(xi, yi)| (PositionKey::new(*xi, options.precision), yi - offset))
        .collect())
}

/// Align two (x, y) series on the intersection of their rounded x coordinates
pub fn synchronize(
    x1: &[f64],
    y1: &[f64],
    x2: &[f64],
    y2: &[f64],
    options: &SyncOptions,
) -> Result<SyncedPair, SyncError> {
    let first = keyed_series(x1, y1, options)?;
    let second = keyed_series(x2, y2, options)?;

    let mut pair = SyncedPair::default();
    for (key, value) in first.iter() {
        if let Some(other) = second.get(key) {
            pair.x.push(key.value());
            pair.y1.push(*value);
            pair.y2.push(*other);
        }
    }
    Ok(pair)
}
