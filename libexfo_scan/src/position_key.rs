use std::cmp::Ordering;

/// Default number of decimals used to decide if two positions are "the same" position.
///
/// The encoder resolves 10 um, so two decimals (in mm) is the native resolution.
pub const DEFAULT_PRECISION: u32 = 2;

/// A rounded position usable as an ordered map key.
///
/// Positions are rounded to a fixed number of decimals and then totally ordered, so that
/// buckets are formed by equality of the rounded value and iterate in ascending order.
#[derive(Debug, Clone, Copy)]
pub struct PositionKey(f64);

impl PositionKey {
    /// Round `value` to `precision` decimals. `None` keeps the raw value.
    pub fn new(value: f64, precision: Option<u32>) -> Self {
        let rounded = match precision {
            Some(p) => round_to(value, p),
            None => value,
        };
        // -0.0 and 0.0 must land in the same bucket
        Self(rounded + 0.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for PositionKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PositionKey {}

impl PartialOrd for PositionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PositionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Round to a number of decimals, ties to even
pub fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round_ties_even() / scale
}
