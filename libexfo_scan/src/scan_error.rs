use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use super::error::{ContractViolation, ScanError};
use super::position_key::PositionKey;
use super::profile::PositionProfile;
use super::stats;

/// Signal is in mm, residuals are reported in um
pub const RESIDUAL_SCALE: f64 = 1000.0;

/// Dispersion of one pass around the aggregate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub std: f64,
    pub mean_abs: f64,
    pub median_abs: f64,
}

/// Residual of every pass against the aggregate mean at the same position
#[derive(Debug, Clone, PartialEq)]
pub struct PassErrors {
    pub residuals: Vec<Vec<f64>>,
    pub summaries: Vec<PassSummary>,
}

impl PassErrors {
    /// Compute `(signal - mean_at_position) * 1000` for every sample of every pass.
    ///
    /// The profile must have been aggregated from this same stack with the same precision.
    pub fn analyze(
        positions: ArrayView2<f64>,
        signals: ArrayView2<f64>,
        profile: &PositionProfile,
        precision: Option<u32>,
    ) -> Result<Self, ScanError> {
        ContractViolation::check("scan error rows", positions.nrows(), signals.nrows())?;
        ContractViolation::check("scan error columns", positions.ncols(), signals.ncols())?;
        let lookup = profile.mean_lookup(precision);

        let mut residuals = Vec::with_capacity(positions.nrows());
        for (pos_row, sig_row) in positions.rows().into_iter().zip(signals.rows()) {
            let mut pass = Vec::with_capacity(pos_row.len());
            for (p, s) in pos_row.iter().zip(sig_row.iter()) {
                let mean = lookup
                    .get(&PositionKey::new(*p, precision))
                    .ok_or(ScanError::MissingPosition(*p))?;
                pass.push((s - mean) * RESIDUAL_SCALE);
            }
            residuals.push(pass);
        }

        let summaries = residuals.iter().map(|pass| summarize(pass)).collect();
        Ok(Self {
            residuals,
            summaries,
        })
    }

    pub fn n_passes(&self) -> usize {
        self.residuals.len()
    }

    /// Passes whose median absolute residual exceeds `limit` (um)
    pub fn flag_passes(&self, limit: f64) -> Vec<usize> {
        self.summaries
            .iter()
            .enumerate()
            .filter(|(_, s)| s.median_abs > limit)
            .map(|(idx, _)| idx)
            .collect()
    }
}

fn summarize(pass: &[f64]) -> PassSummary {
    let abs: Vec<f64> = pass.iter().map(|v| v.abs()).collect();
    PassSummary {
        std: stats::std_dev(pass),
        mean_abs: stats::mean(&abs),
        median_abs: stats::median(&abs),
    }
}
