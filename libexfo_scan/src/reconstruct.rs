//! Integration based recovery of a repeatable component.
//!
//! Two composite measurements share a base signal `x1` and carry the same disturbance
//! observed with a constant phase offset `d`:
//!
//! ```text
//! b1(t) = x1(t) + x2(t)
//! b2(t) = x1(t) + x2(t + d)
//! ```
//!
//! Aligning `b1(t)` with `b2(t - d)` cancels the disturbance and leaves
//! `x1(t - d) - x1(t)`, a finite difference of the base. Integrating it over time and
//! normalizing by the offset recovers the base up to a constant. The integral is taken both
//! forward and backward in time and averaged, which cancels the boundary condition each
//! single direction would impose.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::error::{ContractViolation, ReconstructError};
use super::filter::Filter;
use super::stats;
use super::sync::{synchronize, SyncOptions, SyncedPair};

/// Monte-Carlo style noise injected into both inputs before reconstruction
#[derive(Debug, Clone)]
pub struct NoiseInjection {
    /// Noise standard deviation relative to mean |b1|
    pub level: f64,
    /// Applied to the raw noise and again to each noisy input
    pub filter: Filter,
    pub seed: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    pub sync: SyncOptions,
    pub noise: Option<NoiseInjection>,
}

/// The recovered base signal
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedSignal {
    pub t: Vec<f64>,
    pub signal: Vec<f64>,
    /// The noise added to b1 and b2, when noise injection was requested
    pub noise: Option<(Vec<f64>, Vec<f64>)>,
}

/// Error of a reconstruction against a known base signal
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionError {
    /// x: shared timestamps, y1: base, y2: reconstruction
    pub aligned: SyncedPair,
    /// base - reconstruction
    pub error: Vec<f64>,
    pub mean_abs_error: f64,
}

impl Reconstruction {
    pub fn new(sync: SyncOptions) -> Self {
        Self { sync, noise: None }
    }

    pub fn with_noise(mut self, noise: NoiseInjection) -> Self {
        self.noise = Some(noise);
        self
    }

    /// Recover the shared component of `b1` and `b2` given their phase offset.
    ///
    /// The sign of the result follows the sign of `offset`: a negative offset recovers the
    /// base itself, a positive offset recovers the base inverted.
    pub fn reconstruct(
        &self,
        t: &[f64],
        b1: &[f64],
        b2: &[f64],
        offset: f64,
    ) -> Result<ReconstructedSignal, ReconstructError> {
        if offset == 0.0 || !offset.is_finite() {
            return Err(ReconstructError::DegenerateOffset(offset));
        }
        ContractViolation::check("reconstruction (t vs b1)", t.len(), b1.len())?;
        ContractViolation::check("reconstruction (t vs b2)", t.len(), b2.len())?;

        let mut b1 = b1.to_vec();
        let mut b2 = b2.to_vec();
        let noise = match &self.noise {
            Some(injection) => Some(injection.inject(&mut b1, &mut b2)?),
            None => None,
        };

        let shifted: Vec<f64> = t.iter().map(|ti| ti + offset).collect();
        let aligned = synchronize(t, &b1, &shifted, &b2, &self.sync)?;
        if aligned.len() < 2 {
            return Err(ReconstructError::InsufficientOverlap(aligned.len()));
        }

        let signal = symmetric_integral(&aligned.difference(), &aligned.x, offset.abs());

        // Integration drops the first sample, and the finite difference is centred half an
        // offset away from the sample it is stored at
        let stamps = &aligned.x[1..];
        let recentred: Vec<f64> = stamps.iter().map(|s| s - offset / 2.0).collect();
        let resynced = synchronize(stamps, &signal, &recentred, &signal, &self.sync)?;

        Ok(ReconstructedSignal {
            t: resynced.x,
            signal: resynced.y2,
            noise,
        })
    }

    /// Align a reconstruction with the true base signal and measure the error.
    ///
    /// `edge_fraction` of the aligned samples is ignored at each end when computing the
    /// mean absolute error, where the integration boundaries dominate.
    pub fn compare_to_base(
        &self,
        t: &[f64],
        base: &[f64],
        reconstructed: &ReconstructedSignal,
        edge_fraction: f64,
    ) -> Result<ReconstructionError, ReconstructError> {
        let aligned = synchronize(
            t,
            base,
            &reconstructed.t,
            &reconstructed.signal,
            &self.sync,
        )?;
        let error: Vec<f64> = aligned
            .y1
            .iter()
            .zip(&aligned.y2)
            .map(|(b, r)| b - r)
            .collect();
        let skip = (error.len() as f64 * edge_fraction.clamp(0.0, 0.5)) as usize;
        let interior = &error[skip..(error.len() - skip)];
        if interior.is_empty() {
            return Err(ReconstructError::InsufficientOverlap(aligned.len()));
        }
        let mean_abs_error = stats::mean_abs(interior);
        Ok(ReconstructionError {
            aligned,
            error,
            mean_abs_error,
        })
    }
}

/// Average of the forward and backward cumulative trapezoid integrals, normalized by
/// twice the offset magnitude. One sample shorter than the input.
pub fn symmetric_integral(difference: &[f64], t: &[f64], offset_magnitude: f64) -> Vec<f64> {
    let forward = stats::cumulative_trapezoid(difference, t);
    let reversed_diff: Vec<f64> = difference.iter().rev().cloned().collect();
    let reversed_t: Vec<f64> = t.iter().rev().cloned().collect();
    let mut backward = stats::cumulative_trapezoid(&reversed_diff, &reversed_t);
    backward.reverse();
    forward
        .iter()
        .zip(&backward)
        .map(|(f, b)| (f + b) / 2.0 / offset_magnitude)
        .collect()
}

impl NoiseInjection {
    /// Add filtered Gaussian noise to both inputs and filter them.
    ///
    /// The second noise draw is scaled from the already noisy b1.
    fn inject(
        &self,
        b1: &mut Vec<f64>,
        b2: &mut Vec<f64>,
    ) -> Result<(Vec<f64>, Vec<f64>), ReconstructError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise1 = self.draw(&mut rng, stats::mean_abs(b1), b1.len())?;
        *b1 = self.filter.apply_slice(&add(b1, &noise1)?);
        let noise2 = self.draw(&mut rng, stats::mean_abs(b1), b2.len())?;
        *b2 = self.filter.apply_slice(&add(b2, &noise2)?);
        Ok((noise1, noise2))
    }

    fn draw(&self, rng: &mut StdRng, scale: f64, len: usize) -> Result<Vec<f64>, ReconstructError> {
        let sigma = scale * self.level;
        let normal = Normal::new(0.0, sigma)
            .map_err(|e| ReconstructError::BadNoise(format!("sigma {sigma}: {e}")))?;
        let raw: Vec<f64> = (0..len).map(|_| normal.sample(rng)).collect();
        Ok(self.filter.apply_slice(&raw))
    }
}

fn add(signal: &[f64], noise: &[f64]) -> Result<Vec<f64>, ContractViolation> {
    ContractViolation::check("filtered noise", signal.len(), noise.len())?;
    Ok(signal.iter().zip(noise).map(|(s, n)| s + n).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Triangle wave with unit amplitude
    fn triangle(t: f64) -> f64 {
        let phase = (t / std::f64::consts::TAU).rem_euclid(1.0);
        4.0 * (phase - 0.5).abs() - 1.0
    }

    fn disturbance(t: f64) -> f64 {
        triangle(3.0 * t) + 0.5 * triangle(5.0 * t - 1.0) + (9.0 * t).sin() / 5.0
    }

    /// Samples on an exact 0.01 grid over [0, 2 pi)
    fn fixture(offset: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
        let t: Vec<f64> = (0..629).map(|i| i as f64 / 100.0).collect();
        let base: Vec<f64> = t.iter().map(|v| v.sin()).collect();
        let b1 = t.iter().zip(&base).map(|(v, x)| x + disturbance(*v)).collect();
        let b2 = t
            .iter()
            .zip(&base)
            .map(|(v, x)| x + disturbance(v + offset))
            .collect();
        (t, base, b1, b2)
    }

    #[test]
    fn test_recovers_sine_base() {
        let offset = -0.2;
        let (t, base, b1, b2) = fixture(offset);
        let engine = Reconstruction::default();
        let recovered = engine.reconstruct(&t, &b1, &b2, offset).unwrap();
        assert!(recovered.t.len() > 500);
        assert!(recovered.noise.is_none());
        let report = engine.compare_to_base(&t, &base, &recovered, 0.05).unwrap();
        assert!(!report.aligned.is_empty());
        assert!(report.mean_abs_error < 0.05, "{}", report.mean_abs_error);
    }

    #[test]
    fn test_positive_offset() {
        let offset = 0.15;
        let (t, base, b1, b2) = fixture(offset);
        let engine = Reconstruction::default();
        let recovered = engine.reconstruct(&t, &b1, &b2, offset).unwrap();
        let report = engine.compare_to_base(&t, &base, &recovered, 0.05).unwrap();
        // a positive offset recovers the base with inverted sign
        let inverted: Vec<f64> = report.aligned.y2.iter().map(|v| -v).collect();
        let skip = inverted.len() / 20;
        let mae = report.aligned.y1[skip..inverted.len() - skip]
            .iter()
            .zip(&inverted[skip..inverted.len() - skip])
            .map(|(a, b)| (a - b).abs())
            .sum::<f64>()
            / (inverted.len() - 2 * skip) as f64;
        assert!(mae < 0.05, "{mae}");
    }

    #[test]
    fn test_compare_without_shared_timestamps() {
        let offset = -0.2;
        let (t, base, b1, b2) = fixture(offset);
        let engine = Reconstruction::default();
        let recovered = engine.reconstruct(&t, &b1, &b2, offset).unwrap();
        let late: Vec<f64> = t.iter().map(|v| v + 1000.0).collect();
        let result = engine.compare_to_base(&late, &base, &recovered, 0.05);
        assert!(matches!(
            result,
            Err(ReconstructError::InsufficientOverlap(0))
        ));
        // trimming half of two samples leaves nothing to average
        let short = ReconstructedSignal {
            t: recovered.t[..2].to_vec(),
            signal: recovered.signal[..2].to_vec(),
            noise: None,
        };
        let result = engine.compare_to_base(&t, &base, &short, 0.5);
        assert!(matches!(
            result,
            Err(ReconstructError::InsufficientOverlap(2))
        ));
    }

    #[test]
    fn test_zero_offset_is_degenerate() {
        let (t, _, b1, b2) = fixture(0.0);
        let result = Reconstruction::default().reconstruct(&t, &b1, &b2, 0.0);
        assert!(matches!(result, Err(ReconstructError::DegenerateOffset(_))));
        let result = Reconstruction::default().reconstruct(&t, &b1, &b2, f64::NAN);
        assert!(matches!(result, Err(ReconstructError::DegenerateOffset(_))));
    }

    #[test]
    fn test_offset_beyond_trace_has_no_overlap() {
        let (t, _, b1, b2) = fixture(0.1);
        let result = Reconstruction::default().reconstruct(&t, &b1, &b2, 100.0);
        assert!(matches!(
            result,
            Err(ReconstructError::InsufficientOverlap(0))
        ));
    }

    #[test]
    fn test_noise_is_reproducible() {
        let offset = -0.2;
        let (t, _, b1, b2) = fixture(offset);
        let engine = Reconstruction::default().with_noise(NoiseInjection {
            level: 0.03,
            filter: Filter::moving_average(5),
            seed: 7,
        });
        let first = engine.reconstruct(&t, &b1, &b2, offset).unwrap();
        let second = engine.reconstruct(&t, &b1, &b2, offset).unwrap();
        assert_eq!(first, second);
        let (noise1, noise2) = first.noise.unwrap();
        assert_eq!(noise1.len(), t.len());
        assert_ne!(noise1, noise2);
    }

    #[test]
    fn test_symmetric_integral_of_constant() {
        let t = [0.0, 1.0, 2.0, 3.0];
        let diff = [1.0; 4];
        // forward: 1 2 3, backward: -3 -2 -1, averaged then divided by |d| = 0.5
        assert_eq!(symmetric_integral(&diff, &t, 0.5), vec![-2.0, 0.0, 2.0]);
    }
}
