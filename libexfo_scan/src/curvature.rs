use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::error::{ContractViolation, CurvatureError};
use super::filter::Filter;

/// Biaxial modulus of the silicon wafer (Pa)
pub const SILICON_BIAXIAL_MODULUS: f64 = 1.803E11;
/// Default wafer thickness (m)
pub const DEFAULT_WAFER_THICKNESS: f64 = 500E-6;
/// Degree of the fit used to extract curvature from the stress scan
const CURVATURE_FIT_DEGREE: usize = 2;
/// Scan positions are in mm, stress is computed in m
const MM_TO_M: f64 = 1E-3;

/// A polynomial fitted on centred and scaled abscissae.
///
/// Internally p(x) = sum c_k u^k with u = (x - shift) / scale. Keeping u in [-1, 1] is what
/// keeps the least squares problem well conditioned for positions like 40-65 mm.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
    shift: f64,
    scale: f64,
}

impl Polynomial {
    /// Least squares fit of the given degree, solved through the SVD of the Vandermonde matrix
    pub fn fit(x: &[f64], y: &[f64], degree: usize) -> Result<Self, CurvatureError> {
        ContractViolation::check("polynomial fit (x vs y)", x.len(), y.len())?;
        let n_coeff = degree + 1;
        if x.len() < n_coeff {
            return Err(CurvatureError::TooFewSamples {
                degree,
                needed: n_coeff,
                found: x.len(),
            });
        }

        let min = x.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let shift = (max + min) / 2.0;
        let scale = if max > min { (max - min) / 2.0 } else { 1.0 };

        // Vandermonde matrix in u
        let m = x.len();
        let vandermonde =
            DMatrix::from_fn(m, n_coeff, |i, k| ((x[i] - shift) / scale).powi(k as i32));
        let b = DVector::from_column_slice(y);

        let svd = vandermonde.svd(true, true);
        let tolerance = svd.singular_values.max() * f64::EPSILON * m as f64;
        if svd.rank(tolerance) < n_coeff {
            return Err(CurvatureError::Singular);
        }
        let coefficients: Vec<f64> = svd
            .solve(&b, tolerance)
            .map_err(|_| CurvatureError::Singular)?
            .iter()
            .copied()
            .collect();

        Ok(Self {
            coefficients,
            shift,
            scale,
        })
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let u = (x - self.shift) / self.scale;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * u + c)
    }

    /// The derivative with respect to x
    pub fn derivative(&self) -> Self {
        let coefficients = if self.coefficients.len() <= 1 {
            vec![0.0]
        } else {
            self.coefficients
                .iter()
                .enumerate()
                .skip(1)
                .map(|(k, c)| k as f64 * c / self.scale)
                .collect()
        };
        Self {
            coefficients,
            shift: self.shift,
            scale: self.scale,
        }
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }
}

/// Radius of curvature |(1 + y'^2)^1.5 / y''| of a degree 2 fit, in the units of the input
pub fn radius_of_curvature(x: &[f64], y: &[f64]) -> Result<Vec<f64>, CurvatureError> {
    let poly = Polynomial::fit(x, y, CURVATURE_FIT_DEGREE)?;
    let first = poly.derivative();
    let second = first.derivative();
    Ok(x.iter()
        .map(|xi| {
            let slope = first.evaluate(*xi);
            ((1.0 + slope.powi(2)).powf(1.5) / second.evaluate(*xi)).abs()
        })
        .collect())
}

/// Stoney-type film stress from wafer bow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StressModel {
    pub silicon_modulus: f64,
    pub wafer_thickness: f64,
}

impl Default for StressModel {
    fn default() -> Self {
        Self {
            silicon_modulus: SILICON_BIAXIAL_MODULUS,
            wafer_thickness: DEFAULT_WAFER_THICKNESS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StressProfile {
    /// Radius of curvature (m)
    pub radius: Vec<f64>,
    /// Film stress (Pa)
    pub stress: Vec<f64>,
}

impl StressModel {
    /// Compute the film stress along the scan.
    ///
    /// `x` and `stress_scan` are the synchronized stress scan in mm, `nickel` is the nickel
    /// film thickness in m. Only the ring term M t^2 / (6 ni R) is accumulated.
    pub fn film_stress(
        &self,
        x: &[f64],
        stress_scan: &[f64],
        nickel: &[f64],
        filter: &Filter,
    ) -> Result<StressProfile, CurvatureError> {
        ContractViolation::check("film stress (x vs nickel)", x.len(), nickel.len())?;
        let radius: Vec<f64> = radius_of_curvature(x, stress_scan)?
            .into_iter()
            .map(|r| r * MM_TO_M)
            .collect();
        let nickel = filter.apply_slice(nickel);
        ContractViolation::check("film stress (filtered nickel)", x.len(), nickel.len())?;
        let stress = nickel
            .iter()
            .zip(&radius)
            .map(|(ni, r)| self.silicon_modulus * self.wafer_thickness.powi(2) / (6.0 * ni * r))
            .collect();
        Ok(StressProfile { radius, stress })
    }
}
