use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::error::{ContractViolation, LoadError, WaferError};
use super::filter::Filter;
use super::runs::ValidWindow;
use super::stats;
use super::trace::{EncoderSettings, RawTrace};
use super::wafer::WaferProfile;

/// Distance from the laser spot to the roller contact line (mm)
pub const LASER_TO_ROLLER: f64 = 32.6;
/// Load is exported in kg
pub const GRAVITY: f64 = 9.81;
pub const DEFAULT_WAFER_POINTS: usize = 3000;
/// Number of columns in a metamodel feature row
pub const N_FEATURES: usize = 7;

/// Travel window of a load scan, wider than the measurement window
pub fn default_load_window() -> ValidWindow {
    ValidWindow {
        low: 26.0,
        high: 74.0,
    }
}

/// A regression model mapping wafer state and process targets to a load.
///
/// Each feature row is `[ni (um), ex (um), stress (MPa), a (um), h (um), k2, k1]`. The
/// returned predictions must already be in physical units.
pub trait Metamodel {
    fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, LoadError>;
}

/// Process targets held constant along the wafer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadTarget {
    /// Exfoliated film thickness (um)
    pub ex: f64,
    /// Crack length (um)
    pub a: f64,
    /// Roller height (um)
    pub h: f64,
    /// Mode II stress intensity (MPa mm^0.5)
    pub k2: f64,
    /// Mode I stress intensity (MPa mm^0.5)
    pub k1: f64,
}

impl Default for LoadTarget {
    fn default() -> Self {
        Self {
            ex: 8.0,
            a: 1500.0,
            h: 150.0,
            k2: 0.0,
            k1: 730.0,
        }
    }
}

/// The load channel of a load scan, restricted to in-window samples.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProfile {
    pub time: Vec<f64>,
    /// Roller position (mm)
    pub position: Vec<f64>,
    pub laser: Vec<f64>,
    pub load: Vec<f64>,
}

impl LoadProfile {
    /// Build the profile from raw channels.
    ///
    /// Samples whose encoder reading lies outside `window` are dropped first. The kept
    /// encoder counts are then median filtered, converted to mm and moved from the laser
    /// to the roller. The filter is applied to the kept laser samples.
    pub fn from_trace(
        raw: &RawTrace,
        window: &ValidWindow,
        settings: &EncoderSettings,
        filter: &Filter,
    ) -> Result<Self, LoadError> {
        let load = raw.load.as_ref().ok_or(LoadError::MissingChannel)?;
        ContractViolation::check("load trace encoder", raw.len(), raw.encoder.len())?;
        ContractViolation::check("load trace laser", raw.len(), raw.laser.len())?;
        ContractViolation::check("load trace load", raw.len(), load.len())?;
        window.validate()?;
        settings.validate()?;

        let kept: Vec<usize> = raw
            .encoder
            .iter()
            .enumerate()
            .filter(|(_, counts)| window.contains(**counts / settings.counts_per_mm))
            .map(|(idx, _)| idx)
            .collect();
        if kept.is_empty() {
            return Err(LoadError::NoSamplesInWindow);
        }
        let pick = |channel: &[f64]| -> Vec<f64> { kept.iter().map(|idx| channel[*idx]).collect() };

        let position = settings
            .counts_to_mm(&pick(&raw.encoder))?
            .into_iter()
            .map(|p| p - LASER_TO_ROLLER)
            .collect();
        Ok(Self {
            time: pick(&raw.time),
            position,
            laser: filter.apply_slice(&pick(&raw.laser)),
            load: pick(load),
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Copy of the profile with positions measured from `origin`
    pub fn shifted(&self, origin: f64) -> Self {
        Self {
            position: self.position.iter().map(|p| p - origin).collect(),
            ..self.clone()
        }
    }
}

/// Assemble the metamodel features from the wafer thickness and stress.
///
/// `ni` is in m and `stress` in Pa; they are converted to um and MPa.
pub fn feature_matrix(
    ni: &[f64],
    stress: &[f64],
    target: &LoadTarget,
) -> Result<Array2<f64>, LoadError> {
    ContractViolation::check("load features (ni vs stress)", ni.len(), stress.len())?;
    let mut features = Array2::<f64>::zeros((ni.len(), N_FEATURES));
    for (mut row, (n, s)) in features.rows_mut().into_iter().zip(ni.iter().zip(stress)) {
        row[0] = n * 1E6;
        row[1] = target.ex;
        row[2] = s * 1E-6;
        row[3] = target.a;
        row[4] = target.h;
        row[5] = target.k2;
        row[6] = target.k1;
    }
    Ok(features)
}

/// Predict the compensating load along the wafer.
///
/// The wafer must have been made and its stress computed. Predictions below `floor` are
/// raised to it.
pub fn make_load(
    wafer: &WaferProfile,
    target: &LoadTarget,
    model: &dyn Metamodel,
    filter: &Filter,
    floor: Option<f64>,
) -> Result<Vec<f64>, LoadError> {
    let stress = wafer.stress.as_ref().ok_or(WaferError::NoStress)?;
    let ni = filter.apply_slice(&wafer.ni);
    let features = feature_matrix(&ni, &stress.stress, target)?;
    let prediction = model.predict(features.view())?;
    ContractViolation::check("metamodel prediction", features.nrows(), prediction.len())?;
    Ok(prediction
        .iter()
        .map(|load| match floor {
            Some(f) if *load < f => f,
            _ => *load,
        })
        .collect())
}

/// Shape of an exported load program
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Number of samples the load is interpolated onto
    pub wafer_points: usize,
    /// Total length after padding both ends with the edge values
    pub window: Option<usize>,
    /// Number of samples in a linear ramp from zero to the first load
    pub ramp: Option<usize>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            wafer_points: DEFAULT_WAFER_POINTS,
            window: None,
            ramp: None,
        }
    }
}

/// Resample a load (N) onto the export grid and convert it to kg
pub fn export_load(load: &[f64], options: &ExportOptions) -> Result<Vec<f64>, LoadError> {
    if load.is_empty() || options.wafer_points == 0 {
        return Err(LoadError::Empty);
    }
    let xp: Vec<f64> = (0..load.len()).map(|idx| idx as f64).collect();
    let last = (load.len() - 1) as f64;
    let points = options.wafer_points;
    let mut exported: Vec<f64> = (0..points)
        .map(|idx| {
            let x = if points > 1 {
                last * idx as f64 / (points - 1) as f64
            } else {
                0.0
            };
            stats::interp(x, &xp, load) / GRAVITY
        })
        .collect();

    let first = exported[0];
    if let Some(window) = options.window {
        let pad = window.saturating_sub(points) / 2;
        let end = exported[exported.len() - 1];
        let mut padded = vec![first; pad];
        padded.append(&mut exported);
        padded.extend(std::iter::repeat(end).take(pad));
        exported = padded;
    }
    if let Some(ramp) = options.ramp {
        let mut ramped: Vec<f64> = (0..ramp)
            .map(|idx| {
                if ramp > 1 {
                    first * idx as f64 / (ramp - 1) as f64
                } else {
                    0.0
                }
            })
            .collect();
        ramped.append(&mut exported);
        exported = ramped;
    }
    Ok(exported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curvature::StressProfile;

    /// load = ni (um) + stress (MPa)
    struct SumModel;

    impl Metamodel for SumModel {
        fn predict(&self, features: ArrayView2<f64>) -> Result<Array1<f64>, LoadError> {
            Ok(features.rows().into_iter().map(|r| r[0] + r[2]).collect())
        }
    }

    struct BrokenModel;

    impl Metamodel for BrokenModel {
        fn predict(&self, _: ArrayView2<f64>) -> Result<Array1<f64>, LoadError> {
            Ok(Array1::zeros(1))
        }
    }

    fn wafer() -> WaferProfile {
        WaferProfile {
            x: vec![41.0, 41.01, 41.02],
            tool_offset: 2.0,
            ni: vec![10E-6, 12E-6, 14E-6],
            ex: None,
            stress: Some(StressProfile {
                radius: vec![1.0; 3],
                stress: vec![100E6, 200E6, 300E6],
            }),
            load: None,
        }
    }

    #[test]
    fn test_feature_row_layout() {
        let features = feature_matrix(&[10E-6], &[50E6], &LoadTarget::default()).unwrap();
        let row: Vec<f64> = features.row(0).to_vec();
        assert!((row[0] - 10.0).abs() < 1e-9);
        assert!((row[2] - 50.0).abs() < 1e-9);
        assert_eq!(row[1..2], [8.0]);
        assert_eq!(row[3..], [1500.0, 150.0, 0.0, 730.0]);
    }

    #[test]
    fn test_make_load_with_floor() {
        let load = make_load(&wafer(), &LoadTarget::default(), &SumModel, &Filter::identity(), None)
            .unwrap();
        assert!((load[0] - 110.0).abs() < 1e-9);
        assert!((load[2] - 314.0).abs() < 1e-9);
        let floored = make_load(
            &wafer(),
            &LoadTarget::default(),
            &SumModel,
            &Filter::identity(),
            Some(200.0),
        )
        .unwrap();
        assert_eq!(floored[0], 200.0);
        assert!((floored[1] - 212.0).abs() < 1e-9);
    }

    #[test]
    fn test_make_load_requires_stress_and_matching_model() {
        let mut unstressed = wafer();
        unstressed.stress = None;
        let result = make_load(&unstressed, &LoadTarget::default(), &SumModel, &Filter::identity(), None);
        assert!(matches!(
            result,
            Err(LoadError::WaferError(WaferError::NoStress))
        ));
        let result = make_load(&wafer(), &LoadTarget::default(), &BrokenModel, &Filter::identity(), None);
        assert!(matches!(result, Err(LoadError::Contract(_))));
    }

    #[test]
    fn test_export_interpolates_and_pads() {
        let load = [0.0, 9.81, 19.62];
        let plain = export_load(
            &load,
            &ExportOptions {
                wafer_points: 5,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(plain.len(), 5);
        assert!((plain[1] - 0.5).abs() < 1e-9);
        assert!((plain[4] - 2.0).abs() < 1e-9);

        let shaped = export_load(
            &[9.81, 19.62],
            &ExportOptions {
                wafer_points: 3,
                window: Some(7),
                ramp: Some(3),
            },
        )
        .unwrap();
        let expected = [0.0, 0.5, 1.0, 1.0, 1.0, 1.0, 1.5, 2.0, 2.0, 2.0];
        assert_eq!(shaped.len(), expected.len());
        for (got, want) in shaped.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
        assert!(matches!(
            export_load(&[], &ExportOptions::default()),
            Err(LoadError::Empty)
        ));
    }

    #[test]
    fn test_profile_from_trace() {
        let n = 100;
        let raw = RawTrace {
            time: (0..n).map(|i| i as f64).collect(),
            encoder: (0..n).map(|i| 2000.0 + i as f64 * 100.0).collect(),
            laser: vec![1.0; n],
            load: Some((0..n).map(|i| i as f64).collect()),
        };
        let settings = EncoderSettings {
            median_kernel: 1,
            ..Default::default()
        };
        let profile =
            LoadProfile::from_trace(&raw, &default_load_window(), &settings, &Filter::identity())
                .unwrap();
        // 26 mm..=74 mm are samples 6..=54
        assert_eq!(profile.len(), 49);
        assert_eq!(profile.load[0], 6.0);
        assert!((profile.position[0] - (26.0 - LASER_TO_ROLLER)).abs() < 1e-9);
        let shifted = profile.shifted(profile.position[0]);
        assert_eq!(shifted.position[0], 0.0);

        let no_load = RawTrace {
            load: None,
            ..raw.clone()
        };
        assert!(matches!(
            LoadProfile::from_trace(&no_load, &default_load_window(), &settings, &Filter::identity()),
            Err(LoadError::MissingChannel)
        ));
    }
}
