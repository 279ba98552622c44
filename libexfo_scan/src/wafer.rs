use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::curvature::{StressModel, StressProfile};
use super::error::{ContractViolation, WaferError};
use super::filter::Filter;
use super::load::LoadProfile;
use super::position_key::{round_to, DEFAULT_PRECISION};
use super::profile::PositionProfile;
use super::runs::Direction;
use super::scan::Scan;

/// Grid step (mm) used when resampling scans onto a common axis
pub const RESAMPLE_STEP: f64 = 0.01;

/// The role a scan plays in the wafer, given by the first letter of its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    Base,
    Wafer,
    Nickel,
    Stress,
    Load,
    Exfo,
}

impl ScanKind {
    /// Unknown prefixes are treated as base scans
    pub fn from_prefix(prefix: char) -> Self {
        match prefix {
            'w' => Self::Wafer,
            'n' => Self::Nickel,
            's' => Self::Stress,
            'l' => Self::Load,
            'e' => Self::Exfo,
            _ => Self::Base,
        }
    }

    pub fn from_file_name(path: &Path) -> Self {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.chars().next())
            .map(Self::from_prefix)
            .unwrap_or(Self::Base)
    }

    pub fn prefix(&self) -> char {
        match self {
            Self::Base => 'b',
            Self::Wafer => 'w',
            Self::Nickel => 'n',
            Self::Stress => 's',
            Self::Load => 'l',
            Self::Exfo => 'e',
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Wafer => write!(f, "wafer"),
            Self::Nickel => write!(f, "nickel"),
            Self::Stress => write!(f, "stress"),
            Self::Load => write!(f, "load"),
            Self::Exfo => write!(f, "exfo"),
        }
    }
}

/// Stack-up of the exfoliation tool (mm)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaferGeometry {
    /// Wafer thickness
    pub w: f64,
    /// Wafer offset
    pub wo: f64,
    pub glass: f64,
    pub k: f64,
}

impl Default for WaferGeometry {
    fn default() -> Self {
        Self {
            w: 0.546,
            wo: 0.017,
            glass: 1.8631,
            k: 0.101,
        }
    }
}

impl WaferGeometry {
    /// Height of the tool floor below the base scan
    pub fn tool_offset(&self) -> f64 {
        self.glass + self.w + self.k - self.wo
    }
}

/// Derived wafer quantities along the synchronized position axis
#[derive(Debug, Clone, PartialEq)]
pub struct WaferProfile {
    /// Position axis (mm), taken from the base scan
    pub x: Vec<f64>,
    pub tool_offset: f64,
    /// Nickel film thickness (m)
    pub ni: Vec<f64>,
    /// Exfoliated film thickness (m), when an exfo scan was loaded
    pub ex: Option<Vec<f64>>,
    pub stress: Option<StressProfile>,
    /// The load scan with its position measured from the start of the wafer
    pub load: Option<LoadProfile>,
}

/// The set of scans describing one exfoliation, keyed by their role.
#[derive(Debug, Clone, Default)]
pub struct Wafer {
    pub name: String,
    scans: BTreeMap<ScanKind, Scan>,
    load: Option<LoadProfile>,
    synced: BTreeMap<ScanKind, PositionProfile>,
    profile: Option<WaferProfile>,
}

impl Wafer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Add a scan. A second scan of the same kind replaces the first.
    pub fn insert_scan(&mut self, kind: ScanKind, scan: Scan) {
        if kind == ScanKind::Load {
            log::warn!("Load scans carry a load profile; use set_load instead");
            return;
        }
        if self.scans.insert(kind, scan).is_some() {
            log::warn!("Replaced the {kind} scan of wafer {}", self.name);
        }
    }

    pub fn set_load(&mut self, load: LoadProfile) {
        self.load = Some(load);
    }

    pub fn scan(&self, kind: ScanKind) -> Option<&Scan> {
        self.scans.get(&kind)
    }

    pub fn kinds(&self) -> Vec<ScanKind> {
        self.scans.keys().cloned().collect()
    }

    pub fn synced(&self, kind: ScanKind) -> Option<&PositionProfile> {
        self.synced.get(&kind)
    }

    pub fn profile(&self) -> Option<&WaferProfile> {
        self.profile.as_ref()
    }

    /// Align the mean profiles of every scan on their common position range.
    ///
    /// With `resample` the profiles are first interpolated onto a 0.01 mm grid over
    /// `[low, high)`. Each profile is then sliced from the sample at the largest start
    /// position up to, but excluding, the sample at the smallest end position.
    pub fn sync(
        &mut self,
        direction: Direction,
        resample: Option<(f64, f64)>,
    ) -> Result<(), WaferError> {
        if self.scans.is_empty() {
            return Err(WaferError::NoScans);
        }
        let grid = resample.map(|(low, high)| resample_grid(low, high));

        let mut profiles: BTreeMap<ScanKind, (PositionProfile, Option<u32>)> = BTreeMap::new();
        for (kind, scan) in self.scans.iter() {
            let profile = &scan.direction(direction).profile;
            let profile = match &grid {
                Some(grid) => profile.resample(grid),
                None => profile.clone(),
            };
            if profile.is_empty() {
                return Err(WaferError::NoOverlap);
            }
            let precision = scan.precision.or(Some(DEFAULT_PRECISION));
            profiles.insert(*kind, (profile, precision));
        }

        let trim_min = profiles
            .values()
            .map(|(p, _)| p.position[0])
            .fold(f64::NEG_INFINITY, f64::max);
        let trim_max = profiles
            .values()
            .map(|(p, _)| p.position[p.len() - 1])
            .fold(f64::INFINITY, f64::min);
        if trim_min > trim_max {
            return Err(WaferError::NoOverlap);
        }

        let mut bounds: BTreeMap<ScanKind, (usize, usize)> = BTreeMap::new();
        for (kind, (profile, precision)) in profiles.iter() {
            let start = profile
                .index_of(trim_min, *precision)
                .ok_or_else(|| WaferError::Misaligned(kind.to_string(), trim_min))?;
            let end = profile
                .index_of(trim_max, *precision)
                .ok_or_else(|| WaferError::Misaligned(kind.to_string(), trim_max))?;
            bounds.insert(*kind, (start, end));
        }
        let len = bounds
            .values()
            .map(|(start, end)| end.saturating_sub(*start))
            .min()
            .unwrap_or(0);
        if len == 0 {
            return Err(WaferError::NoOverlap);
        }

        self.synced = profiles
            .into_iter()
            .map(|(kind, (profile, _))| {
                let start = bounds.get(&kind).map(|(s, _)| *s).unwrap_or(0);
                (kind, profile.slice(start, len))
            })
            .collect();
        self.profile = None;
        log::info!(
            "Synchronized {} {direction} scans of wafer {} over [{trim_min}, {trim_max}] with {len} samples",
            self.synced.len(),
            self.name
        );
        Ok(())
    }

    /// Derive the nickel and exfoliated film thickness from the synchronized scans.
    ///
    /// The filter is applied to both thickness arrays.
    pub fn make(
        &mut self,
        geometry: &WaferGeometry,
        filter: &Filter,
    ) -> Result<&WaferProfile, WaferError> {
        let base = self.require_synced(ScanKind::Base)?;
        let nickel = self.require_synced(ScanKind::Nickel)?;
        ContractViolation::check("wafer nickel", base.len(), nickel.len())?;

        let tool_offset = geometry.tool_offset();
        let floor: Vec<f64> = base.mean.iter().map(|b| b - tool_offset).collect();
        let ni: Vec<f64> = nickel
            .mean
            .iter()
            .zip(&floor)
            .map(|(n, f)| (n - f) * 1E-3)
            .collect();

        let ex = match self.synced.get(&ScanKind::Exfo) {
            Some(exfo) => {
                ContractViolation::check("wafer exfo", base.len(), exfo.len())?;
                let ex: Vec<f64> = exfo
                    .mean
                    .iter()
                    .zip(&floor)
                    .map(|(e, f)| (e - f + geometry.wo) * 1E-3)
                    .collect();
                Some(filter.apply_slice(&ex))
            }
            None => None,
        };

        let x = base.position.to_vec();
        let load = match (&self.load, x.first()) {
            (Some(load), Some(origin)) => Some(load.shifted(*origin)),
            _ => None,
        };

        let profile = self.profile.insert(WaferProfile {
            x,
            tool_offset,
            ni: filter.apply_slice(&ni),
            ex,
            stress: None,
            load,
        });
        Ok(profile)
    }

    /// Film stress from the curvature of the synchronized stress scan
    pub fn get_stress(
        &mut self,
        model: &StressModel,
        filter: &Filter,
    ) -> Result<&StressProfile, WaferError> {
        let stress_scan = self.require_synced(ScanKind::Stress)?.clone();
        let profile = self
            .profile
            .as_mut()
            .ok_or(WaferError::NotMade("get_stress"))?;
        let x = stress_scan.position.to_vec();
        let bow = stress_scan.mean.to_vec();
        let stress = model.film_stress(&x, &bow, &profile.ni, filter)?;
        Ok(profile.stress.insert(stress))
    }

    fn require_synced(&self, kind: ScanKind) -> Result<&PositionProfile, WaferError> {
        self.synced
            .get(&kind)
            .ok_or_else(|| WaferError::MissingScan(kind.to_string()))
    }
}

/// Positions from `low` up to but excluding `high` in 0.01 mm steps
pub fn resample_grid(low: f64, high: f64) -> Vec<f64> {
    let n = ((high - low) / RESAMPLE_STEP).ceil().max(0.0) as usize;
    (0..n)
        .map(|idx| round_to(low + idx as f64 * RESAMPLE_STEP, DEFAULT_PRECISION))
        .filter(|x| *x < high)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runs::{RunExclusion, ValidWindow};
    use crate::trace::Trace;
    use std::path::PathBuf;

    fn scan_of(low: f64, high: f64, height: impl Fn(f64) -> f64) -> Scan {
        scan_with_step(low, high, 0.01, height)
    }

    /// A reciprocating scan over [low, high] whose signal is `height(position)`
    fn scan_with_step(low: f64, high: f64, step: f64, height: impl Fn(f64) -> f64) -> Scan {
        let n = ((high - low) / step).round() as usize + 1;
        let leg: Vec<f64> = (0..n).map(|i| round_to(low + i as f64 * step, 2)).collect();
        let mut position = Vec::new();
        for run in 0..4 {
            position.push(10.0);
            if run % 2 == 0 {
                position.extend(leg.iter());
            } else {
                position.extend(leg.iter().rev());
            }
        }
        let time: Vec<f64> = (0..position.len()).map(|i| i as f64).collect();
        let signal: Vec<f64> = position.iter().map(|p| height(*p)).collect();
        let trace = Trace::new(time, position, signal, None).unwrap();
        Scan::build(
            &trace,
            ValidWindow::new(20.0, 80.0).unwrap(),
            RunExclusion::default(),
            &Filter::identity(),
            Some(2),
        )
        .unwrap()
    }

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(ScanKind::from_file_name(&PathBuf::from("/data/n_run1.csv")), ScanKind::Nickel);
        assert_eq!(ScanKind::from_file_name(&PathBuf::from("exfo.csv")), ScanKind::Exfo);
        assert_eq!(ScanKind::from_file_name(&PathBuf::from("x.csv")), ScanKind::Base);
        for kind in [ScanKind::Wafer, ScanKind::Stress, ScanKind::Load] {
            assert_eq!(ScanKind::from_prefix(kind.prefix()), kind);
        }
    }

    #[test]
    fn test_sync_trims_to_overlap() {
        let mut wafer = Wafer::new("w1");
        wafer.insert_scan(ScanKind::Base, scan_of(41.0, 60.0, |_| 5.0));
        wafer.insert_scan(ScanKind::Nickel, scan_of(45.0, 65.0, |_| 3.0));
        wafer.sync(Direction::Forward, None).unwrap();
        let base = wafer.synced(ScanKind::Base).unwrap();
        let nickel = wafer.synced(ScanKind::Nickel).unwrap();
        assert_eq!(base.len(), nickel.len());
        // the last overlapping sample is not included
        assert_eq!(base.len(), 1500);
        assert_eq!(base.position[0], 45.0);
        assert_eq!(base.position, nickel.position);
    }

    #[test]
    fn test_sync_errors() {
        let mut empty = Wafer::new("empty");
        assert_eq!(empty.sync(Direction::Forward, None), Err(WaferError::NoScans));

        let mut apart = Wafer::new("apart");
        apart.insert_scan(ScanKind::Base, scan_of(41.0, 45.0, |_| 5.0));
        apart.insert_scan(ScanKind::Nickel, scan_of(50.0, 55.0, |_| 3.0));
        assert_eq!(apart.sync(Direction::Forward, None), Err(WaferError::NoOverlap));

        let mut coarse = Wafer::new("coarse");
        coarse.insert_scan(ScanKind::Base, scan_with_step(41.0, 50.0, 0.02, |_| 5.0));
        coarse.insert_scan(ScanKind::Nickel, scan_with_step(45.01, 55.01, 0.02, |_| 3.0));
        assert!(matches!(
            coarse.sync(Direction::Forward, None),
            Err(WaferError::Misaligned(_, _))
        ));
    }

    #[test]
    fn test_resampled_sync() {
        let mut wafer = Wafer::new("w2");
        wafer.insert_scan(ScanKind::Base, scan_of(41.0, 60.0, |p| p));
        wafer.insert_scan(ScanKind::Nickel, scan_of(42.0, 61.0, |p| p));
        wafer.sync(Direction::Backward, Some((45.0, 50.0))).unwrap();
        let base = wafer.synced(ScanKind::Base).unwrap();
        assert_eq!(base.len(), 499);
        assert!((base.mean[10] - 45.1).abs() < 1e-9);
    }

    #[test]
    fn test_make_and_stress() {
        let geometry = WaferGeometry::default();
        let offset = geometry.tool_offset();
        let r = 2000.0;
        let mut wafer = Wafer::new("w3");
        wafer.insert_scan(ScanKind::Base, scan_of(41.0, 60.0, |_| 5.0));
        // nickel sits 10 um above the tool floor
        wafer.insert_scan(ScanKind::Nickel, scan_of(41.0, 60.0, move |_| 5.0 - offset + 0.01));
        wafer.insert_scan(ScanKind::Exfo, scan_of(41.0, 60.0, move |_| 5.0 - offset));
        wafer.insert_scan(ScanKind::Stress, scan_of(41.0, 60.0, move |p| (p - 50.0).powi(2) / (2.0 * r)));
        wafer.set_load(LoadProfile {
            time: vec![0.0, 1.0],
            position: vec![50.0, 51.0],
            laser: vec![0.0; 2],
            load: vec![1.0; 2],
        });

        assert_eq!(
            wafer.get_stress(&StressModel::default(), &Filter::identity()).err(),
            Some(WaferError::MissingScan("stress".to_string()))
        );
        wafer.sync(Direction::Forward, None).unwrap();
        assert_eq!(
            wafer.get_stress(&StressModel::default(), &Filter::identity()).err(),
            Some(WaferError::NotMade("get_stress"))
        );
        let not_made = wafer
            .get_stress(&StressModel::default(), &Filter::identity())
            .unwrap_err();
        assert!(not_made.to_string().contains("Wafer::make before get_stress"));

        let profile = wafer.make(&geometry, &Filter::identity()).unwrap();
        assert!(profile.ni.iter().all(|ni| (ni - 10E-6).abs() < 1e-12));
        let ex = profile.ex.as_ref().unwrap();
        assert!(ex.iter().all(|ex| (ex - geometry.wo * 1E-3).abs() < 1e-12));
        assert_eq!(profile.load.as_ref().unwrap().position, vec![9.0, 10.0]);

        let stress = wafer
            .get_stress(&StressModel::default(), &Filter::identity())
            .unwrap();
        assert!(stress.stress.iter().all(|s| *s > 0.0));
        assert!(wafer.profile().unwrap().stress.is_some());
    }

    #[test]
    fn test_make_requires_nickel() {
        let mut wafer = Wafer::new("w4");
        wafer.insert_scan(ScanKind::Base, scan_of(41.0, 60.0, |_| 5.0));
        wafer.sync(Direction::Forward, None).unwrap();
        assert_eq!(
            wafer.make(&WaferGeometry::default(), &Filter::identity()).err(),
            Some(WaferError::MissingScan("nickel".to_string()))
        );
    }
}
