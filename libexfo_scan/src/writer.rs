use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::WriterError;
use super::profile::PositionProfile;
use super::runs::{Direction, Run};
use super::scan::{DirectionScan, Scan};
use super::scan_error::PassSummary;
use super::stats;
use super::wafer::WaferProfile;

/// Per direction part of a scan summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionSummary {
    pub n_passes: usize,
    pub pass_length: usize,
    pub n_positions: usize,
    pub position_min: f64,
    pub position_max: f64,
    /// Mean of the error by position (mm)
    pub mean_position_error: f64,
    /// 95th percentile of the error by position (mm)
    pub p95_position_error: f64,
    pub passes: Vec<PassSummary>,
    /// Passes above the configured error limit
    pub flagged_passes: Vec<usize>,
}

impl DirectionSummary {
    fn new(scan: &DirectionScan, error_limit: Option<f64>) -> Self {
        let profile = &scan.profile;
        Self {
            n_passes: scan.stack.n_passes(),
            pass_length: scan.stack.pass_length(),
            n_positions: profile.len(),
            position_min: profile.position.first().copied().unwrap_or(f64::NAN),
            position_max: profile.position.last().copied().unwrap_or(f64::NAN),
            mean_position_error: stats::mean(&scan.error_by_position),
            p95_position_error: stats::percentile(&scan.error_by_position, 95.0),
            passes: scan.errors.summaries.clone(),
            flagged_passes: error_limit
                .map(|limit| scan.errors.flag_passes(limit))
                .unwrap_or_default(),
        }
    }
}

/// Summary of one processed trace, written next to the profiles as YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub name: String,
    pub n_runs: usize,
    pub runs: Vec<Run>,
    pub precision: Option<u32>,
    pub forward: DirectionSummary,
    pub backward: DirectionSummary,
}

impl ScanSummary {
    pub fn new(name: &str, scan: &Scan, error_limit: Option<f64>) -> Self {
        Self {
            name: name.to_string(),
            n_runs: scan.runs.len(),
            runs: scan.runs.clone(),
            precision: scan.precision,
            forward: DirectionSummary::new(&scan.forward, error_limit),
            backward: DirectionSummary::new(&scan.backward, error_limit),
        }
    }
}

/// Writes results for a named trace (or wafer) into an output directory.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    directory: PathBuf,
    name: String,
}

impl ResultWriter {
    pub fn new(directory: &Path, name: &str) -> Result<Self, WriterError> {
        if !directory.is_dir() {
            return Err(WriterError::BadFilePath(directory.to_path_buf()));
        }
        Ok(Self {
            directory: directory.to_path_buf(),
            name: name.to_string(),
        })
    }

    pub fn path_for(&self, suffix: &str) -> PathBuf {
        self.directory.join(format!("{}{suffix}", self.name))
    }

    /// Write both profiles, the per-pass errors and the YAML summary.
    ///
    /// Returns the paths written.
    pub fn write_scan(
        &self,
        scan: &Scan,
        error_limit: Option<f64>,
    ) -> Result<Vec<PathBuf>, WriterError> {
        let mut written = Vec::new();
        for direction in Direction::both() {
            let path = self.path_for(&format!("_{direction}_profile.csv"));
            write_profile(&path, &scan.direction(direction).profile)?;
            written.push(path);
        }

        let path = self.path_for("_pass_errors.csv");
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "direction,pass,std,mean_abs,median_abs")?;
        for direction in Direction::both() {
            for (idx, summary) in scan.direction(direction).errors.summaries.iter().enumerate() {
                writeln!(
                    writer,
                    "{direction},{idx},{},{},{}",
                    summary.std, summary.mean_abs, summary.median_abs
                )?;
            }
        }
        writer.flush()?;
        written.push(path);

        let path = self.path_for(".yml");
        let summary = ScanSummary::new(&self.name, scan, error_limit);
        std::fs::write(&path, serde_yaml::to_string(&summary)?)?;
        written.push(path);

        log::info!("Wrote {} result files for {}", written.len(), self.name);
        Ok(written)
    }

    /// Write the derived wafer arrays. Missing quantities are written as NaN.
    pub fn write_wafer(&self, wafer: &WaferProfile) -> Result<PathBuf, WriterError> {
        let path = self.path_for("_wafer.csv");
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "position,ni,ex,radius,stress")?;
        for (idx, (x, ni)) in wafer.x.iter().zip(&wafer.ni).enumerate() {
            let ex = wafer
                .ex
                .as_ref()
                .and_then(|ex| ex.get(idx))
                .copied()
                .unwrap_or(f64::NAN);
            let (radius, stress) = wafer
                .stress
                .as_ref()
                .and_then(|s| Some((*s.radius.get(idx)?, *s.stress.get(idx)?)))
                .unwrap_or((f64::NAN, f64::NAN));
            writeln!(writer, "{x},{ni},{ex},{radius},{stress}")?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Write an exported load program, one value per line
    pub fn write_load(&self, load: &[f64]) -> Result<PathBuf, WriterError> {
        let path = self.path_for("_load.csv");
        let mut writer = BufWriter::new(File::create(&path)?);
        for value in load {
            writeln!(writer, "{value}")?;
        }
        writer.flush()?;
        Ok(path)
    }
}

fn write_profile(path: &Path, profile: &PositionProfile) -> Result<(), WriterError> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "position,mean,std,n,sem")?;
    for idx in 0..profile.len() {
        writeln!(
            writer,
            "{},{},{},{},{}",
            profile.position[idx], profile.mean[idx], profile.std[idx], profile.n[idx], profile.sem[idx]
        )?;
    }
    writer.flush()?;
    Ok(())
}
