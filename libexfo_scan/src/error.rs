use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

/// Raised whenever two arrays which must be paired do not agree
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Contract violation in {what}: expected length {expected}, found {actual}")]
pub struct ContractViolation {
    pub what: &'static str,
    pub expected: usize,
    pub actual: usize,
}

impl ContractViolation {
    pub fn new(what: &'static str, expected: usize, actual: usize) -> Self {
        Self {
            what,
            expected,
            actual,
        }
    }

    /// Ok if the lengths match, otherwise a ContractViolation
    pub fn check(what: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::new(what, expected, actual))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    #[error("Trace channels have mismatched lengths: {0}")]
    Contract(#[from] ContractViolation),
    #[error("Trace time is not monotonically non-decreasing at sample {0}")]
    TimeNotMonotonic(usize),
    #[error("Trace contains no samples")]
    Empty,
    #[error("Invalid valid window [{0}, {1}]; expected 0 < low < high")]
    BadWindow(f64, f64),
    #[error("Invalid encoder settings: {0}")]
    BadEncoder(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScanError {
    #[error("Invalid trace, no valid travel detected: {0}")]
    InvalidTrace(String),
    #[error("Scan failed due to contract violation: {0}")]
    Contract(#[from] ContractViolation),
    #[error("Scan failed due to trace error: {0}")]
    TraceError(#[from] TraceError),
    #[error("Position {0} has no entry in the aggregate profile")]
    MissingPosition(f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("Synchronizer failed due to contract violation: {0}")]
    Contract(#[from] ContractViolation),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconstructError {
    #[error("Degenerate phase offset {0}; the offset magnitude must be non-zero and finite")]
    DegenerateOffset(f64),
    #[error("Too few aligned samples to reconstruct or compare against: {0}")]
    InsufficientOverlap(usize),
    #[error("Reconstruction failed due to contract violation: {0}")]
    Contract(#[from] ContractViolation),
    #[error("Reconstruction failed due to synchronizer error: {0}")]
    SyncError(#[from] SyncError),
    #[error("Invalid noise configuration: {0}")]
    BadNoise(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurvatureError {
    #[error("Polynomial fit of degree {degree} requires at least {needed} samples, found {found}")]
    TooFewSamples {
        degree: usize,
        needed: usize,
        found: usize,
    },
    #[error("Polynomial fit is singular; abscissae are degenerate")]
    Singular,
    #[error("Curvature failed due to contract violation: {0}")]
    Contract(#[from] ContractViolation),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WaferError {
    #[error("Wafer has no {0} scan loaded")]
    MissingScan(String),
    #[error("Wafer has no scans to synchronize")]
    NoScans,
    #[error("Scan {0} does not contain the overlap bound {1}")]
    Misaligned(String, f64),
    #[error("Scans share no common position range")]
    NoOverlap,
    #[error("Wafer failed due to contract violation: {0}")]
    Contract(#[from] ContractViolation),
    #[error("Wafer failed due to curvature error: {0}")]
    CurvatureError(#[from] CurvatureError),
    #[error("Wafer has not been made; run Wafer::make before {0}")]
    NotMade(&'static str),
    #[error("Wafer stress has not been computed; run get_stress first")]
    NoStress,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Metamodel prediction failed: {0}")]
    Metamodel(String),
    #[error("Load planning failed due to contract violation: {0}")]
    Contract(#[from] ContractViolation),
    #[error("Load planning failed due to wafer error: {0}")]
    WaferError(#[from] WaferError),
    #[error("Load export requires at least one load sample")]
    Empty,
    #[error("Load trace contains no samples inside the valid window")]
    NoSamplesInWindow,
    #[error("Trace has no load channel")]
    MissingChannel,
    #[error("Load failed due to trace error: {0}")]
    TraceError(#[from] TraceError),
}

#[derive(Debug, Error)]
pub enum TraceFileError {
    #[error("Could not open trace file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Trace file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Trace file failed to parse a number: {0}")]
    ParsingError(#[from] std::num::ParseFloatError),
    #[error("Trace file line {0} has the incorrect format; expected 3 or 4 columns")]
    BadFileFormat(usize),
    #[error("Trace file failed due to trace error: {0}")]
    TraceError(#[from] TraceError),
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Writer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Writer failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Output directory {0:?} does not exist")]
    BadFilePath(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config failed due to trace error: {0}")]
    TraceError(#[from] TraceError),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to TraceFile error: {0}")]
    TraceFileError(#[from] TraceFileError),
    #[error("Processor failed due to Trace error: {0}")]
    TraceError(#[from] TraceError),
    #[error("Processor failed due to Scan error: {0}")]
    ScanError(#[from] ScanError),
    #[error("Processor failed due to Writer error: {0}")]
    WriterError(#[from] WriterError),
    #[error("Processor failed due to Load error: {0}")]
    LoadError(#[from] LoadError),
    #[error("Processor failed due to Wafer error: {0}")]
    WaferError(#[from] WaferError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}
