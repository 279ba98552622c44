use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::curvature::StressModel;
use super::error::ConfigError;
use super::filter::FilterSpec;
use super::load::default_load_window;
use super::position_key::DEFAULT_PRECISION;
use super::runs::{Direction, RunExclusion, ValidWindow};
use super::trace::EncoderSettings;
use super::wafer::WaferGeometry;

/// Extension of the trace files picked up from the trace directory
pub const TRACE_EXTENSION: &str = "csv";

/// Settings for assembling the traces of a directory into a wafer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaferConfig {
    pub name: String,
    pub direction: Direction,
    /// Resample every profile onto a 0.01 mm grid over [low, high) before syncing
    pub resample: Option<(f64, f64)>,
    pub geometry: WaferGeometry,
    pub stress: StressModel,
    /// Applied to the film thickness arrays
    pub thickness_filter: FilterSpec,
    pub load_window: ValidWindow,
}

impl Default for WaferConfig {
    fn default() -> Self {
        Self {
            name: String::from("wafer"),
            direction: Direction::Forward,
            resample: None,
            geometry: WaferGeometry::default(),
            stress: StressModel::default(),
            thickness_filter: FilterSpec::Identity,
            load_window: default_load_window(),
        }
    }
}

/// Structure representing the application configuration. Contains pathing and scan information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory containing the trace files
    pub trace_path: PathBuf,
    /// Directory the results are written to
    pub output_path: PathBuf,
    pub window: ValidWindow,
    pub exclusion: RunExclusion,
    pub encoder: EncoderSettings,
    /// Applied to every pass before stacking
    pub filter: FilterSpec,
    /// Decimals used to bucket positions, null for raw positions
    pub precision: Option<u32>,
    /// Passes with a median absolute residual above this many um are reported
    pub error_limit: Option<f64>,
    pub wafer: Option<WaferConfig>,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            trace_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            window: ValidWindow::default(),
            exclusion: RunExclusion::default(),
            encoder: EncoderSettings::default(),
            filter: FilterSpec::Identity,
            precision: Some(DEFAULT_PRECISION),
            error_limit: None,
            wafer: None,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;
        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.window.validate()?;
        Ok(config)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// All trace files in the trace directory, sorted by name
    pub fn get_trace_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        if !self.trace_path.is_dir() {
            return Err(ConfigError::BadFilePath(self.trace_path.clone()));
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.trace_path)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == TRACE_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Get the output directory, which must already exist
    pub fn get_output_directory(&self) -> Result<&Path, ConfigError> {
        if self.output_path.is_dir() {
            Ok(&self.output_path)
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    pub fn has_wafer(&self) -> bool {
        self.wafer.is_some()
    }
}

/// The name results for a trace are written under: its file stem
pub fn trace_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| String::from("trace"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runs::RunSection;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let config = Config {
            exclusion: RunExclusion::from_sections(&[
                RunSection::new(0, 2),
                RunSection::open(40),
            ]),
            filter: FilterSpec::Chain(vec![
                FilterSpec::Median { kernel: 5 },
                FilterSpec::MovingAverage { size: 3 },
            ]),
            wafer: Some(WaferConfig {
                resample: Some((45.0, 60.0)),
                ..Default::default()
            }),
            n_threads: 3,
            ..Default::default()
        };
        config.write_config_file(&path).unwrap();
        let read = Config::read_config_file(&path).unwrap();
        assert_eq!(read, config);
        assert!(read.has_wafer());
        assert!(read.is_n_threads_valid());
    }

    #[test]
    fn test_missing_paths() {
        let missing = PathBuf::from("/definitely/not/here.yml");
        assert!(matches!(
            Config::read_config_file(&missing),
            Err(ConfigError::BadFilePath(_))
        ));
        let config = Config::default();
        assert!(matches!(
            config.get_trace_files(),
            Err(ConfigError::BadFilePath(_))
        ));
        assert!(config.get_output_directory().is_err());
    }

    #[test]
    fn test_bad_window_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let config = Config {
            window: ValidWindow {
                low: 65.0,
                high: 41.0,
            },
            ..Default::default()
        };
        config.write_config_file(&path).unwrap();
        assert!(matches!(
            Config::read_config_file(&path),
            Err(ConfigError::TraceError(_))
        ));
    }

    #[test]
    fn test_trace_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["n_2.csv", "b_1.csv", "notes.txt"] {
            std::fs::write(dir.path().join(name), "time,encoder,laser\n").unwrap();
        }
        let config = Config {
            trace_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let files = config.get_trace_files().unwrap();
        let names: Vec<String> = files.iter().map(|f| trace_name(f)).collect();
        assert_eq!(names, vec!["b_1", "n_2"]);
    }
}
