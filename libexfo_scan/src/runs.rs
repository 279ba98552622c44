use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{ScanError, TraceError};

/// Value given to samples outside of the valid window
pub const SENTINEL: f64 = 0.0;

/// Travel direction of a pass.
///
/// The instrument reciprocates, so runs alternate direction: even runs (0, 2, 4, ...) are
/// forward passes and odd runs are backward passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// Direction of the run at `index` in the ordered run list
    pub fn of_run(index: usize) -> Self {
        if index % 2 == 0 {
            Self::Forward
        } else {
            Self::Backward
        }
    }

    /// Index of the first run travelling in this direction
    pub fn offset(&self) -> usize {
        match self {
            Self::Forward => 0,
            Self::Backward => 1,
        }
    }

    pub fn both() -> [Self; 2] {
        [Self::Forward, Self::Backward]
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
        }
    }
}

/// Half open index interval [start, end) over a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub start: usize,
    pub end: usize,
}

impl Run {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Bounds on position (mm) which define valid travel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidWindow {
    pub low: f64,
    pub high: f64,
}

impl Default for ValidWindow {
    fn default() -> Self {
        Self {
            low: 41.0,
            high: 65.0,
        }
    }
}

impl ValidWindow {
    /// Create a window. The low bound must be positive so that in-window data never
    /// collides with the sentinel.
    pub fn new(low: f64, high: f64) -> Result<Self, TraceError> {
        let window = Self { low, high };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), TraceError> {
        if self.low > SENTINEL && self.low < self.high {
            Ok(())
        } else {
            Err(TraceError::BadWindow(self.low, self.high))
        }
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.low && position <= self.high
    }

    /// Replace every out-of-window sample with the sentinel
    pub fn clip(&self, position: &[f64]) -> Vec<f64> {
        position
            .iter()
            .map(|p| if self.contains(*p) { *p } else { SENTINEL })
            .collect()
    }
}

/// Half open section of run indices. Without an end it covers every run from `start` on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSection {
    pub start: usize,
    #[serde(default)]
    pub end: Option<usize>,
}

impl RunSection {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn open(start: usize) -> Self {
        Self { start, end: None }
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && self.end.map_or(true, |end| index < end)
    }

    pub fn is_empty(&self) -> bool {
        self.end.is_some_and(|end| end <= self.start)
    }
}

/// Run indices to drop after detection, given as single indices and/or sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunExclusion {
    #[serde(default)]
    pub indices: Vec<usize>,
    #[serde(default)]
    pub sections: Vec<RunSection>,
}

impl RunExclusion {
    pub fn from_indices(indices: &[usize]) -> Self {
        Self {
            indices: indices.to_vec(),
            sections: vec![],
        }
    }

    pub fn from_sections(sections: &[RunSection]) -> Self {
        Self {
            indices: vec![],
            sections: sections.to_vec(),
        }
    }

    pub fn excludes(&self, index: usize) -> bool {
        self.indices.contains(&index) || self.sections.iter().any(|s| s.contains(index))
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty() && self.sections.iter().all(|s| s.is_empty())
    }
}

/// Finds contiguous runs of in-window samples in a position trace.
#[derive(Debug, Clone, Default)]
pub struct RunDetector {
    window: ValidWindow,
    exclusion: RunExclusion,
}

impl RunDetector {
    pub fn new(window: ValidWindow, exclusion: RunExclusion) -> Self {
        Self { window, exclusion }
    }

    /// Detect all runs, then drop the excluded ones.
    ///
    /// Fails if no run survives.
    pub fn detect(&self, position: &[f64]) -> Result<Vec<Run>, ScanError> {
        self.window.validate()?;
        let clipped = self.window.clip(position);
        let runs = non_sentinel_runs(&clipped);
        let n_detected = runs.len();
        log::debug!("Detected {n_detected} runs");
        let runs = self.apply_exclusion(runs);
        if runs.is_empty() {
            return Err(ScanError::InvalidTrace(format!(
                "no position inside [{}, {}] after exclusion ({n_detected} runs detected)",
                self.window.low, self.window.high,
            )));
        }
        Ok(runs)
    }

    /// Remove runs by their index in the ordered list
    fn apply_exclusion(&self, runs: Vec<Run>) -> Vec<Run> {
        if self.exclusion.is_empty() {
            return runs;
        }
        let starts = self.exclusion.sections.iter().map(|s| s.start);
        for idx in self.exclusion.indices.iter().copied().chain(starts) {
            if idx >= runs.len() {
                log::warn!(
                    "Excluded run {idx} does not exist; only {} runs were detected",
                    runs.len()
                );
            }
        }
        let kept: Vec<Run> = runs
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !self.exclusion.excludes(*idx))
            .map(|(_, run)| run)
            .collect();
        log::info!("{} runs remain after exclusion", kept.len());
        kept
    }
}

/// All maximal runs of non-sentinel values.
///
/// The array is treated as if it had a sentinel on both sides, so a run touching either
/// edge is still closed.
pub fn non_sentinel_runs(clipped: &[f64]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, value) in clipped.iter().enumerate() {
        let valid = *value != SENTINEL;
        match (valid, start) {
            (true, None) => start = Some(idx),
            (false, Some(s)) => {
                runs.push(Run::new(s, idx));
                start = None;
            }
            _ => (),
        }
    }
    if let Some(s) = start {
        runs.push(Run::new(s, clipped.len()));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plateaus(n: usize, width: usize, gap: usize) -> Vec<f64> {
        let mut position = vec![];
        for p in 0..n {
            position.extend(std::iter::repeat(10.0).take(gap));
            position.extend((0..width).map(|i| 45.0 + (i + p) as f64 * 0.01));
        }
        position.extend(std::iter::repeat(10.0).take(gap));
        position
    }

    #[test]
    fn test_detects_each_plateau() {
        let position = plateaus(5, 20, 7);
        let detector = RunDetector::new(ValidWindow::new(40.0, 65.0).unwrap(), RunExclusion::default());
        let runs = detector.detect(&position).unwrap();
        assert_eq!(runs.len(), 5);
        let covered: usize = runs.iter().map(|r| r.len()).sum();
        let in_window = position.iter().filter(|p| **p >= 40.0 && **p <= 65.0).count();
        assert_eq!(covered, in_window);
        for pair in runs.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        for run in runs.iter() {
            assert!(position[run.start..run.end].iter().all(|p| *p >= 40.0));
        }
        assert_eq!(runs, detector.detect(&position).unwrap());
    }

    #[test]
    fn test_runs_touching_edges_are_closed() {
        let runs = non_sentinel_runs(&[1.0, 2.0, 0.0, 0.0, 3.0]);
        assert_eq!(runs, vec![Run::new(0, 2), Run::new(4, 5)]);
    }

    #[test]
    fn test_no_travel_is_invalid() {
        let position: Vec<f64> = (0..100).map(|i| 10.0 + i as f64 * 0.2).collect();
        let detector = RunDetector::new(ValidWindow::new(40.0, 65.0).unwrap(), RunExclusion::default());
        assert!(matches!(
            detector.detect(&position),
            Err(ScanError::InvalidTrace(_))
        ));
    }

    #[test]
    fn test_exclusion_by_list_position() {
        let position = plateaus(6, 10, 3);
        let all = RunDetector::default().detect(&position).unwrap();
        let detector = RunDetector::new(
            ValidWindow::default(),
            RunExclusion {
                indices: vec![0, 9],
                sections: vec![RunSection::new(2, 4)],
            },
        );
        let runs = detector.detect(&position).unwrap();
        assert_eq!(runs, vec![all[1], all[4], all[5]]);

        let everything = RunDetector::new(
            ValidWindow::default(),
            RunExclusion::from_sections(&[RunSection::new(0, 6)]),
        );
        assert!(everything.detect(&position).is_err());
    }

    #[test]
    fn test_open_and_huge_sections_are_not_expanded() {
        let position = plateaus(6, 10, 3);
        let all = RunDetector::default().detect(&position).unwrap();
        let open = RunDetector::new(
            ValidWindow::default(),
            RunExclusion::from_sections(&[RunSection::open(4)]),
        );
        assert_eq!(open.detect(&position).unwrap(), all[..4].to_vec());

        let huge = RunExclusion::from_sections(&[RunSection::new(3, usize::MAX)]);
        assert!(huge.excludes(usize::MAX - 1));
        assert!(!huge.excludes(2));
        let detector = RunDetector::new(ValidWindow::default(), huge);
        assert_eq!(detector.detect(&position).unwrap(), all[..3].to_vec());
    }

    #[test]
    fn test_section_yaml_end_is_optional() {
        let exclusion: RunExclusion =
            serde_yaml::from_str("sections:\n- start: 0\n  end: 18\n- start: 34\n").unwrap();
        assert_eq!(
            exclusion.sections,
            vec![RunSection::new(0, 18), RunSection::open(34)]
        );
        assert!(exclusion.indices.is_empty());
        assert!(!RunSection::new(5, 5).contains(5));
        assert!(RunExclusion::from_sections(&[RunSection::new(5, 5)]).is_empty());
    }

    #[test]
    fn test_direction_parity() {
        assert_eq!(Direction::of_run(0), Direction::Forward);
        assert_eq!(Direction::of_run(3), Direction::Backward);
        assert_eq!(Direction::Backward.offset(), 1);
        assert_eq!(Direction::Forward.to_string(), "forward");
    }

    #[test]
    fn test_bad_window() {
        assert!(ValidWindow::new(0.0, 10.0).is_err());
        assert!(ValidWindow::new(20.0, 10.0).is_err());
    }
}
