/// Bar colour for the stage a worker is in: CYAN for traces, MAGENTA for the wafer, RED
/// once a trace has failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BarColor {
    #[default]
    CYAN,
    MAGENTA,
    RED,
}

/// Progress report sent from a worker thread to the UI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStatus {
    pub progress: f32,
    /// Index of the trace (in the sorted list of trace files) being processed
    pub trace_index: usize,
    pub worker_id: usize,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, trace_index: usize, worker_id: usize, color: BarColor) -> Self {
        Self {
            progress,
            trace_index,
            worker_id,
            color,
        }
    }

    /// Progress as a whole percentage, for progress bars
    pub fn percent(&self) -> u64 {
        (self.progress.clamp(0.0, 1.0) * 100.0).round() as u64
    }

    pub fn is_finished(&self) -> bool {
        self.progress >= 1.0
    }
}
