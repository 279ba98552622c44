use super::error::ScanError;
use super::filter::Filter;
use super::profile::{PositionBuckets, PositionProfile};
use super::runs::{Direction, Run, RunDetector, RunExclusion, ValidWindow};
use super::scan_error::PassErrors;
use super::scan_stack::ScanStack;
use super::trace::Trace;

/// Everything derived from the passes of one direction
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionScan {
    pub stack: ScanStack,
    pub profile: PositionProfile,
    pub errors: PassErrors,
    /// Mean absolute deviation at each position, in position order
    pub error_by_position: Vec<f64>,
}

impl DirectionScan {
    fn build(
        runs: &[Run],
        trace: &Trace,
        direction: Direction,
        filter: &Filter,
        precision: Option<u32>,
    ) -> Result<Self, ScanError> {
        let stack = ScanStack::build(runs, &trace.position, &trace.signal, direction, filter)?;
        let buckets =
            PositionBuckets::from_stack(stack.positions.view(), stack.signals.view(), precision)?;
        let profile = buckets.aggregate();
        let errors = PassErrors::analyze(
            stack.positions.view(),
            stack.signals.view(),
            &profile,
            precision,
        )?;
        Ok(Self {
            error_by_position: buckets.error_by_position(),
            stack,
            profile,
            errors,
        })
    }
}

/// A fully processed trace: detected runs plus the forward and backward results.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub runs: Vec<Run>,
    pub forward: DirectionScan,
    pub backward: DirectionScan,
    pub precision: Option<u32>,
}

impl Scan {
    /// Run detection, stacking, aggregation and error analysis for both directions.
    ///
    /// A trace with a single surviving run has no backward pass and is rejected.
    pub fn build(
        trace: &Trace,
        window: ValidWindow,
        exclusion: RunExclusion,
        filter: &Filter,
        precision: Option<u32>,
    ) -> Result<Self, ScanError> {
        let runs = RunDetector::new(window, exclusion).detect(&trace.position)?;
        log::info!("Loaded {} scans", runs.len() as f64 / 2.0);
        let forward = DirectionScan::build(&runs, trace, Direction::Forward, filter, precision)?;
        let backward = DirectionScan::build(&runs, trace, Direction::Backward, filter, precision)?;
        Ok(Self {
            runs,
            forward,
            backward,
            precision,
        })
    }

    pub fn direction(&self, direction: Direction) -> &DirectionScan {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }

    pub fn direction_mut(&mut self, direction: Direction) -> &mut DirectionScan {
        match direction {
            Direction::Forward => &mut self.forward,
            Direction::Backward => &mut self.backward,
        }
    }

    pub fn n_passes(&self) -> usize {
        self.forward.stack.n_passes() + self.backward.stack.n_passes()
    }
}
