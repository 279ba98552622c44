use ndarray::{Array2, ArrayView1};

use super::error::{ContractViolation, ScanError};
use super::filter::Filter;
use super::runs::{Direction, Run};

/// The passes of one direction, truncated to a common length and stacked row-wise.
///
/// Rows are in run order. Every row has the length of the shortest pass; longer passes
/// lose their trailing samples, nothing is ever padded.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanStack {
    pub direction: Direction,
    pub positions: Array2<f64>,
    pub signals: Array2<f64>,
    /// The runs each row was cut from
    pub runs: Vec<Run>,
}

impl ScanStack {
    /// Build the stack of every second run starting at the direction offset.
    ///
    /// The filter is applied to each pass signal on its own, before truncation, so that
    /// no filter window spans two passes.
    pub fn build(
        runs: &[Run],
        position: &[f64],
        signal: &[f64],
        direction: Direction,
        filter: &Filter,
    ) -> Result<Self, ScanError> {
        ContractViolation::check("scan stack (position vs signal)", position.len(), signal.len())?;
        let selected: Vec<Run> = runs
            .iter()
            .skip(direction.offset())
            .step_by(2)
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(ScanError::InvalidTrace(format!(
                "no {direction} passes among {} runs",
                runs.len()
            )));
        }
        for run in selected.iter() {
            if run.end > position.len() || run.is_empty() {
                return Err(ScanError::InvalidTrace(format!(
                    "run [{}, {}) lies outside of a trace with {} samples",
                    run.start,
                    run.end,
                    position.len()
                )));
            }
        }

        let min_len = selected.iter().map(|run| run.len()).min().unwrap_or(0);
        let mut positions = Array2::<f64>::zeros((selected.len(), min_len));
        let mut signals = Array2::<f64>::zeros((selected.len(), min_len));
        for (row, run) in selected.iter().enumerate() {
            let pass_signal = filter.apply(ArrayView1::from(&signal[run.start..run.end]));
            if pass_signal.len() < min_len {
                return Err(ContractViolation::new(
                    "filtered pass signal",
                    min_len,
                    pass_signal.len(),
                )
                .into());
            }
            positions
                .row_mut(row)
                .assign(&ArrayView1::from(&position[run.start..(run.start + min_len)]));
            signals
                .row_mut(row)
                .assign(&pass_signal.slice(ndarray::s![..min_len]));
        }

        log::debug!(
            "Stacked {} {direction} passes of {min_len} samples",
            selected.len()
        );

        Ok(Self {
            direction,
            positions,
            signals,
            runs: selected,
        })
    }

    pub fn n_passes(&self) -> usize {
        self.positions.nrows()
    }

    pub fn pass_length(&self) -> usize {
        self.positions.ncols()
    }
}
