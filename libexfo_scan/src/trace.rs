use serde::{Deserialize, Serialize};

use super::error::{ContractViolation, TraceError};
use super::filter::median_filter;
use super::stats;

/// How raw encoder counts are converted into positions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Kernel of the median filter which removes encoder glitches
    pub median_kernel: usize,
    /// Encoder counts per mm (the encoder reads in 10 um units)
    pub counts_per_mm: f64,
    /// Normalized gradient above which a sample is reported as a jump
    pub jump_threshold: f64,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            median_kernel: 21,
            counts_per_mm: 100.0,
            jump_threshold: 0.005,
        }
    }
}

impl EncoderSettings {
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.counts_per_mm <= 0.0 || !self.counts_per_mm.is_finite() {
            return Err(TraceError::BadEncoder(format!(
                "counts_per_mm must be positive, found {}",
                self.counts_per_mm
            )));
        }
        Ok(())
    }

    /// Median filter the counts and convert them to mm
    pub fn counts_to_mm(&self, counts: &[f64]) -> Result<Vec<f64>, TraceError> {
        self.validate()?;
        Ok(median_filter(counts, self.median_kernel)
            .into_iter()
            .map(|c| c / self.counts_per_mm)
            .collect())
    }
}

/// Channels as they come off the instrument, before any conversion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTrace {
    pub time: Vec<f64>,
    /// Encoder counts
    pub encoder: Vec<f64>,
    pub laser: Vec<f64>,
    pub load: Option<Vec<f64>>,
}

impl RawTrace {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn to_trace(&self, settings: &EncoderSettings) -> Result<Trace, TraceError> {
        Trace::from_encoder(
            self.time.clone(),
            &self.encoder,
            self.laser.clone(),
            self.load.clone(),
            settings,
        )
    }
}

/// One acquisition from the instrument: all channels share one sample clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub time: Vec<f64>,
    pub position: Vec<f64>,
    pub signal: Vec<f64>,
    pub load: Option<Vec<f64>>,
    /// Sample indices where the encoder jumped
    pub jumps: Vec<usize>,
}

impl Trace {
    /// Build a trace from already converted channels
    pub fn new(
        time: Vec<f64>,
        position: Vec<f64>,
        signal: Vec<f64>,
        load: Option<Vec<f64>>,
    ) -> Result<Self, TraceError> {
        if time.is_empty() {
            return Err(TraceError::Empty);
        }
        ContractViolation::check("trace position", time.len(), position.len())?;
        ContractViolation::check("trace signal", time.len(), signal.len())?;
        if let Some(load) = &load {
            ContractViolation::check("trace load", time.len(), load.len())?;
        }
        if let Some(idx) = time.windows(2).position(|w| w[1] < w[0]) {
            return Err(TraceError::TimeNotMonotonic(idx + 1));
        }
        Ok(Self {
            time,
            position,
            signal,
            load,
            jumps: vec![],
        })
    }

    /// Build a trace from raw instrument channels.
    ///
    /// The encoder is median filtered and converted to mm, time is re-based to start at
    /// zero, and encoder jumps are logged.
    pub fn from_encoder(
        time: Vec<f64>,
        encoder: &[f64],
        laser: Vec<f64>,
        load: Option<Vec<f64>>,
        settings: &EncoderSettings,
    ) -> Result<Self, TraceError> {
        let position = settings.counts_to_mm(encoder)?;
        let start = time.first().copied().unwrap_or(0.0);
        let time = time.into_iter().map(|t| t - start).collect();
        let mut trace = Self::new(time, position, laser, load)?;
        trace.jumps = find_jumps(&trace.position, settings.jump_threshold);
        if !trace.jumps.is_empty() {
            log::warn!(
                "Encoder jumps at {} samples, first at sample {}",
                trace.jumps.len(),
                trace.jumps[0]
            );
        }
        Ok(trace)
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn has_load(&self) -> bool {
        self.load.is_some()
    }
}

/// Indices where the gradient of the max-normalized position exceeds `threshold`
pub fn find_jumps(position: &[f64], threshold: f64) -> Vec<usize> {
    let max = position.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !(max.is_finite() && max != 0.0) {
        return vec![];
    }
    let normalized: Vec<f64> = position.iter().map(|p| p / max).collect();
    stats::gradient(&normalized)
        .iter()
        .enumerate()
        .filter(|(_, g)| **g > threshold)
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_mismatched_channels() {
        let result = Trace::new(vec![0.0, 1.0], vec![1.0], vec![1.0, 2.0], None);
        assert!(matches!(result, Err(TraceError::Contract(_))));
        let result = Trace::new(vec![0.0, 1.0], vec![1.0, 2.0], vec![1.0, 2.0], Some(vec![1.0]));
        assert!(matches!(result, Err(TraceError::Contract(_))));
        let result = Trace::new(vec![0.0, 2.0, 1.0], vec![1.0; 3], vec![1.0; 3], None);
        assert_eq!(result, Err(TraceError::TimeNotMonotonic(2)));
    }

    #[test]
    fn test_from_encoder_converts_counts() {
        let time: Vec<f64> = (0..50).map(|i| 100.0 + i as f64).collect();
        let mut counts: Vec<f64> = (0..50).map(|i| 4500.0 + i as f64).collect();
        counts[25] = 99999.0;
        let trace = Trace::from_encoder(
            time,
            &counts,
            vec![1.0; 50],
            None,
            &EncoderSettings {
                median_kernel: 3,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(trace.time[0], 0.0);
        // the glitch is replaced by its neighbourhood median
        assert!((trace.position[25] - 45.26).abs() < 1e-9);
        assert!(trace.jumps.is_empty());
        assert!(!trace.has_load());
    }

    #[test]
    fn test_jumps_reported() {
        let mut position = vec![45.0; 20];
        for p in position.iter_mut().skip(10) {
            *p = 55.0;
        }
        assert_eq!(find_jumps(&position, 0.005), vec![9, 10]);
    }
}
