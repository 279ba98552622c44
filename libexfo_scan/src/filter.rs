use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::curvature::Polynomial;

/// Kernel of the median pass used by the exfoliation laser filter
const EXFOLIATION_MEDIAN_KERNEL: usize = 65;

type FilterFn = dyn Fn(ArrayView1<f64>) -> Array1<f64> + Send + Sync;

/// An injectable array -> array transformation.
///
/// Filters are opaque to the engine: they are applied per pass before stacking, or to
/// aggregate profiles before derived calculations. The default is the identity.
#[derive(Clone)]
pub struct Filter {
    name: String,
    func: Arc<FilterFn>,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").field("name", &self.name).finish()
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::identity()
    }
}

impl Filter {
    /// Wrap any closure as a Filter
    pub fn from_fn<F>(name: &str, func: F) -> Self
    where
        F: Fn(ArrayView1<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            func: Arc::new(func),
        }
    }

    /// The no-op filter
    pub fn identity() -> Self {
        Self::from_fn("identity", |data| data.to_owned())
    }

    /// Median filter with zero padded edges. Even kernels are widened to the next odd size.
    pub fn median(kernel: usize) -> Self {
        Self::from_fn(&format!("median({kernel})"), move |data| {
            let owned = data.to_vec();
            Array1::from(median_filter(&owned, kernel))
        })
    }

    /// Uniform (moving average) filter with reflected edges
    pub fn moving_average(size: usize) -> Self {
        Self::from_fn(&format!("moving_average({size})"), move |data| {
            let owned = data.to_vec();
            Array1::from(uniform_filter(&owned, size))
        })
    }

    /// Least squares polynomial smoothing against the sample index.
    ///
    /// If the data is too short for the requested degree it is returned unchanged.
    pub fn polynomial(degree: usize) -> Self {
        Self::from_fn(&format!("polynomial({degree})"), move |data| {
            let x: Vec<f64> = (0..data.len()).map(|i| i as f64).collect();
            let y = data.to_vec();
            match Polynomial::fit(&x, &y, degree) {
                Ok(poly) => x.iter().map(|v| poly.evaluate(*v)).collect(),
                Err(e) => {
                    log::warn!("Polynomial filter skipped: {e}");
                    data.to_owned()
                }
            }
        })
    }

    /// The laser filter used for exfoliation scans: a wide median followed by a moving average
    pub fn exfoliation(size: usize) -> Self {
        Self::median(EXFOLIATION_MEDIAN_KERNEL).then(Self::moving_average(size))
    }

    /// Apply self, then other
    pub fn then(self, other: Filter) -> Self {
        let name = format!("{} -> {}", self.name, other.name);
        let first = self.func;
        let second = other.func;
        Self {
            name,
            func: Arc::new(move |data: ArrayView1<f64>| -> Array1<f64> {
                let intermediate = first(data);
                second(intermediate.view())
            }),
        }
    }

    pub fn apply(&self, data: ArrayView1<f64>) -> Array1<f64> {
        (self.func)(data)
    }

    /// Convenience for slices
    pub fn apply_slice(&self, data: &[f64]) -> Vec<f64> {
        self.apply(ArrayView1::from(data)).to_vec()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Serializable description of a Filter, for use in configuration files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterSpec {
    #[default]
    Identity,
    Median {
        kernel: usize,
    },
    MovingAverage {
        size: usize,
    },
    Polynomial {
        degree: usize,
    },
    Exfoliation {
        size: usize,
    },
    Chain(Vec<FilterSpec>),
}

impl FilterSpec {
    pub fn build(&self) -> Filter {
        match self {
            Self::Identity => Filter::identity(),
            Self::Median { kernel } => Filter::median(*kernel),
            Self::MovingAverage { size } => Filter::moving_average(*size),
            Self::Polynomial { degree } => Filter::polynomial(*degree),
            Self::Exfoliation { size } => Filter::exfoliation(*size),
            Self::Chain(specs) => specs
                .iter()
                .fold(Filter::identity(), |acc, spec| acc.then(spec.build())),
        }
    }
}

/// Median over an odd window centred on each sample; samples beyond the edges count as zero
pub fn median_filter(data: &[f64], kernel: usize) -> Vec<f64> {
    let kernel = if kernel % 2 == 0 { kernel + 1 } else { kernel };
    let half = kernel / 2;
    let n = data.len();
    let mut window: Vec<f64> = Vec::with_capacity(kernel);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        window.clear();
        for offset in 0..kernel {
            let idx = i as isize + offset as isize - half as isize;
            if idx < 0 || idx >= n as isize {
                window.push(0.0);
            } else {
                window.push(data[idx as usize]);
            }
        }
        window.sort_by(|a, b| a.total_cmp(b));
        out.push(window[half]);
    }
    out
}

/// Index into `0..n` reflecting about the edges (d c b a | a b c d | d c b a)
fn reflect(idx: isize, n: isize) -> usize {
    let period = 2 * n;
    let mut m = idx.rem_euclid(period);
    if m >= n {
        m = period - m - 1;
    }
    m as usize
}

/// Moving average of width `size` with reflected edges
pub fn uniform_filter(data: &[f64], size: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 || size <= 1 {
        return data.to_vec();
    }
    let left = (size / 2) as isize;
    let mut prefix = Vec::with_capacity(n + size + 1);
    prefix.push(0.0);
    let mut total = 0.0;
    for j in 0..(n + size) {
        total += data[reflect(j as isize - left, n as isize)];
        prefix.push(total);
    }
    (0..n)
        .map(|i| (prefix[i + size] - prefix[i]) / size as f64)
        .collect()
}
