//! Small descriptive statistics and numerical helpers shared by the profile engine.
//!
//! These follow the numpy/scipy conventions the instrument data was historically analyzed
//! with: population standard deviation, R-7 (linear) percentiles, clamped linear interpolation
//! and second order central gradients.

/// Arithmetic mean. NaN for an empty slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation (ddof = 0). NaN for an empty slice.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mu = mean(data);
    let var = data.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / data.len() as f64;
    var.sqrt()
}

/// Mean of the absolute values
pub fn mean_abs(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().map(|x| x.abs()).sum::<f64>() / data.len() as f64
}

/// Median. The data is copied, the input is left untouched.
pub fn median(data: &[f64]) -> f64 {
    percentile(data, 50.0)
}

/// Percentile `q` in [0, 100] with linear interpolation between order statistics.
///
/// NaN for an empty slice.
pub fn percentile(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * (q.clamp(0.0, 100.0) / 100.0);
    let lo = h.floor() as usize;
    if lo >= n - 1 {
        return sorted[n - 1];
    }
    let frac = h - lo as f64;
    sorted[lo] + (sorted[lo + 1] - sorted[lo]) * frac
}

/// Cumulative trapezoidal integral of `y` over `x` without an initial value.
///
/// The output has one fewer sample than the input. Equal lengths are the caller's
/// responsibility; the shorter of the two governs.
pub fn cumulative_trapezoid(y: &[f64], x: &[f64]) -> Vec<f64> {
    let n = y.len().min(x.len());
    let mut out = Vec::with_capacity(n.saturating_sub(1));
    let mut total = 0.0;
    for i in 1..n {
        total += (x[i] - x[i - 1]) * (y[i] + y[i - 1]) / 2.0;
        out.push(total);
    }
    out
}

/// Linear interpolation of `(xp, fp)` at `x`, clamped to the end values outside of `xp`.
///
/// `xp` must be ascending.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // partition_point gives the first index with xp > x
    let hi = xp[..n].partition_point(|v| *v <= x);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span == 0.0 {
        return fp[lo];
    }
    fp[lo] + (fp[hi] - fp[lo]) * (x - xp[lo]) / span
}

/// Gradient with unit spacing: central differences inside, one sided at the edges.
pub fn gradient(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    match n {
        0 => vec![],
        1 => vec![0.0],
        _ => {
            let mut out = Vec::with_capacity(n);
            out.push(data[1] - data[0]);
            for i in 1..(n - 1) {
                out.push((data[i + 1] - data[i - 1]) / 2.0);
            }
            out.push(data[n - 1] - data[n - 2]);
            out
        }
    }
}
