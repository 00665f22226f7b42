//! Small numeric kernels shared by the mechanics fit, the inference
//! preprocessing and the aggregation step.

/// Cumulative trapezoidal integral over a uniform grid with zero initial value.
///
/// The output has the same length as `values`; `out[0] == 0`.
pub fn cumulative_trapezoid(values: &[f64], dt: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }

    let mut acc = 0.0;
    out.push(acc);
    for w in values.windows(2) {
        acc += (w[0] + w[1]) * dt / 2.0;
        out.push(acc);
    }
    out
}

/// Trapezoidal area with unit sample spacing.
pub fn trapezoid(values: &[f64]) -> f64 {
    values.windows(2).map(|w| (w[0] + w[1]) / 2.0).sum()
}

/// Round to `decimals` places (negative values round to tens, hundreds, ...).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Maximum ignoring NaN; `None` when no finite value exists.
pub fn finite_max(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

/// Minimum ignoring NaN; `None` when no finite value exists.
pub fn finite_min(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
}

/// Index of the first occurrence of the minimum value.
pub fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Linear interpolation of `values` (sampled at 0, 1, ..., n-1) at `position`.
///
/// Positions outside the sampled range are clamped to the end points.
pub fn interpolate(values: &[f64], position: f64) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    if position <= 0.0 {
        return values[0];
    }

    let last = (n - 1) as f64;
    if position >= last {
        return values[n - 1];
    }

    let lo = position.floor() as usize;
    let frac = position - lo as f64;
    values[lo] + frac * (values[lo + 1] - values[lo])
}

/// Quantile of an ascending-sorted, NaN-free slice using linear
/// interpolation between closest ranks (`h = (n - 1) * q`).
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    Some(interpolate(sorted, h))
}

/// Median of the given values (NaN ignored).
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(f64::total_cmp);
    quantile_sorted(&finite, 0.5)
}
