//! Statistical utility functions shared across modules

use std::cmp::Ordering;

/// Consistency constant making the MAD an estimator of the normal SD
const MAD_SCALE: f64 = 1.4826;

fn sort_finite(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

/// Median of a sorted slice; mean of the two central values for even length.
pub fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Median of unsorted values (sorts in place)
pub fn median(values: &mut [f64]) -> f64 {
    sort_finite(values);
    median_sorted(values)
}

/// Squared scaled median absolute deviation, a robust variance estimate.
pub fn mad_squared(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut v = values.to_vec();
    let center = median(&mut v);
    let mut abs_devs: Vec<f64> = v.iter().map(|&x| (x - center).abs()).collect();
    let mad = median(&mut abs_devs) * MAD_SCALE;
    mad * mad
}

/// Sample quantile with linear interpolation between order statistics
/// (h = (n-1)p, 0-based), on an ascending slice.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }

    let h = (n as f64 - 1.0) * p.clamp(0.0, 1.0);
    let lo = (h.floor() as usize).min(n - 1);
    let hi = (h.ceil() as usize).min(n - 1);

    if lo == hi {
        sorted[lo]
    } else {
        let frac = h - lo as f64;
        sorted[lo] + frac * (sorted[hi] - sorted[lo])
    }
}

/// Trigamma function (derivative of digamma)
///
/// Reflection below 0.5, recurrence up to 8, then the asymptotic series.
pub fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }

    if x >= 8.0 {
        let x2 = x * x;
        return 1.0 / x + 0.5 / x2 + 1.0 / (6.0 * x2 * x) - 1.0 / (30.0 * x2 * x2 * x)
            + 1.0 / (42.0 * x2 * x2 * x2 * x);
    }

    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result += 1.0 / (z * z);
        z += 1.0;
    }
    result + trigamma(z)
}
