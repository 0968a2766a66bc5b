//! One-sided test deciding whether one individual is genuinely better than another.
//!
//! Both score samples come from the same seed list, so the test works on the
//! paired differences `z = s1 - s2`. It matches a pooled two-sample t-test of
//! `z` against an equally long sample of zeros: `t = mean(z) / (sd(z) / sqrt(n))`
//! with `2n - 2` degrees of freedom, and the p-value is the lower tail.

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Lower-tail p-value for the hypothesis that the mean of `z` is negative.
///
/// Returns `None` when fewer than two differences are available.
pub fn p_value(z: &[f64]) -> Option<f64> {
    let n = z.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean = z.iter().sum::<f64>() / nf;
    let variance = z.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (nf - 1.0);
    let sd = variance.sqrt();
    if sd == 0.0 {
        // Every difference is equal: certain in whichever direction it points.
        return Some(if mean < 0.0 {
            0.0
        } else if mean > 0.0 {
            1.0
        } else {
            0.5
        });
    }
    let t = mean / (sd / nf.sqrt());
    let dist = StudentsT::new(0.0, 1.0, 2.0 * nf - 2.0).ok()?;
    Some(dist.cdf(t))
}

/// Whether `s1` (the presumed best, lower scores) is significantly below `s2`.
///
/// Identical samples are never significant.
pub fn t_test(s1: &[f64], s2: &[f64], significance: f64) -> bool {
    if s1.len() == s2.len() && s1.iter().zip(s2).all(|(a, b)| a == b) {
        return false;
    }
    let z: Vec<f64> = s1.iter().zip(s2).map(|(a, b)| a - b).collect();
    match p_value(&z) {
        Some(p) => p < significance,
        None => false,
    }
}
