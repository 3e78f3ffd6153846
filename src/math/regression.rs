//! Simple linear regression `y = a + b x` with inference.
//!
//! Used for every log-log power-law fit. Sums are centred on the means before
//! accumulating (two-pass), which keeps `Sxx` / `Sxy` accurate when `ln ε`
//! values sit far from zero.

use crate::math::special::student_t_two_sided_p;

/// Output of `linear_regression`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson r.
    pub r: f64,
    pub r_squared: f64,
    /// `None` with fewer than 3 points (no residual degrees of freedom).
    pub slope_std_error: Option<f64>,
    /// Two-sided p-value for `slope ≠ 0`; `None` when `slope_std_error` is `None`.
    pub p_value: Option<f64>,
    pub n: usize,
}

/// Ordinary least squares of `ys` on `xs`.
///
/// Returns `None` when fewer than 2 points, lengths differ, any value is
/// non-finite, or `xs` has no spread.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    let n = xs.len();
    if n < 2 || ys.len() != n {
        return None;
    }
    if xs.iter().chain(ys).any(|v| !v.is_finite()) {
        return None;
    }

    let nf = n as f64;
    let mx = xs.iter().sum::<f64>() / nf;
    let my = ys.iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    // Relative threshold: spread that is pure rounding noise counts as none.
    if sxx <= f64::EPSILON * mx.abs().max(1.0) * nf {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = my - slope * mx;

    // Flat response: r is undefined; report zero association.
    let r = if syy > 0.0 {
        (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let r_squared = r * r;

    let (slope_std_error, p_value) = if n > 2 {
        let dof = nf - 2.0;
        let sse = (syy - slope * sxy).max(0.0);
        let se = (sse / dof / sxx).sqrt();
        let p = if se > 0.0 {
            student_t_two_sided_p(slope / se, dof)
        } else if slope != 0.0 {
            0.0
        } else {
            1.0
        };
        (Some(se), Some(p))
    } else {
        (None, None)
    };

    Some(LinearFit {
        slope,
        intercept,
        r,
        r_squared,
        slope_std_error,
        p_value,
        n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_line_has_unit_r_squared() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 - 1.5 * x).collect();
        let fit = linear_regression(&xs, &ys).unwrap();
        assert!((fit.slope + 1.5).abs() < 1e-12);
        assert!((fit.intercept - 2.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert!(fit.p_value.unwrap() < 1e-12);
    }

    #[test]
    fn noisy_line_matches_reference() {
        // dof = 3 has a closed-form t CDF, so p is checked against it.
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [2.0, 4.0, 5.0, 4.0, 5.0];
        let fit = linear_regression(&xs, &ys).unwrap();
        assert!((fit.slope - 0.6).abs() < 1e-12);
        assert!((fit.intercept - 2.2).abs() < 1e-12);
        assert!((fit.r_squared - 0.6).abs() < 1e-12);
        let se = fit.slope_std_error.unwrap();
        assert!((se - 0.282_842_712_474_619).abs() < 1e-9);
        let p = fit.p_value.unwrap();
        assert!((p - 0.124_027_062_7).abs() < 1e-6, "p = {p}");
    }

    #[test]
    fn no_spread_in_x_is_rejected() {
        assert!(linear_regression(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(linear_regression(&[1.0], &[1.0]).is_none());
    }

    #[test]
    fn two_points_have_no_inference() {
        let fit = linear_regression(&[1.0, 2.0], &[1.0, 3.0]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!(fit.slope_std_error.is_none());
        assert!(fit.p_value.is_none());
    }
}
