//! Power-law exponents from log-log regression.
//!
//! Every exponent in the crate goes through [`fit_power_law`]:
//! - per region: susceptibility `χ(t) ∼ ε^(−γ)` on one branch of `t_c`
//! - across regions: `χ_max ∼ |r|^(−γ)`, `A ∼ |r|^β`, `T ∼ |r|^(−ν)` against the
//!   regime distance `r`
//!
//! Too few usable points never raise an error; the fit comes back with
//! `valid = false`, `R² = 0` and the reason.

use crate::domain::{
    Branch, CriticalPoint, DistanceConvention, ExponentFit, InvalidReason, QuantityKind,
    SignalEdge, SusceptibilitySignal,
};
use crate::error::{AnalysisError, AnalysisResult};
use crate::math::{LinearFit, linear_regression};

/// Fit `values ∼ distances^(sign · exponent)` by OLS of `ln value` on
/// `ln distance`.
///
/// Pairs with a non-positive or non-finite distance or value are dropped
/// before counting against `min_points`.
pub fn fit_power_law(
    distances: &[f64],
    values: &[f64],
    kind: QuantityKind,
    min_points: usize,
) -> ExponentFit {
    let (log_d, log_v): (Vec<f64>, Vec<f64>) = distances
        .iter()
        .zip(values)
        .filter(|&(&d, &v)| d.is_finite() && v.is_finite() && d > 0.0 && v > 0.0)
        .map(|(&d, &v)| (d.ln(), v.ln()))
        .unzip();

    let n = log_d.len();
    match regress(&log_d, &log_v, min_points) {
        Ok(fit) => ExponentFit {
            region_id: None,
            quantity: kind,
            branch: None,
            convention: None,
            exponent: kind.slope_sign() * fit.slope,
            std_error: fit.slope_std_error,
            r_squared: fit.r_squared,
            p_value: fit.p_value,
            intercept: fit.intercept,
            n_points: n,
            valid: true,
            invalid_reason: None,
            invalid_detail: None,
        },
        Err(err) => {
            let reason = match err {
                AnalysisError::InsufficientBranchPoints { .. } => {
                    InvalidReason::InsufficientBranchPoints
                }
                _ => InvalidReason::Degenerate,
            };
            invalid(kind, n, reason, err.to_string())
        }
    }
}

/// OLS on the log-log pairs, or why it cannot be trusted.
fn regress(log_d: &[f64], log_v: &[f64], min_points: usize) -> AnalysisResult<LinearFit> {
    let required = min_points.max(2);
    if log_d.len() < required {
        return Err(AnalysisError::InsufficientBranchPoints {
            found: log_d.len(),
            required,
        });
    }
    if !has_two_distinct(log_d) {
        return Err(AnalysisError::DegenerateSeries(
            "all distances are equal".to_string(),
        ));
    }
    linear_regression(log_d, log_v).ok_or_else(|| {
        AnalysisError::DegenerateSeries("regression output is not finite".to_string())
    })
}

/// Susceptibility exponent of one region on the requested branch.
pub fn estimate(
    signal: &SusceptibilitySignal,
    critical: &CriticalPoint,
    branch: Branch,
    min_points: usize,
    convention: DistanceConvention,
) -> ExponentFit {
    let kind = QuantityKind::Susceptibility;
    let side = match branch {
        Branch::Ascending => &signal.points[..critical.index.min(signal.len())],
        Branch::Descending => signal
            .points
            .get(critical.index + 1..)
            .unwrap_or_default(),
    };

    let on_edge = matches!(
        (branch, critical.edge),
        (Branch::Ascending, Some(SignalEdge::AtStart))
            | (Branch::Descending, Some(SignalEdge::AtEnd))
    );
    let mut fit = if side.is_empty() || on_edge {
        invalid(
            kind,
            0,
            InvalidReason::EmptyBranch,
            format!("no signal points on the {} side of t_c", branch.label()),
        )
    } else {
        // Far end of the branch, for `SinceOnset`.
        let far_end = match branch {
            Branch::Ascending => side[0].date,
            Branch::Descending => side[side.len() - 1].date,
        };
        let distances: Vec<f64> = side
            .iter()
            .map(|p| match convention {
                DistanceConvention::ToCritical => {
                    (p.date - critical.date).num_days().abs() as f64
                }
                DistanceConvention::SinceOnset => {
                    (p.date - far_end).num_days().abs() as f64 + 1.0
                }
            })
            .collect();
        let values: Vec<f64> = side.iter().map(|p| p.value).collect();
        fit_power_law(&distances, &values, kind, min_points)
    };

    fit.region_id = Some(signal.region_id.clone());
    fit.branch = Some(branch);
    fit.convention = Some(convention);
    fit
}

/// Cross-region fit of `quantity` against the regime distance `|r|`.
///
/// `samples` holds `(r, value)` per region; regions with `|r| <= min_distance`
/// sit too close to the transition to be placed on a log axis and are skipped.
pub fn estimate_cross_region(
    samples: &[(f64, f64)],
    kind: QuantityKind,
    min_points: usize,
    min_distance: f64,
) -> ExponentFit {
    let (distances, values): (Vec<f64>, Vec<f64>) = samples
        .iter()
        .filter(|(r, _)| r.abs() > min_distance)
        .map(|&(r, v)| (r.abs(), v))
        .unzip();
    fit_power_law(&distances, &values, kind, min_points)
}

fn has_two_distinct(xs: &[f64]) -> bool {
    xs.iter().any(|&x| x != xs[0])
}

fn invalid(
    kind: QuantityKind,
    n_points: usize,
    reason: InvalidReason,
    detail: String,
) -> ExponentFit {
    ExponentFit {
        region_id: None,
        quantity: kind,
        branch: None,
        convention: None,
        exponent: f64::NAN,
        std_error: None,
        r_squared: 0.0,
        p_value: None,
        intercept: f64::NAN,
        n_points,
        valid: false,
        invalid_reason: Some(reason),
        invalid_detail: Some(detail),
    }
}
