//! Start-grid generation for the nonlinear model parameters.
//!
//! We seed the damped Gauss–Newton refinement from a deterministic grid over
//! the nonlinear parameters (SR centres/widths, SIR rates/shift); the linear
//! ones (SR amplitudes, SIR scale) are solved exactly per grid point.
//!
//! Why a grid?
//! - sech² superpositions and SIR curves have many local minima.
//! - It is deterministic given the same inputs/options.
//! - Each grid point is a tiny linear solve, cheap enough to evaluate in parallel.

use crate::domain::ModelKind;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{SIR_SHIFT_MAX, SR_WIDTH_MAX, SR_WIDTH_MIN};

/// SIR infection-rate search range (per day).
const SIR_BETA_RANGE: (f64, f64) = (0.05, 2.0);
/// SIR removal-rate search range (per day).
const SIR_GAMMA_RANGE: (f64, f64) = (0.02, 0.5);

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> AnalysisResult<Vec<f64>> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AnalysisError::InvalidConfig(format!(
            "invalid log range: min={min}, max={max} (must be finite, >0, and max>min)"
        )));
    }
    if steps < 2 {
        return Err(AnalysisError::InvalidConfig("grid steps must be >= 2".into()));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    Ok((0..steps).map(|i| (ln_min + step * i as f64).exp()).collect())
}

/// Generate `steps` evenly spaced points between `min` and `max` (inclusive).
pub fn linear_space(min: f64, max: f64, steps: usize) -> AnalysisResult<Vec<f64>> {
    if !(min.is_finite() && max.is_finite() && max >= min) {
        return Err(AnalysisError::InvalidConfig(format!(
            "invalid linear range: min={min}, max={max}"
        )));
    }
    if steps < 2 {
        return Err(AnalysisError::InvalidConfig("grid steps must be >= 2".into()));
    }
    let step = (max - min) / (steps as f64 - 1.0);
    Ok((0..steps).map(|i| min + step * i as f64).collect())
}

/// Resolution of the start grid.
#[derive(Debug, Clone, Copy)]
pub struct GridSpec {
    pub center_steps: usize,
    pub width_steps: usize,
    pub shift_steps: usize,
}

/// Nonlinear start points for `model` on a series of length `n`.
///
/// - SR: tuples `[τ0, T0, τ1, T1, ...]` with strictly increasing centres, so
///   each mode permutation appears once.
/// - SIR: tuples `[β, γ, shift]` with `β > γ` (a wave that actually grows).
pub fn start_grid(model: ModelKind, n: usize, grid: GridSpec) -> AnalysisResult<Vec<Vec<f64>>> {
    match model {
        ModelKind::Sr { modes } => sr_grid(n, modes, grid),
        ModelKind::Sir => sir_grid(grid),
    }
}

fn sr_grid(n: usize, modes: usize, grid: GridSpec) -> AnalysisResult<Vec<Vec<f64>>> {
    if modes == 0 || modes > ModelKind::MAX_SR_MODES {
        return Err(AnalysisError::InvalidConfig(format!(
            "SR modes must be in 1..={} (got {modes})",
            ModelKind::MAX_SR_MODES
        )));
    }
    let horizon = n.saturating_sub(1) as f64;
    let centers = linear_space(0.0, horizon, grid.center_steps.max(modes))?;
    let widths = log_space(SR_WIDTH_MIN, SR_WIDTH_MAX, grid.width_steps)?;

    let mut out = Vec::new();
    for combo in increasing_combinations(centers.len(), modes) {
        for width_idx in product_indices(widths.len(), modes) {
            let mut tuple = Vec::with_capacity(2 * modes);
            for (&c, &w) in combo.iter().zip(&width_idx) {
                tuple.push(centers[c]);
                tuple.push(widths[w]);
            }
            out.push(tuple);
        }
    }
    Ok(out)
}

fn sir_grid(grid: GridSpec) -> AnalysisResult<Vec<Vec<f64>>> {
    let betas = log_space(SIR_BETA_RANGE.0, SIR_BETA_RANGE.1, grid.width_steps)?;
    let gammas = log_space(SIR_GAMMA_RANGE.0, SIR_GAMMA_RANGE.1, grid.width_steps)?;
    let shifts = linear_space(0.0, SIR_SHIFT_MAX, grid.shift_steps)?;

    let mut out = Vec::new();
    for &beta in &betas {
        for &gamma in &gammas {
            if beta <= gamma {
                continue;
            }
            for &shift in &shifts {
                out.push(vec![beta, gamma, shift]);
            }
        }
    }
    Ok(out)
}

/// All `k`-subsets of `0..n` as strictly increasing index lists.
fn increasing_combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn rec(start: usize, n: usize, k: usize, cur: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if cur.len() == k {
            out.push(cur.clone());
            return;
        }
        for i in start..n {
            cur.push(i);
            rec(i + 1, n, k, cur, out);
            cur.pop();
        }
    }
    let mut out = Vec::new();
    rec(0, n, k, &mut Vec::with_capacity(k), &mut out);
    out
}

/// Cartesian power `(0..n)^k` as index lists.
fn product_indices(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = vec![Vec::with_capacity(k)];
    for _ in 0..k {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                (0..n).map(move |i| {
                    let mut next = prefix.clone();
                    next.push(i);
                    next
                })
            })
            .collect();
    }
    out
}
