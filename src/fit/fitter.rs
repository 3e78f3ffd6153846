//! Least-squares fitting of one candidate model to one observable.
//!
//! Given:
//! - days `t_i = 0, 1, ..., n − 1`
//! - observed values `y_i`
//! - a start grid over the model's nonlinear parameters
//!
//! we:
//! - solve, for each grid point, the linear coefficients (SR amplitudes, SIR
//!   scale) by OLS and keep the lowest-SSE start
//! - refine all parameters jointly with a box-projected Levenberg–Marquardt
//!   loop bounded by `max_iterations`
//!
//! A refinement that runs out of iterations, produces non-finite values or
//! leaves the valid box fails with `FitDivergence`.

use log::debug;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::{ModelFitResult, ModelKind, ObservableSeries};
use crate::error::{AnalysisError, AnalysisResult};
use crate::fit::start_grid::{GridSpec, start_grid};
use crate::math::solve_least_squares;
use crate::models::{ModelContext, ParamBounds, assemble_params, design_columns, predict};

/// Minimum number of extra observations beyond parameter count.
pub const MIN_N_BUFFER: usize = 5;

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_UP: f64 = 4.0;
const LAMBDA_DOWN: f64 = 3.0;
const LAMBDA_MIN: f64 = 1e-12;
/// Damping beyond which no downhill step exists inside the box.
const LAMBDA_MAX: f64 = 1e10;
const FTOL: f64 = 1e-10;
const XTOL: f64 = 1e-10;

/// Fitting options that affect how each model is calibrated.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub max_iterations: usize,
    pub grid: GridSpec,
    /// SIR population `N`.
    pub population: f64,
}

#[derive(Debug, Clone)]
struct Candidate {
    idx: usize,
    params: Vec<f64>,
    sse: f64,
}

#[derive(Debug, Clone)]
struct Refined {
    params: Vec<f64>,
    sse: f64,
    iterations: usize,
}

/// Fit `model` to a region's observable.
pub fn fit_model(
    model: ModelKind,
    series: &ObservableSeries,
    opts: &FitOptions,
) -> AnalysisResult<ModelFitResult> {
    let n = series.len();
    let k = model.param_count();
    if n < k + MIN_N_BUFFER {
        return Err(AnalysisError::DegenerateSeries(format!(
            "{} needs at least {} points, series has {n}",
            model.display_name(),
            k + MIN_N_BUFFER
        )));
    }
    if series.values.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::DegenerateSeries(
            "observable contains non-finite values".into(),
        ));
    }
    let y_max = series.values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if y_max <= 0.0 {
        return Err(AnalysisError::DegenerateSeries(format!(
            "observable {} has no positive signal",
            series.observable.label()
        )));
    }

    let ts: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let y = &series.values;
    let ctx = ModelContext {
        population: opts.population,
    };
    let bounds = ParamBounds::for_model(model, n, y_max);

    let grid = start_grid(model, n, opts.grid)?;
    let start = best_start(model, &ts, y, &grid, &bounds, &ctx).ok_or_else(|| {
        AnalysisError::FitDivergence(format!(
            "no valid start candidate for {}",
            model.display_name()
        ))
    })?;

    let refined = levenberg_marquardt(
        model,
        &ts,
        y,
        start.params,
        &bounds,
        &ctx,
        opts.max_iterations,
    )?;
    if !bounds.contains(&refined.params) {
        return Err(AnalysisError::FitDivergence(format!(
            "{} parameters left the valid range: {:?}",
            model.display_name(),
            refined.params
        )));
    }

    let fitted = predict(model, &ts, &refined.params, &ctx);
    let rms = (refined.sse / n as f64).sqrt();
    debug!(
        "{} {}: rms={rms:.4} after {} iterations (start #{})",
        series.region_id,
        model.display_name(),
        refined.iterations,
        start.idx
    );

    Ok(ModelFitResult {
        region_id: series.region_id.clone(),
        model,
        observable: series.observable,
        param_names: model.param_names(),
        params: refined.params,
        sse: refined.sse,
        rms,
        n,
        iterations: refined.iterations,
        fitted,
    })
}

fn best_start(
    model: ModelKind,
    ts: &[f64],
    y: &[f64],
    grid: &[Vec<f64>],
    bounds: &ParamBounds,
    ctx: &ModelContext,
) -> Option<Candidate> {
    // Evaluate each start independently (parallel).
    let candidates: Vec<Candidate> = grid
        .par_iter()
        .enumerate()
        .filter_map(|(idx, nonlinear)| {
            evaluate_start(model, ts, y, nonlinear, bounds, ctx).map(|(params, sse)| Candidate {
                idx,
                params,
                sse,
            })
        })
        .collect();

    // Deterministic selection: pick the minimum SSE; break ties by the lower grid index.
    let mut iter = candidates.into_iter();
    let mut best = iter.next()?;
    for c in iter {
        if c.sse < best.sse || (c.sse == best.sse && c.idx < best.idx) {
            best = c;
        }
    }
    Some(best)
}

fn evaluate_start(
    model: ModelKind,
    ts: &[f64],
    y: &[f64],
    nonlinear: &[f64],
    bounds: &ParamBounds,
    ctx: &ModelContext,
) -> Option<(Vec<f64>, f64)> {
    let n = ts.len();
    let columns = design_columns(model, ts, nonlinear, ctx);
    let p = columns.len();

    let mut x = DMatrix::<f64>::zeros(n, p);
    for (j, col) in columns.iter().enumerate() {
        for (i, &v) in col.iter().enumerate() {
            if !v.is_finite() {
                return None;
            }
            x[(i, j)] = v;
        }
    }
    let yv = DVector::from_column_slice(y);
    let linear = solve_least_squares(&x, &yv)?;

    // Negative amplitudes/scales are outside the model; clamping keeps the
    // start valid (if suboptimal) instead of discarding it.
    let mut params = assemble_params(model, linear.as_slice(), nonlinear);
    bounds.project(&mut params);

    let sse = sse(model, ts, y, &params, ctx);
    sse.is_finite().then_some((params, sse))
}

fn sse(model: ModelKind, ts: &[f64], y: &[f64], params: &[f64], ctx: &ModelContext) -> f64 {
    predict(model, ts, params, ctx)
        .iter()
        .zip(y)
        .map(|(f, yi)| (yi - f) * (yi - f))
        .sum()
}

fn residuals(
    model: ModelKind,
    ts: &[f64],
    y: &[f64],
    params: &[f64],
    ctx: &ModelContext,
) -> DVector<f64> {
    let f = predict(model, ts, params, ctx);
    DVector::from_iterator(y.len(), y.iter().zip(&f).map(|(yi, fi)| yi - fi))
}

/// Forward-difference Jacobian of the model output (backward at the upper bound).
fn jacobian(
    model: ModelKind,
    ts: &[f64],
    params: &[f64],
    bounds: &ParamBounds,
    ctx: &ModelContext,
) -> DMatrix<f64> {
    let n = ts.len();
    let m = params.len();
    let base = predict(model, ts, params, ctx);
    let mut jac = DMatrix::<f64>::zeros(n, m);
    let mut work = params.to_vec();

    for j in 0..m {
        let h = 1e-6 * params[j].abs().max(1e-3);
        let step = if params[j] + h <= bounds.upper[j] { h } else { -h };
        work[j] = params[j] + step;
        let shifted = predict(model, ts, &work, ctx);
        for i in 0..n {
            jac[(i, j)] = (shifted[i] - base[i]) / step;
        }
        work[j] = params[j];
    }
    jac
}

fn levenberg_marquardt(
    model: ModelKind,
    ts: &[f64],
    y: &[f64],
    start: Vec<f64>,
    bounds: &ParamBounds,
    ctx: &ModelContext,
    max_iterations: usize,
) -> AnalysisResult<Refined> {
    let n = ts.len();
    let m = start.len();
    let signal_energy: f64 = y.iter().map(|v| v * v).sum::<f64>().max(1.0);
    let exact_threshold = 1e-20 * signal_energy;

    let mut params = start;
    let mut r = residuals(model, ts, y, &params, ctx);
    let mut current = r.norm_squared();
    if !current.is_finite() {
        return Err(AnalysisError::FitDivergence("non-finite starting residuals".into()));
    }
    if current <= exact_threshold {
        return Ok(Refined {
            params,
            sse: current,
            iterations: 0,
        });
    }

    let mut lambda = LAMBDA_INIT;
    for iteration in 1..=max_iterations {
        let jac = jacobian(model, ts, &params, bounds, ctx);

        // Marquardt scaling: damp each direction by its own curvature.
        let mut augmented = DMatrix::<f64>::zeros(n + m, m);
        augmented.view_mut((0, 0), (n, m)).copy_from(&jac);
        for j in 0..m {
            let scale = jac.column(j).norm().max(1e-12);
            augmented[(n + j, j)] = lambda.sqrt() * scale;
        }
        let mut rhs = DVector::<f64>::zeros(n + m);
        rhs.rows_mut(0, n).copy_from(&r);

        let Some(delta) = solve_least_squares(&augmented, &rhs) else {
            return Err(AnalysisError::FitDivergence(format!(
                "singular Gauss-Newton system at iteration {iteration}"
            )));
        };

        let mut trial: Vec<f64> = params.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
        bounds.project(&mut trial);
        let trial_r = residuals(model, ts, y, &trial, ctx);
        let trial_sse = trial_r.norm_squared();
        if !trial_sse.is_finite() {
            return Err(AnalysisError::FitDivergence(format!(
                "non-finite residuals at iteration {iteration}"
            )));
        }

        if trial_sse < current {
            let step_norm = params
                .iter()
                .zip(&trial)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            let param_norm = trial.iter().map(|v| v * v).sum::<f64>().sqrt();
            let reduction = current - trial_sse;

            params = trial;
            r = trial_r;
            let previous = current;
            current = trial_sse;
            lambda = (lambda / LAMBDA_DOWN).max(LAMBDA_MIN);

            if current <= exact_threshold
                || reduction <= FTOL * previous
                || step_norm <= XTOL * (param_norm + XTOL)
            {
                return Ok(Refined {
                    params,
                    sse: current,
                    iterations: iteration,
                });
            }
        } else {
            lambda *= LAMBDA_UP;
            if lambda > LAMBDA_MAX {
                // No downhill direction left inside the box: stationary point.
                return Ok(Refined {
                    params,
                    sse: current,
                    iterations: iteration,
                });
            }
        }
    }

    Err(AnalysisError::FitDivergence(format!(
        "{} did not converge within {max_iterations} iterations (sse={current:.6e})",
        model.display_name()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observable;
    use chrono::{Duration, NaiveDate};

    fn series_from(values: Vec<f64>) -> ObservableSeries {
        let start = NaiveDate::from_ymd_opt(2020, 3, 18).unwrap();
        ObservableSeries {
            region_id: "T".into(),
            observable: Observable::DcDiff,
            dates: (0..values.len())
                .map(|i| start + Duration::days(i as i64))
                .collect(),
            values,
            imputed: vec![],
            trimmed: vec![],
        }
    }

    fn opts() -> FitOptions {
        FitOptions {
            max_iterations: 200,
            grid: GridSpec {
                center_steps: 11,
                width_steps: 5,
                shift_steps: 3,
            },
            population: 5e5,
        }
    }

    #[test]
    fn sr_recovers_single_mode_on_grid() {
        // Centre 40 is on the 11-step centre grid over [0, 100]; width 30 is the
        // last point of the width grid, so the start is already exact.
        let ctx = ModelContext { population: 1.0 };
        let ts: Vec<f64> = (0..101).map(|i| i as f64).collect();
        let truth = [25.0, 40.0, 30.0];
        let y = predict(ModelKind::Sr { modes: 1 }, &ts, &truth, &ctx);

        let fit = fit_model(ModelKind::Sr { modes: 1 }, &series_from(y), &opts()).unwrap();
        assert!(fit.rms < 1e-6, "rms = {}", fit.rms);
        let mode = fit.dominant_mode().unwrap();
        assert!((mode.amplitude - 25.0).abs() < 1e-4);
        assert!((mode.center - 40.0).abs() < 1e-4);
    }

    #[test]
    fn sr_refines_off_grid_mode() {
        let ctx = ModelContext { population: 1.0 };
        let ts: Vec<f64> = (0..101).map(|i| i as f64).collect();
        let truth = [18.0, 43.5, 7.3];
        let y = predict(ModelKind::Sr { modes: 1 }, &ts, &truth, &ctx);

        let fit = fit_model(ModelKind::Sr { modes: 1 }, &series_from(y), &opts()).unwrap();
        let peak = 18.0;
        assert!(fit.rms < 1e-3 * peak, "rms = {}", fit.rms);
    }

    #[test]
    fn sir_fit_is_finite_and_tracks_sir_data() {
        let ctx = ModelContext { population: 5e5 };
        let ts: Vec<f64> = (0..90).map(|i| i as f64).collect();
        let truth = [0.3, 0.1, 0.001, 10.0];
        let y = predict(ModelKind::Sir, &ts, &truth, &ctx);
        let peak = y.iter().cloned().fold(0.0, f64::max);

        let fit = fit_model(ModelKind::Sir, &series_from(y), &opts()).unwrap();
        assert!(fit.rms.is_finite());
        assert!(fit.rms < 0.05 * peak, "rms = {} vs peak {peak}", fit.rms);
        assert_eq!(fit.params.len(), 4);
    }

    #[test]
    fn short_series_is_degenerate() {
        let err = fit_model(ModelKind::Sir, &series_from(vec![1.0; 6]), &opts()).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateSeries(_)));
    }

    #[test]
    fn zero_signal_is_degenerate() {
        let err = fit_model(ModelKind::Sr { modes: 1 }, &series_from(vec![0.0; 40]), &opts())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateSeries(_)));
    }

    #[test]
    fn tiny_iteration_budget_diverges() {
        let ctx = ModelContext { population: 1.0 };
        let ts: Vec<f64> = (0..101).map(|i| i as f64).collect();
        let truth = [18.0, 43.5, 7.3, 9.0, 70.2, 4.1];
        let y = predict(ModelKind::Sr { modes: 2 }, &ts, &truth, &ctx);
        let mut o = opts();
        o.max_iterations = 1;

        let err = fit_model(ModelKind::Sr { modes: 2 }, &series_from(y), &o).unwrap_err();
        assert!(matches!(err, AnalysisError::FitDivergence(_)));
    }
}
