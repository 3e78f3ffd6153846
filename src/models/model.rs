//! Model evaluation for SR / SIR.
//!
//! The fitter relies on three primitive operations:
//! - predict the observable on a time grid given a full parameter vector
//! - build the linear design columns for fixed nonlinear parameters (start grid)
//! - report the physically valid box for each parameter
//!
//! These are implemented here for each model kind.

use crate::domain::ModelKind;

/// Initial infected count of the SIR flow.
pub const SIR_I0: f64 = 100.0;

/// RK4 substeps per day for the SIR integration.
const SIR_SUBSTEPS: usize = 8;

/// Lower bound on SR mode widths (days).
pub const SR_WIDTH_MIN: f64 = 1.0;
/// Upper bound on SR mode widths (days).
pub const SR_WIDTH_MAX: f64 = 30.0;

pub const SIR_BETA_MAX: f64 = 5.0;
pub const SIR_GAMMA_MAX: f64 = 1.0;
pub const SIR_SCALE_MAX: f64 = 1.0;
pub const SIR_SHIFT_MAX: f64 = 100.0;

/// Unit-amplitude sech² mode: `sech²((t − τ) / (2T))`.
pub fn sech2_mode(t: f64, center: f64, width: f64) -> f64 {
    let x = (t - center) / (2.0 * width);
    // cosh overflows to +inf for |x| > ~710, which correctly yields 0.
    let c = x.cosh();
    1.0 / (c * c)
}

/// Context a model needs beyond its parameter vector.
#[derive(Debug, Clone, Copy)]
pub struct ModelContext {
    /// Compartment population `N` for SIR.
    pub population: f64,
}

/// Predict the observable at each `t` for the given model kind.
///
/// # Panics
/// Panics if `params` does not have length `model.param_count()`.
pub fn predict(model: ModelKind, ts: &[f64], params: &[f64], ctx: &ModelContext) -> Vec<f64> {
    match model {
        ModelKind::Sr { .. } => ts
            .iter()
            .map(|&t| {
                params
                    .chunks_exact(3)
                    .map(|m| m[0] * sech2_mode(t, m[1], m[2]))
                    .sum()
            })
            .collect(),
        ModelKind::Sir => {
            let infected = sir_infected_at(ts, params[0], params[1], params[3], ctx.population);
            infected.into_iter().map(|i| params[2] * i).collect()
        }
    }
}

/// Fill the linear design columns for fixed nonlinear parameters.
///
/// - SR: `nonlinear = [τ0, T0, τ1, T1, ...]`, one column per mode (amplitudes are linear).
/// - SIR: `nonlinear = [β, γ, shift]`, one column (the scale is linear).
///
/// Returned column-major: `columns[j][i]` is column `j` at `ts[i]`.
pub fn design_columns(
    model: ModelKind,
    ts: &[f64],
    nonlinear: &[f64],
    ctx: &ModelContext,
) -> Vec<Vec<f64>> {
    match model {
        ModelKind::Sr { .. } => nonlinear
            .chunks_exact(2)
            .map(|m| ts.iter().map(|&t| sech2_mode(t, m[0], m[1])).collect())
            .collect(),
        ModelKind::Sir => vec![sir_infected_at(
            ts,
            nonlinear[0],
            nonlinear[1],
            nonlinear[2],
            ctx.population,
        )],
    }
}

/// Merge linear coefficients and nonlinear parameters into the full vector
/// expected by `predict`.
pub fn assemble_params(model: ModelKind, linear: &[f64], nonlinear: &[f64]) -> Vec<f64> {
    match model {
        ModelKind::Sr { .. } => linear
            .iter()
            .zip(nonlinear.chunks_exact(2))
            .flat_map(|(&a, m)| [a, m[0], m[1]])
            .collect(),
        ModelKind::Sir => vec![nonlinear[0], nonlinear[1], linear[0], nonlinear[2]],
    }
}

/// Physically valid box for a model's parameters.
#[derive(Debug, Clone)]
pub struct ParamBounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl ParamBounds {
    pub fn for_model(model: ModelKind, n: usize, y_max: f64) -> Self {
        match model {
            ModelKind::Sr { modes } => {
                let amp_max = (2.0 * y_max).max(f64::MIN_POSITIVE);
                let horizon = n.saturating_sub(1) as f64;
                let mut lower = Vec::with_capacity(3 * modes);
                let mut upper = Vec::with_capacity(3 * modes);
                for _ in 0..modes {
                    lower.extend([0.0, 0.0, SR_WIDTH_MIN]);
                    upper.extend([amp_max, horizon, SR_WIDTH_MAX]);
                }
                Self { lower, upper }
            }
            ModelKind::Sir => Self {
                lower: vec![0.0, 0.0, 0.0, 0.0],
                upper: vec![SIR_BETA_MAX, SIR_GAMMA_MAX, SIR_SCALE_MAX, SIR_SHIFT_MAX],
            },
        }
    }

    /// Clamp every coordinate into the box.
    pub fn project(&self, params: &mut [f64]) {
        for ((p, &lo), &hi) in params.iter_mut().zip(&self.lower).zip(&self.upper) {
            *p = p.clamp(lo, hi);
        }
    }

    pub fn contains(&self, params: &[f64]) -> bool {
        params
            .iter()
            .zip(self.lower.iter().zip(&self.upper))
            .all(|(&p, (&lo, &hi))| p.is_finite() && p >= lo && p <= hi)
    }
}

/// Infected compartment `I(t + shift)` for each `t`.
///
/// The flow starts at time 0 with `I = I0` and is integrated (RK4, at most
/// `1 / SIR_SUBSTEPS` days per step) straight to each requested time, so the
/// output is smooth in `shift` as well as in the rates.
pub fn sir_infected_at(ts: &[f64], beta: f64, gamma: f64, shift: f64, population: f64) -> Vec<f64> {
    let n = population.max(SIR_I0 + 1.0);
    let mut order: Vec<usize> = (0..ts.len()).collect();
    order.sort_by(|&a, &b| ts[a].total_cmp(&ts[b]));

    let mut out = vec![0.0; ts.len()];
    let mut state = (n - SIR_I0, SIR_I0);
    let mut clock = 0.0;
    for idx in order {
        let target = (ts[idx] + shift).max(0.0);
        if target > clock {
            state = advance_sir(state, beta, gamma, n, target - clock);
            clock = target;
        }
        out[idx] = state.1;
    }
    out
}

/// Advance `(S, I)` by `duration` days.
fn advance_sir(state: (f64, f64), beta: f64, gamma: f64, n: f64, duration: f64) -> (f64, f64) {
    let steps = (duration * SIR_SUBSTEPS as f64).ceil().max(1.0) as usize;
    let dt = duration / steps as f64;

    let deriv = |s: f64, i: f64| -> (f64, f64) {
        let infection = beta * s * i / n;
        (-infection, infection - gamma * i)
    };

    let (mut s, mut i) = state;
    for _ in 0..steps {
        let (ds1, di1) = deriv(s, i);
        let (ds2, di2) = deriv(s + 0.5 * dt * ds1, i + 0.5 * dt * di1);
        let (ds3, di3) = deriv(s + 0.5 * dt * ds2, i + 0.5 * dt * di2);
        let (ds4, di4) = deriv(s + dt * ds3, i + dt * di3);
        s = (s + dt / 6.0 * (ds1 + 2.0 * ds2 + 2.0 * ds3 + ds4)).max(0.0);
        i = (i + dt / 6.0 * (di1 + 2.0 * di2 + 2.0 * di3 + di4)).max(0.0);
    }
    (s, i)
}
