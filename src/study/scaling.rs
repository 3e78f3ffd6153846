//! Scaling-law identities and universality classes.

use serde::{Deserialize, Serialize};

/// Reference critical exponents of the classic universality classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniversalityClass {
    MeanField,
    Ising3d,
    Ising2d,
    Percolation,
}

impl UniversalityClass {
    pub const ALL: [UniversalityClass; 4] = [
        UniversalityClass::MeanField,
        UniversalityClass::Ising3d,
        UniversalityClass::Ising2d,
        UniversalityClass::Percolation,
    ];

    pub fn label(self) -> &'static str {
        match self {
            UniversalityClass::MeanField => "mean field",
            UniversalityClass::Ising3d => "Ising 3D",
            UniversalityClass::Ising2d => "Ising 2D",
            UniversalityClass::Percolation => "percolation",
        }
    }

    /// `(γ, β, ν)`
    pub fn exponents(self) -> (f64, f64, f64) {
        match self {
            UniversalityClass::MeanField => (1.0, 0.5, 0.5),
            UniversalityClass::Ising3d => (1.24, 0.326, 0.63),
            UniversalityClass::Ising2d => (1.75, 0.125, 1.0),
            UniversalityClass::Percolation => (1.80, 0.14, 0.88),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalityMatch {
    pub class: UniversalityClass,
    pub reference_gamma: f64,
    pub gamma: f64,
    /// `|γ − γ_class|`
    pub distance: f64,
    /// True when `gamma` is the pooled cross-region estimate rather than the
    /// per-region median.
    pub pooled: bool,
}

/// Closest class by `γ`; `None` for a non-finite `γ`.
pub fn nearest_class(gamma: f64, pooled: bool) -> Option<UniversalityMatch> {
    if !gamma.is_finite() {
        return None;
    }
    UniversalityClass::ALL
        .iter()
        .map(|&class| {
            let reference_gamma = class.exponents().0;
            UniversalityMatch {
                class,
                reference_gamma,
                gamma,
                distance: (gamma - reference_gamma).abs(),
                pooled,
            }
        })
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// Scaling relations evaluated on one set of `(γ, β, ν)` estimates.
///
/// - hyperscaling: `α = 2 − dν`
/// - Rushbrooke: `α + 2β + γ = 2`
/// - Widom: `δ = 1 + γ/β` (derived only)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalingChecks {
    pub dimension: f64,
    pub gamma: Option<f64>,
    pub beta: Option<f64>,
    pub nu: Option<f64>,
    pub alpha: Option<f64>,
    pub rushbrooke_sum: Option<f64>,
    /// `α + 2β + γ − 2`
    pub rushbrooke_deviation: Option<f64>,
    pub widom_delta: Option<f64>,
}

pub fn scaling_checks(
    gamma: Option<f64>,
    beta: Option<f64>,
    nu: Option<f64>,
    dimension: f64,
) -> ScalingChecks {
    let alpha = nu.map(|nu| 2.0 - dimension * nu);
    let rushbrooke_sum = match (alpha, beta, gamma) {
        (Some(a), Some(b), Some(g)) => Some(a + 2.0 * b + g),
        _ => None,
    };
    let widom_delta = match (gamma, beta) {
        (Some(g), Some(b)) if b != 0.0 => Some(1.0 + g / b),
        _ => None,
    };

    ScalingChecks {
        dimension,
        gamma,
        beta,
        nu,
        alpha,
        rushbrooke_sum,
        rushbrooke_deviation: rushbrooke_sum.map(|s| s - 2.0),
        widom_delta,
    }
}
