//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - passed between pipeline stages without copying series around
//! - exported to JSON/CSV
//! - compared in tests

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Which observable a stage works on.
///
/// `HospDiff` and `DcDiff` are first differences of the cumulative-ish `hosp`
/// and `dc` counts (new admissions / new deaths per day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Observable {
    Hosp,
    #[value(name = "hosp_diff")]
    HospDiff,
    Rea,
    #[value(name = "dc_diff")]
    DcDiff,
}

impl Observable {
    pub fn label(self) -> &'static str {
        match self {
            Observable::Hosp => "hosp",
            Observable::HospDiff => "hosp_diff",
            Observable::Rea => "rea",
            Observable::DcDiff => "dc_diff",
        }
    }
}

/// Concrete candidate model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum ModelKind {
    /// Superposition of `modes` sech² growth modes.
    Sr { modes: usize },
    /// Single susceptible/infected/removed compartmental flow.
    Sir,
}

impl ModelKind {
    /// Maximum number of SR modes supported by the start grid.
    pub const MAX_SR_MODES: usize = 4;

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> String {
        match self {
            ModelKind::Sr { modes } => format!("SR({modes})"),
            ModelKind::Sir => "SIR".to_string(),
        }
    }

    /// Number of free parameters.
    pub fn param_count(self) -> usize {
        match self {
            // (A, τ, T) per mode
            ModelKind::Sr { modes } => 3 * modes,
            // (β, γ, scale, shift)
            ModelKind::Sir => 4,
        }
    }

    /// Parameter names in the order used by `ModelFitResult::params`.
    pub fn param_names(self) -> Vec<String> {
        match self {
            ModelKind::Sr { modes } => (0..modes)
                .flat_map(|k| [format!("A{k}"), format!("tau{k}"), format!("T{k}")])
                .collect(),
            ModelKind::Sir => ["beta", "gamma", "scale", "shift"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Outcome of the SR vs SIR comparison for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    SrDominant,
    SirDominant,
    /// Ratio within the tolerance band around 1.0.
    Critical,
}

impl Regime {
    pub fn label(self) -> &'static str {
        match self {
            Regime::SrDominant => "SR_dominant",
            Regime::SirDominant => "SIR_dominant",
            Regime::Critical => "critical",
        }
    }
}

/// Side of the critical point used for a regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    /// Dates strictly before `t_c`.
    Ascending,
    /// Dates strictly after `t_c`.
    Descending,
}

impl Branch {
    pub fn label(self) -> &'static str {
        match self {
            Branch::Ascending => "ascending",
            Branch::Descending => "descending",
        }
    }
}

/// How the distance to the critical point is measured on a branch.
///
/// The two conventions give opposite-signed exponents on a monotone branch;
/// neither is assumed to be the right one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DistanceConvention {
    /// `ε = |t − t_c|` in days.
    #[value(name = "to_critical")]
    ToCritical,
    /// `ε = |t − t_edge| + 1` where `t_edge` is the far end of the branch.
    #[value(name = "since_onset")]
    SinceOnset,
}

/// Derived quantity playing the dependent role in a power-law fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    /// `χ ∼ ε^(−γ)`
    Susceptibility,
    /// `A ∼ ε^β`
    OrderParameter,
    /// `T ∼ ε^(−ν)`
    CorrelationWidth,
}

impl QuantityKind {
    /// Multiplier turning the log-log slope into the exponent.
    pub fn slope_sign(self) -> f64 {
        match self {
            QuantityKind::Susceptibility | QuantityKind::CorrelationWidth => -1.0,
            QuantityKind::OrderParameter => 1.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            QuantityKind::Susceptibility => "gamma",
            QuantityKind::OrderParameter => "beta",
            QuantityKind::CorrelationWidth => "nu",
        }
    }
}

/// Where a signal maximum sits when it leaves one branch empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalEdge {
    /// Maximum at the first valid position: no ascending branch.
    AtStart,
    /// Maximum at the last valid position: no descending branch.
    AtEnd,
}

/// Why an `ExponentFit` is not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// The critical point sits on the edge of the requested side.
    EmptyBranch,
    /// Fewer surviving points than `min_points`.
    InsufficientBranchPoints,
    /// Fewer than two distinct distances, or non-finite regression output.
    Degenerate,
}

/// One region's raw daily observations.
///
/// All series are aligned on `dates` (consecutive days). Missing values stay
/// `None`; they are resolved (and recorded) by `Region::observable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub population: Option<f64>,
    pub area_km2: Option<f64>,
    pub dates: Vec<NaiveDate>,
    /// Patients currently hospitalised.
    pub hosp: Vec<Option<f64>>,
    /// Patients currently in intensive care.
    pub rea: Vec<Option<f64>>,
    /// Cumulative hospital deaths.
    pub dc: Vec<Option<f64>>,
}

/// A complete, gap-free observable extracted from a region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservableSeries {
    pub region_id: String,
    pub observable: Observable,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
    /// Interior dates whose value was linearly interpolated.
    pub imputed: Vec<NaiveDate>,
    /// Leading/trailing dates dropped because no value was available.
    pub trimmed: Vec<NaiveDate>,
}

impl ObservableSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One sech² mode of a fitted SR model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SrMode {
    pub amplitude: f64,
    pub center: f64,
    pub width: f64,
}

/// Fit of one candidate model to one region's observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFitResult {
    pub region_id: String,
    pub model: ModelKind,
    pub observable: Observable,
    pub param_names: Vec<String>,
    pub params: Vec<f64>,
    pub sse: f64,
    pub rms: f64,
    pub n: usize,
    pub iterations: usize,
    pub fitted: Vec<f64>,
}

impl ModelFitResult {
    /// SR modes in parameter order (empty for SIR).
    pub fn sr_modes(&self) -> Vec<SrMode> {
        match self.model {
            ModelKind::Sr { .. } => self
                .params
                .chunks_exact(3)
                .map(|c| SrMode {
                    amplitude: c[0],
                    center: c[1],
                    width: c[2],
                })
                .collect(),
            ModelKind::Sir => Vec::new(),
        }
    }

    /// Largest-amplitude SR mode.
    pub fn dominant_mode(&self) -> Option<SrMode> {
        self.sr_modes()
            .into_iter()
            .max_by(|a, b| a.amplitude.total_cmp(&b.amplitude))
    }
}

/// SR vs SIR dominance for a region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeVerdict {
    pub region_id: String,
    pub rms_sr: f64,
    pub rms_sir: f64,
    /// `RMS_SIR / RMS_SR`
    pub ratio: f64,
    /// `ratio − 1`, i.e. `(RMS_SIR − RMS_SR) / RMS_SR`
    pub distance: f64,
    pub regime: Regime,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Rolling-window variance of an observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SusceptibilitySignal {
    pub region_id: String,
    pub observable: Observable,
    pub window: usize,
    pub points: Vec<SignalPoint>,
}

impl SusceptibilitySignal {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Maximum of the susceptibility signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalPoint {
    pub region_id: String,
    pub date: NaiveDate,
    pub value: f64,
    /// Position of the maximum in the signal.
    pub index: usize,
    /// Points strictly before `date`.
    pub ascending_len: usize,
    /// Points strictly after `date`.
    pub descending_len: usize,
    pub edge: Option<SignalEdge>,
    /// Date of the observable's own maximum.
    pub epidemic_peak: NaiveDate,
    /// `epidemic_peak − date` in days (positive when the variance peak leads).
    pub lead_days: i64,
}

/// One positive-frequency bin of the windowed transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralPoint {
    /// Day⁻¹.
    pub frequency: f64,
    /// `|χ(ω)|`
    pub magnitude: f64,
    /// `χ'(ω)`, dispersive part.
    pub real: f64,
    /// `χ''(ω)`, absorptive part.
    pub imag: f64,
    /// `|χ(ω)|²`
    pub power: f64,
}

/// Low-frequency spectral peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralMode {
    pub frequency: f64,
    pub period_days: f64,
    pub power: f64,
}

/// Frequency-domain susceptibility of an observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SusceptibilitySpectrum {
    pub region_id: String,
    pub observable: Observable,
    /// Transform length after zero-padding.
    pub n_fft: usize,
    pub points: Vec<SpectralPoint>,
    /// Strongest first.
    pub modes: Vec<SpectralMode>,
}

impl SusceptibilitySpectrum {
    pub fn dominant_mode(&self) -> Option<&SpectralMode> {
        self.modes.first()
    }
}

/// Log-log regression outcome for one power law.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentFit {
    /// `None` for cross-region fits.
    pub region_id: Option<String>,
    pub quantity: QuantityKind,
    pub branch: Option<Branch>,
    pub convention: Option<DistanceConvention>,
    pub exponent: f64,
    pub std_error: Option<f64>,
    pub r_squared: f64,
    pub p_value: Option<f64>,
    pub intercept: f64,
    pub n_points: usize,
    pub valid: bool,
    pub invalid_reason: Option<InvalidReason>,
    /// Human-readable cause when `valid` is false.
    pub invalid_detail: Option<String>,
}

/// Pipeline stage at which a region was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ModelFit,
    Susceptibility,
    Spectrum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    FitDivergence,
    DegenerateSeries,
}

impl ExclusionReason {
    pub fn label(self) -> &'static str {
        match self {
            ExclusionReason::FitDivergence => "FitDivergence",
            ExclusionReason::DegenerateSeries => "DegenerateSeries",
        }
    }
}

/// A region-level failure recorded instead of aborting the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exclusion {
    pub stage: Stage,
    pub reason: ExclusionReason,
    pub message: String,
}

impl Exclusion {
    pub fn from_error(stage: Stage, err: &AnalysisError) -> Self {
        let reason = match err {
            AnalysisError::FitDivergence(_) => ExclusionReason::FitDivergence,
            _ => ExclusionReason::DegenerateSeries,
        };
        Self {
            stage,
            reason,
            message: err.to_string(),
        }
    }
}

/// Everything computed for one region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRecord {
    pub region_id: String,
    pub name: String,
    pub sr_fit: Option<ModelFitResult>,
    pub sir_fit: Option<ModelFitResult>,
    pub verdict: Option<RegimeVerdict>,
    pub signal: Option<SusceptibilitySignal>,
    pub critical_point: Option<CriticalPoint>,
    pub exponent: Option<ExponentFit>,
    pub spectrum: Option<SusceptibilitySpectrum>,
    pub exclusions: Vec<Exclusion>,
}

/// A full run's configuration as understood by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Observable used for the susceptibility signal.
    pub observable: Observable,
    /// Observable the SR/SIR models are fitted to.
    pub fit_observable: Observable,
    /// Rolling-window size in days.
    pub window: usize,
    /// Half-width of the `Critical` band around ratio 1.0.
    pub tolerance: f64,
    /// Minimum surviving branch points for a valid exponent.
    pub min_branch_points: usize,
    /// Optimiser iteration budget per model fit.
    pub max_iterations: usize,
    /// Number of SR modes.
    pub sr_modes: usize,
    /// Centred moving-average length applied to observables (1 = off).
    pub smoothing: usize,
    pub branch: Branch,
    pub convention: DistanceConvention,
    /// SIR population used when a region has none.
    pub default_population: f64,
    /// Spatial dimension used by the hyperscaling relation `α = 2 − dν`.
    pub scaling_dimension: f64,
    /// Regions closer than this to ratio 1.0 are left out of cross-region fits.
    pub min_regime_distance: f64,
    /// Start-grid resolution for SR mode centres.
    pub center_steps: usize,
    /// Start-grid resolution for SR mode widths and SIR rates.
    pub width_steps: usize,
    /// Start-grid resolution for the SIR time shift.
    pub shift_steps: usize,
    /// Zero-padded FFT length for the spectrum stage.
    pub fft_len: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            observable: Observable::HospDiff,
            fit_observable: Observable::DcDiff,
            window: 7,
            tolerance: 0.0,
            min_branch_points: 5,
            max_iterations: 200,
            sr_modes: 2,
            smoothing: 1,
            branch: Branch::Ascending,
            convention: DistanceConvention::ToCritical,
            default_population: 5e5,
            scaling_dimension: 3.0,
            min_regime_distance: 0.01,
            center_steps: 8,
            width_steps: 5,
            shift_steps: 4,
            fft_len: 4096,
            start: None,
            end: None,
        }
    }
}

impl StudyConfig {
    /// Reject option combinations the pipeline cannot run with.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.window < 2 {
            return Err(AnalysisError::InvalidConfig(format!(
                "window must be >= 2 days (got {})",
                self.window
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "tolerance must be finite and >= 0 (got {})",
                self.tolerance
            )));
        }
        if self.min_branch_points < 2 {
            return Err(AnalysisError::InvalidConfig(
                "min_branch_points must be >= 2".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_iterations must be > 0".to_string(),
            ));
        }
        if !(1..=ModelKind::MAX_SR_MODES).contains(&self.sr_modes) {
            return Err(AnalysisError::InvalidConfig(format!(
                "sr_modes must be in 1..={} (got {})",
                ModelKind::MAX_SR_MODES,
                self.sr_modes
            )));
        }
        if self.smoothing == 0 {
            return Err(AnalysisError::InvalidConfig(
                "smoothing must be >= 1 (1 disables it)".to_string(),
            ));
        }
        if !(self.default_population.is_finite() && self.default_population > 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "default_population must be > 0".to_string(),
            ));
        }
        if self.center_steps < 2 || self.width_steps < 2 || self.shift_steps < 2 {
            return Err(AnalysisError::InvalidConfig(
                "start-grid steps must be >= 2".to_string(),
            ));
        }
        if self.fft_len < 2 {
            return Err(AnalysisError::InvalidConfig(format!(
                "fft_len must be >= 2 (got {})",
                self.fft_len
            )));
        }
        if let (Some(s), Some(e)) = (self.start, self.end) {
            if e < s {
                return Err(AnalysisError::InvalidConfig(format!(
                    "end date {e} is before start date {s}"
                )));
            }
        }
        Ok(())
    }
}
