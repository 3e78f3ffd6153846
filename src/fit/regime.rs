//! SR vs SIR dominance for one region.
//!
//! The two fits are compared by their residual RMS:
//! - `ratio = RMS_SIR / RMS_SR`
//! - `ratio > 1 + tol` → the multi-mode model explains the wave better (SR dominant)
//! - `ratio < 1 − tol` → the single compartmental flow does (SIR dominant)
//! - anything in between is the critical band

use crate::domain::{ModelFitResult, Regime, RegimeVerdict};
use crate::error::{AnalysisError, AnalysisResult};

/// Classify a region from its two model fits.
///
/// Pure: the same inputs always give the same verdict.
pub fn classify(
    sr: &ModelFitResult,
    sir: &ModelFitResult,
    tolerance: f64,
) -> AnalysisResult<RegimeVerdict> {
    classify_rms(&sr.region_id, sr.rms, sir.rms, tolerance)
}

/// Same as [`classify`] on bare RMS values.
pub fn classify_rms(
    region_id: &str,
    rms_sr: f64,
    rms_sir: f64,
    tolerance: f64,
) -> AnalysisResult<RegimeVerdict> {
    if !(rms_sr.is_finite() && rms_sr > 0.0) {
        return Err(AnalysisError::FitDivergence(format!(
            "region {region_id}: SR rms is {rms_sr}, dominance ratio undefined"
        )));
    }
    if !(rms_sir.is_finite() && rms_sir >= 0.0) {
        return Err(AnalysisError::FitDivergence(format!(
            "region {region_id}: SIR rms is {rms_sir}, dominance ratio undefined"
        )));
    }

    let ratio = rms_sir / rms_sr;
    let regime = regime_for_ratio(ratio, tolerance);

    Ok(RegimeVerdict {
        region_id: region_id.to_string(),
        rms_sr,
        rms_sir,
        ratio,
        distance: ratio - 1.0,
        regime,
        tolerance,
    })
}

/// Band a dominance ratio.
pub fn regime_for_ratio(ratio: f64, tolerance: f64) -> Regime {
    if ratio > 1.0 + tolerance {
        Regime::SrDominant
    } else if ratio < 1.0 - tolerance {
        Regime::SirDominant
    } else {
        Regime::Critical
    }
}
