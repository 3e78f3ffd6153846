//! Cross-region reduce over the per-region records.
//!
//! `summarize` reads an immutable slice of `RegionRecord`s (plus the pooled
//! cross-region exponents computed after the join) and never mutates them.
//! Statistics with no valid input are left as `None` and the reason is
//! recorded under `insufficient` instead of dividing by zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ExponentFit, QuantityKind, Regime, RegionRecord, StudyConfig};
use crate::error::AnalysisError;
use crate::math::{mean, median, pearson, sample_std};
use crate::study::scaling::{ScalingChecks, UniversalityMatch, nearest_class, scaling_checks};

/// Two-sided p-value below which a per-region exponent counts as significant.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionStats {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; `None` with a single value.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub min_region: String,
    pub max_region: String,
}

impl DistributionStats {
    /// Stats over `(region id, value)` pairs; non-finite values are skipped.
    pub fn from_labeled(values: &[(String, f64)]) -> Option<Self> {
        let finite: Vec<&(String, f64)> = values.iter().filter(|(_, v)| v.is_finite()).collect();
        let xs: Vec<f64> = finite.iter().map(|(_, v)| *v).collect();
        let lo = finite.iter().min_by(|a, b| a.1.total_cmp(&b.1))?;
        let hi = finite.iter().max_by(|a, b| a.1.total_cmp(&b.1))?;

        Some(Self {
            n: xs.len(),
            mean: mean(&xs)?,
            median: median(&xs)?,
            std_dev: sample_std(&xs),
            min: lo.1,
            max: hi.1,
            min_region: lo.0.clone(),
            max_region: hi.0.clone(),
        })
    }
}

/// Per-region exponent distribution with fit-quality shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentStats {
    pub quantity: QuantityKind,
    pub stats: DistributionStats,
    /// Share of valid fits whose exponent is positive.
    pub expected_sign_fraction: f64,
    pub mean_r_squared: f64,
    /// Share of valid fits with `p < SIGNIFICANCE_LEVEL`.
    pub significant_fraction: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeCounts {
    pub sr_dominant: usize,
    pub sir_dominant: usize,
    pub critical: usize,
}

impl RegimeCounts {
    pub fn total(&self) -> usize {
        self.sr_dominant + self.sir_dominant + self.critical
    }
}

/// Pearson correlations across regions; `None` when fewer than three regions
/// carry both values or either has no spread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationPanel {
    pub ratio_vs_gamma: Option<f64>,
    pub ratio_vs_chi_max: Option<f64>,
    pub ratio_vs_lead_days: Option<f64>,
    pub gamma_vs_r_squared: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySummary {
    pub regions_total: usize,
    /// Regions with a regime verdict.
    pub regions_classified: usize,
    /// Regions with a valid per-region exponent.
    pub regions_with_exponent: usize,
    pub regime_counts: RegimeCounts,
    pub ratio: Option<DistributionStats>,
    pub gamma: Option<ExponentStats>,
    pub lead_days: Option<DistributionStats>,
    /// Period (days) of each region's strongest low-frequency spectral mode.
    pub dominant_period: Option<DistributionStats>,
    /// Pooled `γ`, `β`, `ν` fits against the regime distance.
    pub cross_region: Vec<ExponentFit>,
    pub scaling: ScalingChecks,
    pub universality: Option<UniversalityMatch>,
    pub correlations: CorrelationPanel,
    /// Excluded regions per exclusion reason.
    pub exclusions: BTreeMap<String, usize>,
    /// Invalid per-region exponents per reason.
    pub invalid_exponents: BTreeMap<String, usize>,
    /// `InsufficientAggregateData` reports for statistics left empty.
    pub insufficient: Vec<String>,
}

/// Reduce per-region records into a study summary.
pub fn summarize(
    records: &[RegionRecord],
    cross_region: &[ExponentFit],
    config: &StudyConfig,
) -> StudySummary {
    let mut insufficient = Vec::new();
    let mut note = |what: &str| {
        insufficient.push(AnalysisError::InsufficientAggregateData(what.to_string()).to_string());
    };

    let mut regime_counts = RegimeCounts::default();
    let mut ratios = Vec::new();
    for r in records {
        if let Some(v) = &r.verdict {
            match v.regime {
                Regime::SrDominant => regime_counts.sr_dominant += 1,
                Regime::SirDominant => regime_counts.sir_dominant += 1,
                Regime::Critical => regime_counts.critical += 1,
            }
            ratios.push((r.region_id.clone(), v.ratio));
        }
    }
    let ratio = DistributionStats::from_labeled(&ratios);
    if ratio.is_none() {
        note("no region has a regime verdict");
    }

    let valid: Vec<(&RegionRecord, &ExponentFit)> = records
        .iter()
        .filter_map(|r| r.exponent.as_ref().filter(|e| e.valid).map(|e| (r, e)))
        .collect();
    let gamma = exponent_stats(QuantityKind::Susceptibility, &valid);
    if gamma.is_none() {
        note("no region has a valid susceptibility exponent");
    }

    let leads: Vec<(String, f64)> = records
        .iter()
        .filter_map(|r| {
            r.critical_point
                .as_ref()
                .map(|cp| (r.region_id.clone(), cp.lead_days as f64))
        })
        .collect();
    let lead_days = DistributionStats::from_labeled(&leads);
    if lead_days.is_none() {
        note("no region has a critical point");
    }

    let periods: Vec<(String, f64)> = records
        .iter()
        .filter_map(|r| {
            let mode = r.spectrum.as_ref()?.dominant_mode()?;
            Some((r.region_id.clone(), mode.period_days))
        })
        .collect();
    let dominant_period = DistributionStats::from_labeled(&periods);
    if dominant_period.is_none() {
        note("no region has a low-frequency spectral mode");
    }

    let pooled = |kind: QuantityKind| {
        cross_region
            .iter()
            .find(|f| f.quantity == kind && f.valid)
            .map(|f| f.exponent)
    };
    let (g, b, n) = (
        pooled(QuantityKind::Susceptibility),
        pooled(QuantityKind::OrderParameter),
        pooled(QuantityKind::CorrelationWidth),
    );
    if g.is_none() || b.is_none() || n.is_none() {
        note("pooled cross-region exponents incomplete; scaling relations left open");
    }
    let scaling = scaling_checks(g, b, n, config.scaling_dimension);

    let universality = match g {
        Some(g) => nearest_class(g, true),
        None => gamma
            .as_ref()
            .and_then(|s| nearest_class(s.stats.median, false)),
    };

    let correlations = correlation_panel(records, &valid);

    let mut exclusions = BTreeMap::new();
    for e in records.iter().flat_map(|r| &r.exclusions) {
        *exclusions.entry(e.reason.label().to_string()).or_insert(0) += 1;
    }
    let mut invalid_exponents = BTreeMap::new();
    for e in records.iter().filter_map(|r| r.exponent.as_ref()) {
        if let Some(reason) = e.invalid_reason {
            *invalid_exponents.entry(format!("{reason:?}")).or_insert(0) += 1;
        }
    }

    StudySummary {
        regions_total: records.len(),
        regions_classified: regime_counts.total(),
        regions_with_exponent: valid.len(),
        regime_counts,
        ratio,
        gamma,
        lead_days,
        dominant_period,
        cross_region: cross_region.to_vec(),
        scaling,
        universality,
        correlations,
        exclusions,
        invalid_exponents,
        insufficient,
    }
}

fn exponent_stats(
    quantity: QuantityKind,
    valid: &[(&RegionRecord, &ExponentFit)],
) -> Option<ExponentStats> {
    let labeled: Vec<(String, f64)> = valid
        .iter()
        .map(|(r, e)| (r.region_id.clone(), e.exponent))
        .collect();
    let stats = DistributionStats::from_labeled(&labeled)?;
    let n = valid.len() as f64;
    let positive = valid.iter().filter(|(_, e)| e.exponent > 0.0).count() as f64;
    let significant = valid
        .iter()
        .filter(|(_, e)| e.p_value.is_some_and(|p| p < SIGNIFICANCE_LEVEL))
        .count() as f64;
    let r2: Vec<f64> = valid.iter().map(|(_, e)| e.r_squared).collect();

    Some(ExponentStats {
        quantity,
        stats,
        expected_sign_fraction: positive / n,
        mean_r_squared: mean(&r2)?,
        significant_fraction: significant / n,
    })
}

fn correlation_panel(
    records: &[RegionRecord],
    valid: &[(&RegionRecord, &ExponentFit)],
) -> CorrelationPanel {
    let (gx, gy): (Vec<f64>, Vec<f64>) = valid
        .iter()
        .filter_map(|(r, e)| r.verdict.as_ref().map(|v| (v.ratio, e.exponent)))
        .unzip();
    let (qx, qy): (Vec<f64>, Vec<f64>) =
        valid.iter().map(|(_, e)| (e.exponent, e.r_squared)).unzip();

    CorrelationPanel {
        ratio_vs_gamma: pearson(&gx, &gy),
        ratio_vs_chi_max: correlate(records, |r| {
            Some((r.verdict.as_ref()?.ratio, r.critical_point.as_ref()?.value))
        }),
        ratio_vs_lead_days: correlate(records, |r| {
            Some((
                r.verdict.as_ref()?.ratio,
                r.critical_point.as_ref()?.lead_days as f64,
            ))
        }),
        gamma_vs_r_squared: pearson(&qx, &qy),
    }
}

fn correlate<F>(records: &[RegionRecord], pair: F) -> Option<f64>
where
    F: Fn(&RegionRecord) -> Option<(f64, f64)>,
{
    let (xs, ys): (Vec<f64>, Vec<f64>) = records.iter().filter_map(pair).unzip();
    pearson(&xs, &ys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Exclusion, ExclusionReason, InvalidReason, Observable, RegimeVerdict, SpectralMode,
        Stage, SusceptibilitySpectrum,
    };
    use crate::fit::classify_rms;

    fn record(id: &str, verdict: Option<RegimeVerdict>) -> RegionRecord {
        RegionRecord {
            region_id: id.into(),
            name: id.into(),
            sr_fit: None,
            sir_fit: None,
            verdict,
            signal: None,
            critical_point: None,
            exponent: None,
            spectrum: None,
            exclusions: vec![],
        }
    }

    fn exponent(value: f64, r2: f64, p: f64) -> ExponentFit {
        ExponentFit {
            region_id: None,
            quantity: QuantityKind::Susceptibility,
            branch: None,
            convention: None,
            exponent: value,
            std_error: Some(0.1),
            r_squared: r2,
            p_value: Some(p),
            intercept: 0.0,
            n_points: 10,
            valid: true,
            invalid_reason: None,
            invalid_detail: None,
        }
    }

    #[test]
    fn two_region_counts_and_median() {
        let records = vec![
            record("A", Some(classify_rms("A", 1.0, 2.0, 0.0).unwrap())),
            record("B", Some(classify_rms("B", 1.0, 0.9, 0.0).unwrap())),
        ];
        let summary = summarize(&records, &[], &StudyConfig::default());
        assert_eq!(
            summary.regime_counts,
            RegimeCounts {
                sr_dominant: 1,
                sir_dominant: 1,
                critical: 0
            }
        );
        let ratio = summary.ratio.unwrap();
        assert_eq!(ratio.median, 1.45);
        assert_eq!(ratio.max_region, "A");
        assert_eq!(ratio.min_region, "B");
    }

    #[test]
    fn empty_input_reports_insufficient_data() {
        let summary = summarize(&[], &[], &StudyConfig::default());
        assert_eq!(summary.regions_total, 0);
        assert!(summary.ratio.is_none());
        assert!(summary.gamma.is_none());
        assert!(!summary.insufficient.is_empty());
        assert!(summary.insufficient[0].contains("insufficient aggregate data"));
        assert!(summary.universality.is_none());
    }

    #[test]
    fn only_valid_exponents_are_aggregated() {
        let mut a = record("A", None);
        a.exponent = Some(exponent(1.2, 0.9, 0.01));
        let mut b = record("B", None);
        b.exponent = Some(exponent(-0.4, 0.5, 0.2));
        let mut c = record("C", None);
        let mut bad = exponent(f64::NAN, 0.0, 1.0);
        bad.valid = false;
        bad.invalid_reason = Some(InvalidReason::EmptyBranch);
        c.exponent = Some(bad);
        c.exclusions.push(Exclusion {
            stage: Stage::ModelFit,
            reason: ExclusionReason::FitDivergence,
            message: "did not converge".into(),
        });

        let summary = summarize(&[a, b, c], &[], &StudyConfig::default());
        let gamma = summary.gamma.unwrap();
        assert_eq!(gamma.stats.n, 2);
        assert!((gamma.stats.mean - 0.4).abs() < 1e-12);
        assert_eq!(gamma.expected_sign_fraction, 0.5);
        assert_eq!(gamma.significant_fraction, 0.5);
        assert_eq!(summary.exclusions.get("FitDivergence"), Some(&1));
        assert_eq!(summary.invalid_exponents.get("EmptyBranch"), Some(&1));
        // Falls back to the per-region median when nothing is pooled.
        let u = summary.universality.unwrap();
        assert!(!u.pooled);
    }

    #[test]
    fn pooled_exponents_feed_scaling_checks() {
        let mut g = exponent(1.75, 0.8, 0.01);
        g.quantity = QuantityKind::Susceptibility;
        let mut b = exponent(0.125, 0.8, 0.01);
        b.quantity = QuantityKind::OrderParameter;
        let mut n = exponent(1.0, 0.8, 0.01);
        n.quantity = QuantityKind::CorrelationWidth;
        let config = StudyConfig {
            scaling_dimension: 2.0,
            ..StudyConfig::default()
        };

        let summary = summarize(&[], &[g, b, n], &config);
        assert!(summary.scaling.rushbrooke_deviation.unwrap().abs() < 1e-12);
        let u = summary.universality.unwrap();
        assert!(u.pooled);
        assert_eq!(u.class, crate::study::UniversalityClass::Ising2d);
    }

    #[test]
    fn dominant_periods_come_from_spectra() {
        let spectrum = |period: f64| SusceptibilitySpectrum {
            region_id: String::new(),
            observable: Observable::DcDiff,
            n_fft: 4096,
            points: vec![],
            modes: vec![
                SpectralMode {
                    frequency: 1.0 / period,
                    period_days: period,
                    power: 9.0,
                },
                SpectralMode {
                    frequency: 0.1,
                    period_days: 10.0,
                    power: 1.0,
                },
            ],
        };
        let mut a = record("A", None);
        a.spectrum = Some(spectrum(40.0));
        let mut b = record("B", None);
        b.spectrum = Some(spectrum(20.0));
        let c = record("C", None);

        let summary = summarize(&[a, b, c], &[], &StudyConfig::default());
        let periods = summary.dominant_period.unwrap();
        assert_eq!(periods.n, 2);
        assert_eq!(periods.mean, 30.0);
        assert_eq!(periods.max_region, "A");
    }
}
