//! Shared study pipeline used by the `analyze` and `demo` commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! regions -> SR/SIR fits -> regime -> spectrum + susceptibility -> exponent -> join ->
//! cross-region exponents -> summary
//!
//! Regions are processed with a parallel map; each produces an immutable
//! `RegionRecord` and failures stay inside that record as exclusions.

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::critical::{analyze, estimate, estimate_cross_region, spectrum};
use crate::data::TimeSeriesStore;
use crate::domain::{
    Exclusion, ExponentFit, ModelKind, QuantityKind, Region, RegionRecord, Stage, StudyConfig,
};
use crate::error::{AnalysisError, AnalysisResult};
use crate::fit::{FitOptions, GridSpec, classify, fit_model};
use crate::study::{StudySummary, summarize};

/// All computed outputs of a single study run.
#[derive(Debug, Clone)]
pub struct StudyOutput {
    pub records: Vec<RegionRecord>,
    pub cross_region: Vec<ExponentFit>,
    pub summary: StudySummary,
}

/// Run every stage on every region, then aggregate.
///
/// Only configuration errors and an empty store abort the run.
pub fn run_study(store: &TimeSeriesStore, config: &StudyConfig) -> AnalysisResult<StudyOutput> {
    config.validate()?;
    if store.is_empty() {
        return Err(AnalysisError::EmptyStudy(
            "the store contains no regions".to_string(),
        ));
    }
    info!(
        "analyzing {} regions (fit on {}, susceptibility on {}, window {})",
        store.len(),
        config.fit_observable.label(),
        config.observable.label(),
        config.window
    );

    let regions: Vec<&Region> = store.regions().collect();
    let records: Vec<RegionRecord> = regions
        .par_iter()
        .map(|region| analyze_region(region, config))
        .collect();

    for record in &records {
        for e in &record.exclusions {
            warn!(
                "region {} excluded at {:?}: {}",
                record.region_id, e.stage, e.message
            );
        }
    }

    let cross_region = cross_region_fits(&records, config);
    let summary = summarize(&records, &cross_region, config);
    for note in &summary.insufficient {
        warn!("{note}");
    }
    info!(
        "{} regions classified, {} with a valid exponent",
        summary.regions_classified, summary.regions_with_exponent
    );

    Ok(StudyOutput {
        records,
        cross_region,
        summary,
    })
}

/// Model fits, regime and susceptibility exponent for one region.
pub fn analyze_region(region: &Region, config: &StudyConfig) -> RegionRecord {
    let region = if config.start.is_some() || config.end.is_some() {
        region.restricted(config.start, config.end)
    } else {
        region.clone()
    };

    let mut record = RegionRecord {
        region_id: region.id.clone(),
        name: region.name.clone(),
        sr_fit: None,
        sir_fit: None,
        verdict: None,
        signal: None,
        critical_point: None,
        exponent: None,
        spectrum: None,
        exclusions: Vec::new(),
    };

    fit_stage(&region, config, &mut record);
    susceptibility_stage(&region, config, &mut record);
    record
}

fn fit_stage(region: &Region, config: &StudyConfig, record: &mut RegionRecord) {
    let series = match region.observable(config.fit_observable, config.smoothing) {
        Ok(s) => s,
        Err(e) => {
            record.exclusions.push(Exclusion::from_error(Stage::ModelFit, &e));
            return;
        }
    };
    let opts = FitOptions {
        max_iterations: config.max_iterations,
        grid: GridSpec {
            center_steps: config.center_steps,
            width_steps: config.width_steps,
            shift_steps: config.shift_steps,
        },
        population: region.population.unwrap_or(config.default_population),
    };

    let sr = fit_model(ModelKind::Sr { modes: config.sr_modes }, &series, &opts);
    let sir = fit_model(ModelKind::Sir, &series, &opts);
    match (sr, sir) {
        (Ok(sr), Ok(sir)) => {
            match classify(&sr, &sir, config.tolerance) {
                Ok(v) => {
                    debug!("region {}: ratio {:.4} ({})", region.id, v.ratio, v.regime.label());
                    record.verdict = Some(v);
                }
                Err(e) => record.exclusions.push(Exclusion::from_error(Stage::ModelFit, &e)),
            }
            record.sr_fit = Some(sr);
            record.sir_fit = Some(sir);
        }
        (sr, sir) => {
            for e in [sr.as_ref().err(), sir.as_ref().err()].into_iter().flatten() {
                record.exclusions.push(Exclusion::from_error(Stage::ModelFit, e));
            }
            record.sr_fit = sr.ok();
            record.sir_fit = sir.ok();
        }
    }
}

fn susceptibility_stage(region: &Region, config: &StudyConfig, record: &mut RegionRecord) {
    let series = match region.observable(config.observable, config.smoothing) {
        Ok(s) => s,
        Err(e) => {
            record
                .exclusions
                .push(Exclusion::from_error(Stage::Susceptibility, &e));
            return;
        }
    };

    match spectrum(&series, config.fft_len) {
        Ok(s) => {
            if let Some(m) = s.dominant_mode() {
                debug!(
                    "region {}: dominant mode f={:.4}/day (T={:.1} days)",
                    region.id, m.frequency, m.period_days
                );
            }
            record.spectrum = Some(s);
        }
        Err(e) => record
            .exclusions
            .push(Exclusion::from_error(Stage::Spectrum, &e)),
    }

    match analyze(&series, config.window) {
        Ok((signal, cp)) => {
            let fit = estimate(
                &signal,
                &cp,
                config.branch,
                config.min_branch_points,
                config.convention,
            );
            if let Some(detail) = &fit.invalid_detail {
                debug!("region {}: no exponent ({detail})", region.id);
            }
            record.exponent = Some(fit);
            record.signal = Some(signal);
            record.critical_point = Some(cp);
        }
        Err(e) => record
            .exclusions
            .push(Exclusion::from_error(Stage::Susceptibility, &e)),
    }
}

/// Pooled `γ`, `β`, `ν` against the regime distance `r` of each region.
///
/// - `γ`: peak susceptibility `χ_max`
/// - `β`: amplitude of the dominant SR mode
/// - `ν`: width of the dominant SR mode
pub fn cross_region_fits(records: &[RegionRecord], config: &StudyConfig) -> Vec<ExponentFit> {
    let mut chi = Vec::new();
    let mut amplitude = Vec::new();
    let mut width = Vec::new();
    for r in records {
        let Some(v) = &r.verdict else { continue };
        if let Some(cp) = &r.critical_point {
            chi.push((v.distance, cp.value));
        }
        if let Some(mode) = r.sr_fit.as_ref().and_then(|f| f.dominant_mode()) {
            amplitude.push((v.distance, mode.amplitude));
            width.push((v.distance, mode.width));
        }
    }

    [
        (QuantityKind::Susceptibility, chi),
        (QuantityKind::OrderParameter, amplitude),
        (QuantityKind::CorrelationWidth, width),
    ]
    .into_iter()
    .map(|(kind, samples)| {
        estimate_cross_region(
            &samples,
            kind,
            config.min_branch_points,
            config.min_regime_distance,
        )
    })
    .collect()
}
