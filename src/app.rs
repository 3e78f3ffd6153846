//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - initialises logging
//! - parses CLI arguments
//! - loads (or generates) regions
//! - runs the study pipeline
//! - prints reports and writes optional exports

use clap::Parser;
use log::{info, warn};

use crate::cli::{AnalyzeArgs, Command, DemoArgs, StudyArgs};
use crate::data::{SyntheticConfig, TimeSeriesStore, generate_regions};
use crate::domain::StudyConfig;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `epi-critical` binary.
pub fn run() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Demo(args) => handle_demo(args),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<(), AppError> {
    let metadata = args
        .metadata
        .as_deref()
        .map(crate::io::load_region_metadata)
        .transpose()?;
    // Group members must survive the region filter.
    let mut wanted = args.regions.clone();
    if !wanted.is_empty() {
        wanted.extend(args.groups.iter().flat_map(|g| g.members.iter().cloned()));
    }
    let mut ingest = crate::io::load_hospital_csv(&args.csv, &wanted, metadata.as_ref())?;
    for e in ingest.row_errors.iter().take(5) {
        warn!(
            "line {} ({}): {}",
            e.line,
            e.region.as_deref().unwrap_or("-"),
            e.message
        );
    }
    if ingest.row_errors.len() > 5 {
        warn!("... {} more row errors", ingest.row_errors.len() - 5);
    }

    for group in &args.groups {
        ingest.store.merge_regions(group)?;
        info!(
            "merged {} regions into '{}'",
            group.members.len(),
            group.name
        );
    }

    let source = args.csv.display().to_string();
    run_and_report(&ingest.store, &args.study, &source)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let synthetic = SyntheticConfig {
        regions: args.region_count,
        days: args.days,
        seed: args.seed,
        noise_sigma: args.noise,
        ..SyntheticConfig::default()
    };
    let regions = generate_regions(&synthetic)?;
    let store = TimeSeriesStore::from_regions(regions)?;
    info!("generated {} synthetic regions (seed {})", store.len(), args.seed);

    let source = format!("synthetic seed={}", args.seed);
    run_and_report(&store, &args.study, &source)
}

fn run_and_report(store: &TimeSeriesStore, args: &StudyArgs, source: &str) -> Result<(), AppError> {
    let config = study_config_from_args(args);
    let output = pipeline::run_study(store, &config)?;

    println!("{}", crate::report::format_run_header(&config, source, store.len()));
    if !args.quiet {
        println!("{}", crate::report::format_region_table(&output.records));
    }
    println!("{}", crate::report::format_summary(&output.summary));
    if args.top > 0 {
        let rankings = crate::report::rank_by_ratio(&output.records, args.top);
        println!("{}", crate::report::format_rankings(&rankings));
    }

    // Optional exports.
    if let Some(path) = &args.export {
        crate::io::write_results_csv(path, &output.records)?;
        info!("wrote per-region results to {}", path.display());
    }
    if let Some(path) = &args.export_summary {
        crate::io::write_summary_json(path, &output.summary, &config)?;
        info!("wrote summary to {}", path.display());
    }

    Ok(())
}

pub fn study_config_from_args(args: &StudyArgs) -> StudyConfig {
    StudyConfig {
        observable: args.observable,
        fit_observable: args.fit_observable,
        window: args.window,
        tolerance: args.tolerance,
        min_branch_points: args.min_points,
        max_iterations: args.max_iter,
        sr_modes: args.sr_modes,
        smoothing: args.smoothing,
        branch: args.branch,
        convention: args.distance,
        default_population: args.population,
        scaling_dimension: args.dimension,
        min_regime_distance: args.min_distance,
        center_steps: args.center_steps,
        width_steps: args.width_steps,
        shift_steps: args.shift_steps,
        fft_len: args.fft_len,
        start: args.start,
        end: args.end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    #[test]
    fn cli_defaults_match_study_defaults() {
        let cli = Cli::parse_from(["epi-critical", "demo"]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        let from_cli = study_config_from_args(&args.study);
        let defaults = StudyConfig::default();
        assert_eq!(
            serde_json::to_value(&from_cli).unwrap(),
            serde_json::to_value(&defaults).unwrap()
        );
    }
}
