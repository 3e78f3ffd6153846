//! Command-line parsing for the critical-exponent study.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::data::RegionGroup;
use crate::domain::{Branch, DistanceConvention, Observable};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "epi-critical",
    version,
    about = "Critical exponents of an epidemic SR/SIR transition"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze regions from a daily hospital CSV.
    Analyze(AnalyzeArgs),
    /// Run the full study on reproducible synthetic regions.
    Demo(DemoArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct AnalyzeArgs {
    /// Daily hospital CSV (`dep;sexe;jour;hosp;rea;...;dc`).
    #[arg(long, value_name = "CSV")]
    pub csv: PathBuf,

    /// Optional region metadata CSV (`id,name,population,area_km2`).
    #[arg(long, value_name = "CSV")]
    pub metadata: Option<PathBuf>,

    /// Only analyze these region ids (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub regions: Vec<String>,

    /// Analyze several regions as one, summing their series (repeatable).
    #[arg(long = "group", value_name = "NAME=ID,ID,...")]
    pub groups: Vec<RegionGroup>,

    #[command(flatten)]
    pub study: StudyArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Number of synthetic regions.
    #[arg(long = "regions", default_value_t = 12)]
    pub region_count: usize,

    /// Random seed for the synthetic waves and noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Days per synthetic series.
    #[arg(long, default_value_t = 105)]
    pub days: usize,

    /// Log-normal noise sigma.
    #[arg(long, default_value_t = 0.15)]
    pub noise: f64,

    #[command(flatten)]
    pub study: StudyArgs,
}

/// Options shared by every study command.
#[derive(Debug, Args, Clone)]
pub struct StudyArgs {
    /// Observable for the susceptibility signal.
    #[arg(long, value_enum, default_value_t = Observable::HospDiff)]
    pub observable: Observable,

    /// Observable the SR and SIR models are fitted to.
    #[arg(long, value_enum, default_value_t = Observable::DcDiff)]
    pub fit_observable: Observable,

    /// Rolling variance window (days).
    #[arg(short = 'w', long, default_value_t = 7)]
    pub window: usize,

    /// Half-width of the critical band around ratio 1.
    #[arg(long, default_value_t = 0.0)]
    pub tolerance: f64,

    /// Minimum branch points for a valid exponent.
    #[arg(long, default_value_t = 5)]
    pub min_points: usize,

    /// Optimiser iteration budget per model fit.
    #[arg(long, default_value_t = 200)]
    pub max_iter: usize,

    /// Number of SR modes (1-4).
    #[arg(long, default_value_t = 2)]
    pub sr_modes: usize,

    /// Centred moving-average length applied to observables (1 = off).
    #[arg(long, default_value_t = 1)]
    pub smoothing: usize,

    /// Side of the critical point used for the exponent.
    #[arg(long, value_enum, default_value_t = Branch::Ascending)]
    pub branch: Branch,

    /// How the distance to the critical point is measured.
    #[arg(long, value_enum, default_value_t = DistanceConvention::ToCritical)]
    pub distance: DistanceConvention,

    /// SIR population for regions without one.
    #[arg(long, default_value_t = 5e5)]
    pub population: f64,

    /// Spatial dimension in the hyperscaling relation.
    #[arg(long, default_value_t = 3.0)]
    pub dimension: f64,

    /// Regions closer than this to ratio 1 are left out of cross-region fits.
    #[arg(long, default_value_t = 0.01)]
    pub min_distance: f64,

    /// Start-grid steps for SR mode centres.
    #[arg(long, default_value_t = 8)]
    pub center_steps: usize,

    /// Start-grid steps for SR widths and SIR rates.
    #[arg(long, default_value_t = 5)]
    pub width_steps: usize,

    /// Start-grid steps for the SIR shift.
    #[arg(long, default_value_t = 4)]
    pub shift_steps: usize,

    /// Zero-padded FFT length for the spectrum.
    #[arg(long, default_value_t = 4096)]
    pub fft_len: usize,

    /// First date to analyze (YYYY-MM-DD).
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last date to analyze (YYYY-MM-DD).
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Show top-N regions on each side of the transition.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Skip the per-region table.
    #[arg(long)]
    pub quiet: bool,

    /// Export per-region results to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the study summary to JSON.
    #[arg(long = "export-summary")]
    pub export_summary: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_analyze_with_options() {
        let cli = Cli::parse_from([
            "epi-critical",
            "analyze",
            "--csv",
            "donnees.csv",
            "--regions",
            "75,13",
            "--observable",
            "rea",
            "--distance",
            "since_onset",
            "--start",
            "2020-03-18",
        ]);
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.regions, vec!["75", "13"]);
        assert_eq!(args.study.observable, Observable::Rea);
        assert_eq!(args.study.distance, DistanceConvention::SinceOnset);
        assert_eq!(args.study.window, 7);
        assert_eq!(args.study.start, NaiveDate::from_ymd_opt(2020, 3, 18));
        assert!(args.groups.is_empty());
    }

    #[test]
    fn parses_repeated_groups() {
        let cli = Cli::parse_from([
            "epi-critical",
            "analyze",
            "--csv",
            "donnees.csv",
            "--group",
            "Grand Est=08,10,51,52,54,55,57,67,68,88",
            "--group",
            "Île-de-France=75,77,78,91,92,93,94,95",
        ]);
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.groups.len(), 2);
        assert_eq!(args.groups[0].name, "Grand Est");
        assert_eq!(args.groups[0].members.len(), 10);
        assert_eq!(args.groups[1].members[0], "75");
    }

    #[test]
    fn demo_defaults() {
        let cli = Cli::parse_from(["epi-critical", "demo"]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.region_count, 12);
        assert_eq!(args.study.fit_observable, Observable::DcDiff);
    }
}
