//! Reporting utilities: region rankings and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::RegionRecord;

/// Regions furthest from the transition on each side (top-N each side).
#[derive(Debug, Clone)]
pub struct Rankings {
    /// Largest `RMS_SIR / RMS_SR` first.
    pub sr_leaning: Vec<RegionRecord>,
    /// Smallest `RMS_SIR / RMS_SR` first.
    pub sir_leaning: Vec<RegionRecord>,
}

/// Rank classified regions by dominance ratio.
pub fn rank_by_ratio(records: &[RegionRecord], top_n: usize) -> Rankings {
    let mut sorted: Vec<&RegionRecord> = records.iter().filter(|r| r.verdict.is_some()).collect();
    let ratio = |r: &RegionRecord| r.verdict.as_ref().map_or(f64::NAN, |v| v.ratio);
    sorted.sort_by(|a, b| ratio(b).total_cmp(&ratio(a)));

    let sr_leaning = sorted.iter().take(top_n).map(|r| (*r).clone()).collect();
    let sir_leaning = sorted.iter().rev().take(top_n).map(|r| (*r).clone()).collect();

    Rankings {
        sr_leaning,
        sir_leaning,
    }
}
