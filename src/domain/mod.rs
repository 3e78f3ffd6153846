//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - configuration enums (`Observable`, `Branch`, `DistanceConvention`) and `StudyConfig`
//! - the per-region input (`Region`, `ObservableSeries`)
//! - per-region outputs (`ModelFitResult`, `RegimeVerdict`, `SusceptibilitySignal`,
//!   `CriticalPoint`, `ExponentFit`, `RegionRecord`)

pub mod types;

pub use types::*;
