//! Input/output helpers.
//!
//! - hospital CSV + region metadata ingest (`ingest`)
//! - result exports (CSV/JSON) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
