//! Study-level aggregation over all regions.

pub mod aggregate;
pub mod scaling;

pub use aggregate::*;
pub use scaling::*;
