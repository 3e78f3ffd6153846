//! Model fitting and SR/SIR comparison.
//!
//! Responsibilities:
//!
//! - generate start grids for the SR and SIR nonlinear parameters
//! - evaluate each start point (parallel) and refine the best one
//! - classify each region's regime from the two fits

pub mod fitter;
pub mod regime;
pub mod start_grid;

pub use fitter::*;
pub use regime::*;
pub use start_grid::*;
