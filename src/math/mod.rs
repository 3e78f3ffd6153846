//! Mathematical utilities: least squares, regression, statistics, special functions.

pub mod ols;
pub mod regression;
pub mod special;
pub mod stats;

pub use ols::*;
pub use regression::*;
pub use special::*;
pub use stats::*;
