//! `epi-critical` library crate.
//!
//! The binary (`epi-critical`) is a thin wrapper around this library so that:
//!
//! - the numerical core is testable without spawning processes
//! - the pipeline can be driven from other front-ends or notebooks
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod critical;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod study;
