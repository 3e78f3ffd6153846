//! Error types.
//!
//! - `AnalysisError`: the per-region / per-study failure taxonomy. Region-level
//!   variants are recovered by the pipeline and recorded as exclusions.
//! - `AppError`: top-level failure with a process exit code (used by the binary).

use thiserror::Error;

/// Failures raised by the numerical core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Model optimisation did not converge or left the valid parameter ranges.
    #[error("fit diverged: {0}")]
    FitDivergence(String),

    /// Zero-variance, too-short or otherwise unusable observable series.
    #[error("degenerate series: {0}")]
    DegenerateSeries(String),

    /// Not enough points on the requested branch for a regression.
    #[error("insufficient branch points: {found} < {required}")]
    InsufficientBranchPoints { found: usize, required: usize },

    /// No valid per-region input reached the aggregator.
    #[error("insufficient aggregate data: {0}")]
    InsufficientAggregateData(String),

    /// The study contains no regions at all.
    #[error("empty study: {0}")]
    EmptyStudy(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        let code = match err {
            AnalysisError::InvalidConfig(_) | AnalysisError::EmptyStudy(_) => 2,
            AnalysisError::DegenerateSeries(_)
            | AnalysisError::InsufficientBranchPoints { .. }
            | AnalysisError::InsufficientAggregateData(_) => 3,
            AnalysisError::FitDivergence(_) => 4,
        };
        AppError::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_errors_map_to_exit_codes() {
        let e: AppError = AnalysisError::EmptyStudy("no regions".into()).into();
        assert_eq!(e.exit_code(), 2);
        let e: AppError = AnalysisError::FitDivergence("nan".into()).into();
        assert_eq!(e.exit_code(), 4);
        assert!(e.to_string().contains("fit diverged"));
    }
}
