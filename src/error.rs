use thiserror::Error;

/// Caller contract violations. Data problems and empty filter results are
/// recovered where they happen and never surface here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error("risk score must be within 0..=100, got {0}")]
    InvalidRiskScore(i64),

    #[error("time horizon must be a positive number of years, got {0}")]
    InvalidHorizon(i64),

    #[error("iteration count must be positive, got {0}")]
    InvalidIterations(i64),

    #[error("steps per year must be positive, got {0}")]
    InvalidStepsPerYear(i64),

    #[error("initial investment must be a positive finite amount, got {0}")]
    InvalidInitialInvestment(f64),

    #[error("ticker {0} is not part of the asset universe")]
    UnknownTicker(String),
}

pub type Result<T> = std::result::Result<T, StrategyError>;
