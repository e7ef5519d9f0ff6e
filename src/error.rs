use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutopipeError {
    /// Malformed or type-mismatched tree. Never expected for individuals
    /// produced by the generator and mutation operators.
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Evaluation failure: {0}")]
    Evaluation(String),

    #[error("Time budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Model has not been fitted")]
    NotFitted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AutopipeError>;
