pub mod automl;
pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod functions;
pub mod types;
pub mod utils;

pub use automl::{AutoPipeline, SearchReport};
pub use config::AppConfig;
pub use error::{AutopipeError, Result};
pub use types::Task;
