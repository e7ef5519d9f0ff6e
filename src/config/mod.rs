pub mod catalog;
pub mod ensemble;
pub mod evaluation;
pub mod manager;
pub mod search;
pub mod traits;

pub use catalog::CatalogConfig;
pub use ensemble::{EnsembleConfig, Weighting};
pub use evaluation::EvaluationConfig;
pub use manager::{AppConfig, ConfigManager};
pub use search::{MutationWeights, SearchConfig};
pub use traits::ConfigSection;
