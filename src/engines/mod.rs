pub mod ensemble;
pub mod evaluation;
pub mod generation;
pub mod metrics;
