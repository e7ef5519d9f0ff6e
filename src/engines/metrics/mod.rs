pub mod scoring;

pub use scoring::Metric;
