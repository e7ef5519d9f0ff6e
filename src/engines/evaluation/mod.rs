pub mod compiler;
pub mod pipeline;
pub mod scheduler;

pub use compiler::compile_individual;
pub use pipeline::Pipeline;
pub use scheduler::{EvaluatedIndividual, EvaluationData, EvaluationScheduler, EvaluationState};
