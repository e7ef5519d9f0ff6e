pub mod evolution_engine;
pub mod hall_of_fame;
pub mod individual;
pub mod operators;
pub mod pareto;
pub mod parser;
pub mod progress;

pub use evolution_engine::{EvaluationCounts, EvolutionEngine, ProgressCallback, SearchContext};
pub use hall_of_fame::{HallOfFame, TieBreak};
pub use individual::{find_unmatched_terminal, Individual, Node};
pub use operators::MutationKind;
pub use pareto::OptimizationDirection;
pub use parser::parse_individual;
pub use progress::{ChannelProgressCallback, LogProgressCallback, ProgressMessage};
