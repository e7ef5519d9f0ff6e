pub mod stopwatch;

pub use stopwatch::{Deadline, Stopwatch};
