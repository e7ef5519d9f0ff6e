pub mod catalog;
pub mod dummy;
pub mod forest;
pub mod linear;
pub mod naive_bayes;
pub mod neighbors;
pub mod preprocessing;
pub mod registry;
pub mod traits;
pub mod tree;

pub use catalog::{Catalog, PrimitiveDef, Terminal};
pub use registry::{Component, ComponentKind, ComponentRegistry, ComponentSpec, Params};
pub use traits::{BuildContext, Estimator, FitContext, Interrupted, Transformer};
