pub mod csv;
pub mod dataset;
pub mod folds;
pub mod imputer;

pub use csv::CsvConnector;
pub use dataset::{Dataset, LabelEncoder};
pub use folds::{kfold, stratified_kfold, Fold};
pub use imputer::MeanImputer;
