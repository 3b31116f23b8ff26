//! Training data input and result export.

pub mod dataset;
pub mod export;

pub use dataset::TrainingFrame;
pub use export::{export_csv, export_json, write_csv, ResultRow};
