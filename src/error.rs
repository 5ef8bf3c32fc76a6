//! Error taxonomy for the training pipeline.
//!
//! Every failure is fatal and surfaced to the caller unchanged; nothing here is retried.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, fitting, or exporting a clustering model.
#[derive(Debug, Error)]
pub enum TrainError {
    /// A required input file does not exist.
    #[error("Input file not found: {}", path.display())]
    NotFound {
        /// Path that was checked before parsing
        path: PathBuf,
    },

    /// A loaded table lacks a required column.
    #[error("Table '{table}' is missing required column '{column}'")]
    Validation { table: String, column: String },

    /// The activity/sleep join produced no rows.
    ///
    /// Usually the two sources disagree on date format, timezone or granularity.
    #[error("Merged dataset is empty; check that both sources use compatible date formats")]
    EmptyResult,

    /// One or more feature columns are absent after the merge.
    #[error("Missing feature columns: {}", columns.join(", "))]
    MissingColumns {
        /// Every absent column, in configured order
        columns: Vec<String>,
    },

    /// Requested cluster count is zero or exceeds the number of training rows.
    #[error("Invalid cluster count {k}: must be between 1 and the number of training examples ({n_samples})")]
    InvalidClusterCount { k: usize, n_samples: usize },

    /// An operation that needs a fitted estimator ran before `fit`.
    #[error("{what} has not been fitted")]
    NotFitted { what: &'static str },

    /// A date cell could not be parsed by any supported format.
    #[error("Column '{column}' holds an unrecognized date: '{value}'")]
    InvalidDate { column: String, value: String },

    /// A feature cell is present but does not hold a number.
    #[error("Feature column '{column}' holds a non-numeric value: '{value}'")]
    InvalidNumber { column: String, value: String },

    /// Feature width does not match what the estimator was fitted on.
    #[error("Dimension mismatch: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Configuration rejected before any work started.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A model bundle written by an incompatible version.
    #[error("Unsupported model bundle format version {found} (expected {expected})")]
    IncompatibleBundle { found: u32, expected: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
