//! SleepForge: K-Means clustering over merged daily activity and sleep records
//!
//! This library joins an activity table and a sleep table on (subject, date), standardizes
//! the (steps, minutes asleep, calories) features, fits K-Means and exports the fitted model
//! both as a reloadable bundle and as plain JSON records for downstream scorers.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod scaler;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{ColumnConfig, TrainConfig, FEATURE_COUNT};
pub use data::{load_training_data, merge_tables, extract_features, TrainingData};
pub use error::TrainError;
pub use export::{export_artifacts, ArtifactPaths, CentroidsRecord, ScalerRecord};
pub use model::{fit_kmeans, KMeans, KMeansModel, KMeansParams};
pub use pipeline::{fit_pipeline, train, ClusterPipeline, TrainingReport};
pub use scaler::{ScalerParameters, StandardScaler};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, TrainError>;
