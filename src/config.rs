//! Training configuration.
//!
//! Former module-level constants (input paths, output paths, feature order) live here and are
//! passed explicitly into [`crate::train`].

use crate::error::TrainError;
use std::path::{Path, PathBuf};

/// Number of features in every feature vector.
pub const FEATURE_COUNT: usize = 3;

/// Column names used to join and featurize the two source tables.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnConfig {
    /// Subject identifier, present in both tables
    pub id: String,
    /// Date column of the activity table; also the join key name after the merge
    pub activity_date: String,
    /// Date column of the sleep table, renamed to `activity_date` before joining
    pub sleep_date: String,
    /// Feature columns in vector order: steps, minutes asleep, calories
    pub features: [String; FEATURE_COUNT],
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            id: "Id".to_string(),
            activity_date: "ActivityDate".to_string(),
            sleep_date: "SleepDay".to_string(),
            features: [
                "TotalSteps".to_string(),
                "TotalMinutesAsleep".to_string(),
                "Calories".to_string(),
            ],
        }
    }
}

impl ColumnConfig {
    pub fn feature_names(&self) -> Vec<String> {
        self.features.to_vec()
    }
}

/// Everything a single training run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    /// Daily activity table (steps, calories)
    pub activity_path: PathBuf,
    /// Daily sleep table (minutes asleep)
    pub sleep_path: PathBuf,
    /// Directory receiving all artifacts
    pub output_dir: PathBuf,
    pub model_file: String,
    pub scaler_file: String,
    pub centroids_file: String,
    pub columns: ColumnConfig,
    /// Requested number of clusters (k)
    pub clusters: usize,
    /// Seed for k-means++ initialization
    pub seed: u64,
    /// Number of k-means restarts; the lowest-inertia run wins
    pub n_init: usize,
    /// Hard cap on Lloyd iterations per restart
    pub max_iters: usize,
    /// Relative convergence tolerance on centroid movement
    pub tolerance: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            activity_path: data_dir.join("stepAndCalories.csv"),
            sleep_path: data_dir.join("sleepDay_merged.csv"),
            output_dir: PathBuf::from("App_Data"),
            model_file: "kmeans_model.json".to_string(),
            scaler_file: "kmeans_scaler.json".to_string(),
            centroids_file: "kmeans_centroids.json".to_string(),
            columns: ColumnConfig::default(),
            clusters: 4,
            seed: 42,
            n_init: 10,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

impl TrainConfig {
    /// Reject settings that would make the run meaningless before touching any file.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.n_init == 0 {
            return Err(TrainError::InvalidConfig("n_init must be at least 1".to_string()));
        }
        if self.max_iters == 0 {
            return Err(TrainError::InvalidConfig("max_iters must be at least 1".to_string()));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(TrainError::InvalidConfig(format!(
                "tolerance must be a non-negative finite number, got {}",
                self.tolerance
            )));
        }
        if self.columns.activity_date == self.columns.id {
            return Err(TrainError::InvalidConfig(
                "date and id columns must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn model_path(&self) -> PathBuf {
        self.output_dir.join(&self.model_file)
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.output_dir.join(&self.scaler_file)
    }

    pub fn centroids_path(&self) -> PathBuf {
        self.output_dir.join(&self.centroids_file)
    }

    /// Same configuration writing into another directory.
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }
}
