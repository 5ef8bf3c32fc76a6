//! Command-line interface definitions and argument parsing

use crate::config::TrainConfig;
use crate::error::TrainError;
use clap::Parser;
use std::path::PathBuf;

/// Train K-Means on merged daily activity and sleep data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the daily activity CSV (steps, calories)
    #[arg(long, env = "SLEEPFORGE_ACTIVITY_FILE", default_value = "data/stepAndCalories.csv")]
    pub activity: PathBuf,

    /// Path to the daily sleep CSV (minutes asleep)
    #[arg(long, env = "SLEEPFORGE_SLEEP_FILE", default_value = "data/sleepDay_merged.csv")]
    pub sleep: PathBuf,

    /// Directory receiving the model bundle and JSON exports
    #[arg(short, long, env = "SLEEPFORGE_OUTPUT_DIR", default_value = "App_Data")]
    pub output_dir: PathBuf,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Seed for centroid initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of K-Means restarts
    #[arg(long, default_value = "10")]
    pub n_init: usize,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Prediction mode: provide steps,minutes-asleep,calories as comma-separated string
    /// Example: --predict "10000,420,2100"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Build the training configuration these arguments describe.
    pub fn to_config(&self) -> TrainConfig {
        TrainConfig {
            activity_path: self.activity.clone(),
            sleep_path: self.sleep.clone(),
            output_dir: self.output_dir.clone(),
            clusters: self.clusters,
            seed: self.seed,
            n_init: self.n_init,
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            ..TrainConfig::default()
        }
    }

    /// Parse feature values from the predict string
    /// Expected format: "steps,minutes_asleep,calories"
    pub fn parse_feature_values(&self) -> crate::Result<Option<[f64; 3]>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 3 {
            return Err(TrainError::InvalidConfig(
                "Predict values must be in format 'steps,minutes_asleep,calories'".to_string(),
            ));
        }

        let mut values = [0.0; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.trim().parse().map_err(|_| {
                TrainError::InvalidConfig(format!("Invalid feature value: {}", part))
            })?;
        }
        Ok(Some(values))
    }
}
