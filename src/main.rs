//! SleepForge: K-Means training over merged activity and sleep data
//!
//! This is the main entrypoint that wires logging and arguments to the training pipeline,
//! or reloads an exported model to score a single observation.

use anyhow::{Context, Result};
use clap::Parser;
use sleepforge::{train, Args, ClusterPipeline, TrainConfig};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = args.to_config();

    // Check if in prediction mode
    if let Some(values) = args.parse_feature_values()? {
        run_prediction_mode(&config, values)
    } else {
        run_training(&config)
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Score one observation against a previously exported model
fn run_prediction_mode(config: &TrainConfig, values: [f64; 3]) -> Result<()> {
    let model_path = config.model_path();
    let pipeline = ClusterPipeline::load(&model_path)
        .with_context(|| format!("Failed to load model from {}", model_path.display()))?;

    let cluster = pipeline.predict(&values)?;
    let model = pipeline.kmeans().model()?;
    let centroid = model.centroids.row(cluster);

    println!("=== Prediction Mode ===");
    println!(
        "Input: steps={}, minutes_asleep={}, calories={}",
        values[0], values[1], values[2]
    );
    println!("\n✓ Predicted Cluster: {}", cluster);
    println!(
        "  Centroid (standardized): [{}]",
        centroid
            .iter()
            .map(|v| format!("{:.3}", v))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(())
}

/// Run full training pipeline
fn run_training(config: &TrainConfig) -> Result<()> {
    let start_time = Instant::now();

    let report = train(config)?;

    println!("Model saved: {}", report.paths.model.display());
    println!("Scaler JSON: {}", report.paths.scaler.display());
    println!("Centroids JSON: {}", report.paths.centroids.display());
    println!("Clusters: {}", report.k);
    println!("Training examples: {}", report.n_samples);

    tracing::debug!(
        inertia = report.inertia,
        cluster_sizes = ?report.cluster_sizes,
        elapsed_secs = start_time.elapsed().as_secs_f64(),
        "Pipeline complete"
    );

    Ok(())
}
