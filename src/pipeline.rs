//! Scaler + k-means bundled as one reloadable unit, and the end-to-end training run.

use crate::config::TrainConfig;
use crate::data::{load_training_data, TrainingData};
use crate::error::TrainError;
use crate::export::{export_artifacts, write_staged, ArtifactPaths};
use crate::model::{KMeans, KMeansModel, KMeansParams};
use crate::scaler::{ScalerParameters, StandardScaler};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Bumped whenever the bundle layout changes incompatibly.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// On-disk form of a fitted [`ClusterPipeline`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineBundle {
    pub format_version: u32,
    pub feature_columns: Vec<String>,
    pub scaler: ScalerParameters,
    pub kmeans_params: KMeansParams,
    pub kmeans: KMeansModel,
}

/// Standard scaler followed by k-means
#[derive(Debug, Clone)]
pub struct ClusterPipeline {
    feature_columns: Vec<String>,
    scaler: StandardScaler,
    kmeans: KMeans,
}

impl ClusterPipeline {
    pub fn new(feature_columns: Vec<String>, params: KMeansParams) -> Self {
        Self {
            feature_columns,
            scaler: StandardScaler::new(),
            kmeans: KMeans::new(params),
        }
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn kmeans(&self) -> &KMeans {
        &self.kmeans
    }

    /// Fit the scaler on raw features, then cluster the standardized rows.
    pub fn fit(&mut self, features: &Array2<f64>) -> crate::Result<&KMeansModel> {
        if features.ncols() != self.feature_columns.len() {
            return Err(TrainError::DimensionMismatch {
                expected: self.feature_columns.len(),
                actual: features.ncols(),
            });
        }
        let scaled = self.scaler.fit_transform(features)?;
        self.kmeans.fit(&scaled)
    }

    /// Standardize a raw observation and return its cluster index.
    pub fn predict(&self, raw: &[f64]) -> crate::Result<usize> {
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(TrainError::InvalidConfig(format!(
                "feature values must be finite, got {:?}",
                raw
            )));
        }
        let scaled = self.transform(raw)?;
        self.kmeans.predict(scaled.view())
    }

    pub fn transform(&self, raw: &[f64]) -> crate::Result<Array1<f64>> {
        self.scaler.transform_one(raw)
    }

    pub fn to_bundle(&self) -> crate::Result<PipelineBundle> {
        Ok(PipelineBundle {
            format_version: BUNDLE_FORMAT_VERSION,
            feature_columns: self.feature_columns.clone(),
            scaler: self.scaler.params()?.clone(),
            kmeans_params: self.kmeans.params().clone(),
            kmeans: self.kmeans.model()?.clone(),
        })
    }

    pub fn from_bundle(bundle: PipelineBundle) -> crate::Result<Self> {
        if bundle.format_version != BUNDLE_FORMAT_VERSION {
            return Err(TrainError::IncompatibleBundle {
                found: bundle.format_version,
                expected: BUNDLE_FORMAT_VERSION,
            });
        }
        let width = bundle.feature_columns.len();
        for actual in [
            bundle.scaler.mean.len(),
            bundle.scaler.scale.len(),
            bundle.kmeans.centroids.ncols(),
        ] {
            if actual != width {
                return Err(TrainError::DimensionMismatch {
                    expected: width,
                    actual,
                });
            }
        }

        Ok(Self {
            feature_columns: bundle.feature_columns,
            scaler: StandardScaler::from_params(bundle.scaler),
            kmeans: KMeans::from_model(bundle.kmeans_params, bundle.kmeans),
        })
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let payload = serde_json::to_string(&self.to_bundle()?)?;
        write_staged(&[(path, payload.as_str())])
    }

    /// Reload a pipeline written by [`ClusterPipeline::save`].
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(TrainError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let bundle: PipelineBundle = serde_json::from_str(&content)?;
        Self::from_bundle(bundle)
    }
}

/// Outcome of a successful training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub paths: ArtifactPaths,
    pub k: usize,
    pub n_samples: usize,
    pub inertia: f64,
    pub cluster_sizes: Vec<usize>,
}

/// Fit a pipeline on already-merged training data, without touching the filesystem.
pub fn fit_pipeline(data: &TrainingData, config: &TrainConfig) -> crate::Result<ClusterPipeline> {
    let params = KMeansParams::new(config.clusters)
        .seed(config.seed)
        .n_init(config.n_init)
        .max_iters(config.max_iters)
        .tolerance(config.tolerance);

    let mut pipeline = ClusterPipeline::new(data.feature_columns.clone(), params);
    pipeline.fit(&data.features)?;
    Ok(pipeline)
}

/// Load, merge, featurize, fit and export. Nothing is written unless every earlier stage
/// succeeded.
pub fn train(config: &TrainConfig) -> crate::Result<TrainingReport> {
    config.validate()?;

    let data = load_training_data(config)?;
    let pipeline = fit_pipeline(&data, config)?;

    let paths = ArtifactPaths::from_config(config);
    export_artifacts(&pipeline, &paths)?;

    let model = pipeline.kmeans().model()?;
    info!(k = model.n_clusters, rows = data.len(), "Training run complete");

    Ok(TrainingReport {
        paths,
        k: model.n_clusters,
        n_samples: data.len(),
        inertia: model.inertia,
        cluster_sizes: model.cluster_sizes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    fn feature_names() -> Vec<String> {
        vec![
            "TotalSteps".to_string(),
            "TotalMinutesAsleep".to_string(),
            "Calories".to_string(),
        ]
    }

    fn raw_features() -> Array2<f64> {
        array![
            [12000.0, 420.0, 2600.0],
            [11500.0, 430.0, 2550.0],
            [3000.0, 300.0, 1600.0],
            [2500.0, 310.0, 1550.0],
            [7000.0, 520.0, 2100.0],
            [7200.0, 510.0, 2050.0],
        ]
    }

    #[test]
    fn test_fit_and_predict_raw_values() {
        let mut pipeline = ClusterPipeline::new(feature_names(), KMeansParams::new(3));
        let model = pipeline.fit(&raw_features()).unwrap().clone();

        let cluster = pipeline.predict(&[12000.0, 420.0, 2600.0]).unwrap();
        assert_eq!(cluster, model.labels[0]);
        assert_eq!(model.labels[0], model.labels[1]);
        assert_eq!(model.labels[2], model.labels[3]);
    }

    #[test]
    fn test_predict_before_fit() {
        let pipeline = ClusterPipeline::new(feature_names(), KMeansParams::new(2));
        let err = pipeline.predict(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, TrainError::NotFitted { .. }));
        assert!(pipeline.to_bundle().is_err());
    }

    #[test]
    fn test_predict_rejects_non_finite_values() {
        let mut pipeline = ClusterPipeline::new(feature_names(), KMeansParams::new(3));
        pipeline.fit(&raw_features()).unwrap();

        for values in [
            [f64::NAN, 1.0, 1.0],
            [12000.0, f64::INFINITY, 2600.0],
            [12000.0, 420.0, f64::NEG_INFINITY],
        ] {
            let err = pipeline.predict(&values).unwrap_err();
            assert!(matches!(err, TrainError::InvalidConfig(_)), "accepted {values:?}");
        }
    }

    #[test]
    fn test_fit_rejects_wrong_width() {
        let mut pipeline = ClusterPipeline::new(feature_names(), KMeansParams::new(1));
        let err = pipeline.fit(&array![[1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, TrainError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_bundle_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kmeans_model.json");

        let mut pipeline = ClusterPipeline::new(feature_names(), KMeansParams::new(3));
        pipeline.fit(&raw_features()).unwrap();
        pipeline.save(&path).unwrap();

        let loaded = ClusterPipeline::load(&path).unwrap();
        assert_eq!(loaded.to_bundle().unwrap(), pipeline.to_bundle().unwrap());
        for row in raw_features().outer_iter() {
            let values = row.to_vec();
            assert_eq!(
                loaded.predict(&values).unwrap(),
                pipeline.predict(&values).unwrap()
            );
        }
    }

    #[test]
    fn test_load_rejects_other_versions() {
        let mut pipeline = ClusterPipeline::new(feature_names(), KMeansParams::new(2));
        pipeline.fit(&raw_features()).unwrap();
        let mut bundle = pipeline.to_bundle().unwrap();
        bundle.format_version = BUNDLE_FORMAT_VERSION + 1;

        let err = ClusterPipeline::from_bundle(bundle).unwrap_err();
        assert!(matches!(err, TrainError::IncompatibleBundle { .. }));
    }

    #[test]
    fn test_load_missing_bundle() {
        let dir = tempdir().unwrap();
        let err = ClusterPipeline::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, TrainError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_k_writes_nothing() {
        let dir = tempdir().unwrap();
        let data = TrainingData {
            features: raw_features(),
            feature_columns: feature_names(),
        };
        let config = TrainConfig {
            clusters: 7,
            ..TrainConfig::default()
        }
        .with_output_dir(dir.path().join("out"));

        let err = fit_pipeline(&data, &config).unwrap_err();
        assert!(matches!(
            err,
            TrainError::InvalidClusterCount { k: 7, n_samples: 6 }
        ));
        assert!(!config.output_dir.exists());
    }
}
