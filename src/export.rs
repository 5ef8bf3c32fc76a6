//! Artifact export: the reloadable bundle plus plain JSON records for downstream scorers.
//!
//! The JSON records hold only strings, integers and floats so any reader can consume them
//! without this crate.

use crate::config::TrainConfig;
use crate::error::TrainError;
use crate::pipeline::ClusterPipeline;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Name prefix of in-flight artifact files
const STAGING_PREFIX: &str = ".sleepforge-";

/// `kmeans_scaler.json` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerRecord {
    pub feature_columns: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// `kmeans_centroids.json` payload; centroids are in standardized space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidsRecord {
    pub feature_columns: Vec<String>,
    pub k: usize,
    pub centroids: Vec<Vec<f64>>,
}

impl ScalerRecord {
    pub fn from_pipeline(pipeline: &ClusterPipeline) -> crate::Result<Self> {
        let params = pipeline.scaler().params()?;
        Ok(Self {
            feature_columns: pipeline.feature_columns().to_vec(),
            mean: params.mean.to_vec(),
            scale: params.scale.to_vec(),
        })
    }

    pub fn read(path: &Path) -> crate::Result<Self> {
        read_json(path)
    }
}

impl CentroidsRecord {
    pub fn from_pipeline(pipeline: &ClusterPipeline) -> crate::Result<Self> {
        let model = pipeline.kmeans().model()?;
        Ok(Self {
            feature_columns: pipeline.feature_columns().to_vec(),
            k: model.n_clusters,
            centroids: model.centroids.outer_iter().map(|row| row.to_vec()).collect(),
        })
    }

    pub fn read(path: &Path) -> crate::Result<Self> {
        read_json(path)
    }
}

/// Where the three artifacts of a run land
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub scaler: PathBuf,
    pub centroids: PathBuf,
}

impl ArtifactPaths {
    pub fn from_config(config: &TrainConfig) -> Self {
        Self {
            model: config.model_path(),
            scaler: config.scaler_path(),
            centroids: config.centroids_path(),
        }
    }
}

/// Write the model bundle, scaler record and centroids record.
///
/// All payloads are serialized before the first write. Output directories are created if
/// absent and existing artifacts are overwritten. Either all three files are replaced or none.
pub fn export_artifacts(pipeline: &ClusterPipeline, paths: &ArtifactPaths) -> crate::Result<()> {
    let bundle = serde_json::to_string(&pipeline.to_bundle()?)?;
    let scaler = serde_json::to_string_pretty(&ScalerRecord::from_pipeline(pipeline)?)?;
    let centroids = serde_json::to_string_pretty(&CentroidsRecord::from_pipeline(pipeline)?)?;

    write_staged(&[
        (paths.model.as_path(), bundle.as_str()),
        (paths.scaler.as_path(), scaler.as_str()),
        (paths.centroids.as_path(), centroids.as_str()),
    ])?;

    info!(
        model = %paths.model.display(),
        scaler = %paths.scaler.display(),
        centroids = %paths.centroids.display(),
        "Exported artifacts"
    );
    Ok(())
}

/// Stage every payload in a temp file next to its destination, then persist them together.
///
/// No destination is touched until every temp file has been written and synced. Staged files
/// that are never persisted are removed when dropped.
pub(crate) fn write_staged(files: &[(&Path, &str)]) -> crate::Result<()> {
    for (path, _) in files {
        if path.is_dir() {
            return Err(TrainError::InvalidConfig(format!(
                "artifact path {} is a directory",
                path.display()
            )));
        }
    }

    let mut staged = Vec::with_capacity(files.len());
    for &(path, contents) in files {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".tmp")
            .rand_bytes(6)
            .tempfile_in(dir)?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;
        staged.push((file, path));
    }

    for (file, path) in staged {
        file.persist(path).map_err(|err| err.error)?;
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> crate::Result<T> {
    if !path.exists() {
        return Err(TrainError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
