//! K-Means clustering model implementation
//!
//! Lloyd's algorithm with k-means++ seeding and multiple restarts. All randomness comes from a
//! single `Isaac64Rng` seeded from [`KMeansParams::seed`], so a fixed (data, k, seed) triple
//! always produces the same centroids in the same order.

use crate::error::TrainError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_isaac::Isaac64Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Hyperparameters for a k-means fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    /// Number of clusters (k)
    pub n_clusters: usize,
    /// Seed for the initialization RNG
    pub seed: u64,
    /// Number of restarts; the lowest-inertia run is kept
    pub n_init: usize,
    /// Maximum Lloyd iterations per restart
    pub max_iters: usize,
    /// Convergence tolerance, relative to the mean feature variance
    pub tolerance: f64,
}

impl KMeansParams {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            seed: 42,
            n_init: 10,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// K-Means model with fitted parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster centroids in standardized space (n_clusters, n_features)
    pub centroids: Array2<f64>,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
    /// Lloyd iterations run by the winning restart
    pub n_iter: usize,
}

impl KMeansModel {
    /// Predict cluster for a standardized point; ties go to the lowest cluster index.
    pub fn predict(&self, point: ArrayView1<f64>) -> crate::Result<usize> {
        if point.len() != self.centroids.ncols() {
            return Err(TrainError::DimensionMismatch {
                expected: self.centroids.ncols(),
                actual: point.len(),
            });
        }
        // Non-finite input has no nearest centroid
        if point.iter().any(|v| !v.is_finite()) {
            return Err(TrainError::InvalidConfig(format!(
                "cannot assign a cluster to non-finite features {}",
                point
            )));
        }
        Ok(nearest_centroid(&point, &self.centroids).0)
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

/// Stateful estimator wrapper: `fit` first, then `predict`.
#[derive(Debug, Clone)]
pub struct KMeans {
    params: KMeansParams,
    model: Option<KMeansModel>,
}

impl KMeans {
    pub fn new(params: KMeansParams) -> Self {
        Self {
            params,
            model: None,
        }
    }

    pub fn from_model(params: KMeansParams, model: KMeansModel) -> Self {
        Self {
            params,
            model: Some(model),
        }
    }

    pub fn params(&self) -> &KMeansParams {
        &self.params
    }

    pub fn model(&self) -> crate::Result<&KMeansModel> {
        self.model.as_ref().ok_or(TrainError::NotFitted { what: "KMeans" })
    }

    pub fn fit(&mut self, features: &Array2<f64>) -> crate::Result<&KMeansModel> {
        let model = fit_kmeans(features, &self.params)?;
        Ok(&*self.model.insert(model))
    }

    pub fn predict(&self, point: ArrayView1<f64>) -> crate::Result<usize> {
        self.model()?.predict(point)
    }
}

/// Fit K-Means on standardized features
///
/// # Arguments
/// * `features` - Standardized feature matrix (n_samples, n_features)
/// * `params` - Cluster count, seed, restarts and convergence settings
///
/// # Returns
/// * Fitted `KMeansModel` from the restart with the lowest inertia
pub fn fit_kmeans(features: &Array2<f64>, params: &KMeansParams) -> crate::Result<KMeansModel> {
    let n_samples = features.nrows();
    let k = params.n_clusters;

    if k == 0 || k > n_samples {
        return Err(TrainError::InvalidClusterCount { k, n_samples });
    }
    if params.n_init == 0 || params.max_iters == 0 {
        return Err(TrainError::InvalidConfig(
            "k-means needs at least one restart and one iteration".to_string(),
        ));
    }

    let mean_variance = features
        .var_axis(Axis(0), 0.0)
        .mean()
        .unwrap_or(0.0);
    let shift_tolerance = params.tolerance * mean_variance;

    let mut rng = Isaac64Rng::seed_from_u64(params.seed);
    let mut best: Option<KMeansModel> = None;

    for run in 0..params.n_init {
        let seeds = kmeans_plus_plus(features, k, &mut rng);
        let candidate = lloyd(features, seeds, params.max_iters, shift_tolerance);
        debug!(
            run,
            inertia = candidate.inertia,
            n_iter = candidate.n_iter,
            "k-means restart finished"
        );

        // Strict comparison keeps the earliest run on ties
        if best.as_ref().map_or(true, |b| candidate.inertia < b.inertia) {
            best = Some(candidate);
        }
    }

    let model = best.ok_or_else(|| TrainError::InvalidConfig("no k-means restart ran".to_string()))?;
    info!(k, inertia = model.inertia, n_iter = model.n_iter, "K-Means fitted");
    Ok(model)
}

/// k-means++ seeding: first seed uniform, the rest sampled proportionally to squared distance
/// from the nearest chosen seed.
fn kmeans_plus_plus(data: &Array2<f64>, k: usize, rng: &mut Isaac64Rng) -> Array2<f64> {
    let n_samples = data.nrows();
    let mut centroids = Array2::zeros((k, data.ncols()));

    let first = rng.gen_range(0..n_samples);
    centroids.row_mut(0).assign(&data.row(first));
    let mut closest: Vec<f64> = data
        .outer_iter()
        .map(|x| squared_distance(&x, &data.row(first)))
        .collect();

    for c in 1..k {
        let total: f64 = closest.iter().sum();
        let next = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            let mut chosen = None;
            for (i, &d) in closest.iter().enumerate() {
                acc += d;
                if d > 0.0 && acc > target {
                    chosen = Some(i);
                    break;
                }
            }
            // Rounding can leave `acc` just under `target`
            chosen
                .or_else(|| closest.iter().rposition(|&d| d > 0.0))
                .unwrap_or(0)
        } else {
            // Every point coincides with a seed already
            0
        };

        centroids.row_mut(c).assign(&data.row(next));
        for (i, x) in data.outer_iter().enumerate() {
            let d = squared_distance(&x, &data.row(next));
            if d < closest[i] {
                closest[i] = d;
            }
        }
    }

    centroids
}

/// Lloyd iterations from the given seeds, capped at `max_iters`.
fn lloyd(data: &Array2<f64>, mut centroids: Array2<f64>, max_iters: usize, tolerance: f64) -> KMeansModel {
    let n_clusters = centroids.nrows();
    let mut labels = Array1::from_elem(data.nrows(), usize::MAX);
    let mut n_iter = 0;

    for iter in 0..max_iters {
        n_iter = iter + 1;
        if !assign_labels(data, &centroids, &mut labels) {
            break;
        }

        let updated = update_centroids(data, &labels, &centroids);
        let shift: f64 = (&updated - &centroids).mapv(|d| d * d).sum();
        centroids = updated;
        if shift <= tolerance {
            break;
        }
    }

    // Final pass so labels and inertia match the returned centroids
    assign_labels(data, &centroids, &mut labels);
    let inertia = compute_inertia(data, &labels, &centroids);

    KMeansModel {
        n_clusters,
        centroids,
        labels,
        inertia,
        n_iter,
    }
}

/// Assign each row to its nearest centroid. Returns whether any label changed.
fn assign_labels(data: &Array2<f64>, centroids: &Array2<f64>, labels: &mut Array1<usize>) -> bool {
    let mut changed = false;
    for (point, label) in data.outer_iter().zip(labels.iter_mut()) {
        let (nearest, _) = nearest_centroid(&point, centroids);
        if *label != nearest {
            *label = nearest;
            changed = true;
        }
    }
    changed
}

/// Recompute each centroid as the mean of its members; empty clusters stay put.
fn update_centroids(data: &Array2<f64>, labels: &Array1<usize>, previous: &Array2<f64>) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; previous.nrows()];

    for (point, &label) in data.outer_iter().zip(labels.iter()) {
        let mut row = sums.row_mut(label);
        row += &point;
        counts[label] += 1;
    }

    for (cluster, &count) in counts.iter().enumerate() {
        if count == 0 {
            debug!(cluster, "Empty cluster keeps its previous centroid");
            sums.row_mut(cluster).assign(&previous.row(cluster));
        } else {
            sums.row_mut(cluster).mapv_inplace(|v| v / count as f64);
        }
    }

    sums
}

fn nearest_centroid(point: &ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (cluster, centroid) in centroids.outer_iter().enumerate() {
        let d = squared_distance(point, &centroid);
        if d < best.1 {
            best = (cluster, d);
        }
    }
    best
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    features
        .outer_iter()
        .zip(labels.iter())
        .map(|(point, &cluster)| squared_distance(&point, &centroids.row(cluster)))
        .sum()
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
