//! Per-feature standardization to zero mean and unit variance

use crate::error::TrainError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fitted statistics of a [`StandardScaler`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParameters {
    /// Per-feature arithmetic mean
    pub mean: Array1<f64>,
    /// Per-feature population standard deviation, 1.0 for constant features
    pub scale: Array1<f64>,
    /// Number of rows the statistics were computed from
    pub n_samples: usize,
}

impl ScalerParameters {
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

/// Standard scaler; each `fit` recomputes statistics from the full batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    params: Option<ScalerParameters>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a fitted scaler from exported parameters.
    pub fn from_params(params: ScalerParameters) -> Self {
        Self {
            params: Some(params),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    pub fn params(&self) -> crate::Result<&ScalerParameters> {
        self.params.as_ref().ok_or(TrainError::NotFitted {
            what: "StandardScaler",
        })
    }

    /// Compute mean and population standard deviation per column.
    ///
    /// A constant column gets its exact value as mean and 1.0 as scale, so every transformed
    /// value in it is exactly 0.0.
    pub fn fit(&mut self, features: &Array2<f64>) -> crate::Result<&ScalerParameters> {
        let n_samples = features.nrows();
        if n_samples == 0 {
            return Err(TrainError::EmptyResult);
        }

        let n_features = features.ncols();
        let mut mean = Array1::zeros(n_features);
        let mut scale = Array1::ones(n_features);

        for (j, column) in features.axis_iter(Axis(1)).enumerate() {
            if is_constant(&column) {
                mean[j] = column[0];
                warn!(feature = j, value = column[0], "Constant feature; using scale 1.0");
                continue;
            }
            let m = column.sum() / n_samples as f64;
            let variance = column.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n_samples as f64;
            mean[j] = m;
            let std = variance.sqrt();
            scale[j] = if std > 0.0 { std } else { 1.0 };
        }

        Ok(&*self.params.insert(ScalerParameters {
            mean,
            scale,
            n_samples,
        }))
    }

    /// Apply `(x - mean) / scale` to every row.
    pub fn transform(&self, features: &Array2<f64>) -> crate::Result<Array2<f64>> {
        let params = self.params()?;
        check_width(params, features.ncols())?;
        Ok((features - &params.mean) / &params.scale)
    }

    pub fn fit_transform(&mut self, features: &Array2<f64>) -> crate::Result<Array2<f64>> {
        self.fit(features)?;
        self.transform(features)
    }

    /// Standardize a single observation.
    pub fn transform_one(&self, values: &[f64]) -> crate::Result<Array1<f64>> {
        let params = self.params()?;
        check_width(params, values.len())?;
        let row = ArrayView1::from(values);
        Ok((&row - &params.mean) / &params.scale)
    }

    /// Map standardized rows back to the original feature space.
    pub fn inverse_transform(&self, scaled: &Array2<f64>) -> crate::Result<Array2<f64>> {
        let params = self.params()?;
        check_width(params, scaled.ncols())?;
        Ok(scaled * &params.scale + &params.mean)
    }
}

fn is_constant(column: &ArrayView1<f64>) -> bool {
    let first = column[0];
    column.iter().all(|&x| x == first)
}

fn check_width(params: &ScalerParameters, actual: usize) -> crate::Result<()> {
    if params.n_features() != actual {
        return Err(TrainError::DimensionMismatch {
            expected: params.n_features(),
            actual,
        });
    }
    Ok(())
}
