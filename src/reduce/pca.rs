//! Principal Component Analysis via thin SVD of the centered data.

use super::distance::check_input;
use super::{fix_column_signs, DimensionReducer, DimensionReductionConfig, ProjectionInfo};
use crate::error::{ProtspaceError, Result};
use nalgebra::DMatrix;
use serde_json::json;
use tracing::debug;

/// Linear projection onto the directions of largest variance.
///
/// Deterministic: components are ordered by singular value and each score
/// column is sign-fixed so its largest-magnitude entry is positive.
#[derive(Debug, Clone)]
pub struct Pca {
    config: DimensionReductionConfig,
    /// Fraction of total variance captured per component (set after fit).
    explained_variance_ratio: Option<Vec<f64>>,
}

impl Pca {
    pub fn new(config: DimensionReductionConfig) -> Self {
        Self {
            config,
            explained_variance_ratio: None,
        }
    }

    /// Explained variance ratio of the last fit.
    pub fn explained_variance_ratio(&self) -> Option<&[f64]> {
        self.explained_variance_ratio.as_deref()
    }
}

impl DimensionReducer for Pca {
    fn fit_transform(&mut self, data: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_input(data, "PCA")?;
        let (n, d) = data.shape();
        let k = self.config.n_components();
        if n.min(d) < k {
            return Err(ProtspaceError::InsufficientData {
                method: "PCA".to_string(),
                min: k,
                got: n.min(d),
            });
        }

        // Center columns
        let mut centered = data.clone();
        for mut column in centered.column_iter_mut() {
            let mean = column.mean();
            column.add_scalar_mut(-mean);
        }

        let svd = centered.svd(true, false);
        let u = svd
            .u
            .ok_or_else(|| ProtspaceError::Numerical("SVD did not produce U".to_string()))?;
        let sigma = svd.singular_values;

        let mut order: Vec<usize> = (0..sigma.len()).collect();
        order.sort_by(|&a, &b| sigma[b].total_cmp(&sigma[a]));

        let total: f64 = sigma.iter().map(|s| s * s).sum();
        let mut scores = DMatrix::zeros(n, k);
        let mut ratios = Vec::with_capacity(k);
        for (out_col, &idx) in order.iter().take(k).enumerate() {
            let s = sigma[idx];
            for row in 0..n {
                scores[(row, out_col)] = u[(row, idx)] * s;
            }
            ratios.push(if total > 0.0 { s * s / total } else { 0.0 });
        }
        fix_column_signs(&mut scores);

        debug!(?ratios, "PCA explained variance");
        self.explained_variance_ratio = Some(ratios);
        Ok(scores)
    }

    fn params(&self) -> ProjectionInfo {
        let mut info = ProjectionInfo::new();
        info.insert("n_components".into(), json!(self.config.n_components()));
        info.insert(
            "explained_variance_ratio".into(),
            json!(self.explained_variance_ratio.clone().unwrap_or_default()),
        );
        info
    }
}
