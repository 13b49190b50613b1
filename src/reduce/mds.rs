//! Metric multidimensional scaling.
//!
//! The first start is classical (Torgerson) scaling of the dissimilarities;
//! every start is then refined with SMACOF stress majorization. Additional
//! starts use seeded random configurations and the lowest stress wins.

use super::distance::{check_input, pairwise_distances};
use super::{
    fix_column_signs, DimensionReducer, DimensionReductionConfig, Dissimilarity, Metric,
    PrecomputedKind, ProjectionInfo,
};
use crate::error::{ProtspaceError, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use tracing::{debug, info};

/// Tolerance for "diagonal is 1" in similarity detection.
const UNIT_DIAGONAL_TOL: f64 = 1e-6;

/// Convert a similarity matrix to dissimilarities: `d = sqrt(max(S) - S)`.
///
/// The largest similarity maps to distance 0; the result is symmetric when
/// `S` is.
pub fn similarity_to_dissimilarity(similarity: &DMatrix<f64>) -> DMatrix<f64> {
    let max = similarity.max();
    similarity.map(|s| (max - s).max(0.0).sqrt())
}

/// Whether a square matrix looks like a similarity matrix (every diagonal
/// entry within 1e-6 of 1).
pub fn looks_like_similarity(matrix: &DMatrix<f64>) -> bool {
    matrix.is_square()
        && matrix.nrows() > 0
        && matrix
            .diagonal()
            .iter()
            .all(|&d| (d - 1.0).abs() <= UNIT_DIAGONAL_TOL)
}

/// Pairwise-distance scaling of feature vectors or a precomputed matrix.
#[derive(Debug, Clone)]
pub struct Mds {
    config: DimensionReductionConfig,
    /// Raw stress of the best start (set after fit).
    stress: Option<f64>,
}

impl Mds {
    pub fn new(config: DimensionReductionConfig) -> Self {
        Self {
            config,
            stress: None,
        }
    }

    /// Raw stress of the last fit.
    pub fn stress(&self) -> Option<f64> {
        self.stress
    }

    /// Dissimilarities the scaling operates on.
    fn dissimilarities(&self, data: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let params = self.config.params();
        let mut d = match params.dissimilarity {
            Dissimilarity::Euclidean => pairwise_distances(data, Metric::Euclidean),
            Dissimilarity::Precomputed => {
                if !data.is_square() {
                    return Err(ProtspaceError::InvalidConfig(format!(
                        "precomputed dissimilarities must be square, got {}x{}",
                        data.nrows(),
                        data.ncols()
                    )));
                }
                let convert = match params.precomputed_kind {
                    PrecomputedKind::Dissimilarity => false,
                    PrecomputedKind::Similarity => true,
                    PrecomputedKind::Detect => {
                        let detected = looks_like_similarity(data);
                        info!(detected, "similarity detection on precomputed MDS input");
                        detected
                    }
                };
                if convert {
                    similarity_to_dissimilarity(data)
                } else {
                    data.clone()
                }
            }
        };

        if d.iter().any(|&v| v < 0.0) {
            return Err(ProtspaceError::Numerical(
                "dissimilarities must be non-negative".to_string(),
            ));
        }
        d.fill_diagonal(0.0);
        Ok(d)
    }

    /// SMACOF iterations from `x`; returns the refined configuration and its stress.
    fn smacof(&self, d: &DMatrix<f64>, mut x: DMatrix<f64>) -> (DMatrix<f64>, f64) {
        let params = self.config.params();
        let n = d.nrows();
        let mut old_stress = stress(d, &x);

        for iter in 0..params.max_iter {
            let dx = pairwise_distances(&x, Metric::Euclidean);

            // Guttman transform: X = B(X) X / n
            let mut b = DMatrix::zeros(n, n);
            for i in 0..n {
                for j in 0..n {
                    if i != j && dx[(i, j)] > 0.0 {
                        b[(i, j)] = -d[(i, j)] / dx[(i, j)];
                    }
                }
            }
            for i in 0..n {
                let row_sum: f64 = (0..n).filter(|&j| j != i).map(|j| b[(i, j)]).sum();
                b[(i, i)] = -row_sum;
            }
            x = (&b * &x) / n as f64;

            let new_stress = stress(d, &x);
            if old_stress <= f64::EPSILON
                || (old_stress - new_stress) / old_stress.max(f64::MIN_POSITIVE) < params.eps
            {
                debug!(iter, stress = new_stress, "SMACOF converged");
                return (x, new_stress);
            }
            old_stress = new_stress;
        }

        (x, old_stress)
    }
}

impl DimensionReducer for Mds {
    fn fit_transform(&mut self, data: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_input(data, "MDS")?;
        let n = data.nrows();
        let k = self.config.n_components();
        if n <= k {
            return Err(ProtspaceError::InsufficientData {
                method: "MDS".to_string(),
                min: k + 1,
                got: n,
            });
        }

        let d = self.dissimilarities(data)?;
        let params = self.config.params();

        let (mut best, mut best_stress) = self.smacof(&d, classical_scaling(&d, k));
        debug!(init = 0, stress = best_stress, "MDS start");

        let mut rng = ChaCha8Rng::seed_from_u64(params.random_state);
        let scale = d.mean().max(f64::MIN_POSITIVE);
        for init in 1..params.n_init {
            let start = DMatrix::from_fn(n, k, |_, _| rng.gen::<f64>() * scale);
            let (x, s) = self.smacof(&d, start);
            debug!(init, stress = s, "MDS start");
            if s < best_stress {
                best = x;
                best_stress = s;
            }
        }

        for mut column in best.column_iter_mut() {
            let mean = column.mean();
            column.add_scalar_mut(-mean);
        }
        fix_column_signs(&mut best);

        self.stress = Some(best_stress);
        Ok(best)
    }

    fn params(&self) -> ProjectionInfo {
        let params = self.config.params();
        let mut info = ProjectionInfo::new();
        info.insert("n_components".into(), json!(self.config.n_components()));
        info.insert("dissimilarity".into(), json!(params.dissimilarity.as_str()));
        if params.dissimilarity == Dissimilarity::Precomputed {
            info.insert(
                "precomputed_kind".into(),
                json!(params.precomputed_kind.as_str()),
            );
        }
        info.insert("n_init".into(), json!(params.n_init));
        info.insert("max_iter".into(), json!(params.max_iter));
        info.insert("eps".into(), json!(params.eps));
        if let Some(stress) = self.stress {
            info.insert("stress".into(), json!(stress));
        }
        info
    }
}

/// Classical (Torgerson) scaling: top eigenvectors of the double-centered
/// squared dissimilarities.
fn classical_scaling(d: &DMatrix<f64>, k: usize) -> DMatrix<f64> {
    let n = d.nrows();
    let sq = d.map(|v| v * v);
    let row_means: Vec<f64> = (0..n).map(|i| sq.row(i).mean()).collect();
    let col_means: Vec<f64> = (0..n).map(|j| sq.column(j).mean()).collect();
    let grand = sq.mean();

    let b = DMatrix::from_fn(n, n, |i, j| {
        -0.5 * (sq[(i, j)] - row_means[i] - col_means[j] + grand)
    });
    let eig = SymmetricEigen::new(b);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

    let mut x = DMatrix::zeros(n, k);
    for (out_col, &idx) in order.iter().take(k).enumerate() {
        let scale = eig.eigenvalues[idx].max(0.0).sqrt();
        for row in 0..n {
            x[(row, out_col)] = eig.eigenvectors[(row, idx)] * scale;
        }
    }
    x
}

/// Raw stress: sum over pairs of (embedded distance - dissimilarity)².
fn stress(d: &DMatrix<f64>, x: &DMatrix<f64>) -> f64 {
    let dx = pairwise_distances(x, Metric::Euclidean);
    let n = d.nrows();
    let mut total = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            total += (dx[(i, j)] - d[(i, j)]).powi(2);
        }
    }
    total
}
