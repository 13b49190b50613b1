//! t-Distributed Stochastic Neighbor Embedding (t-SNE).
//!
//! Exact O(n²) gradient; intended for the few thousand proteins of a typical
//! landscape, not for millions of points.

use super::distance::{check_input, pairwise_distances};
use super::{DimensionReducer, DimensionReductionConfig, ProjectionInfo};
use crate::error::{ProtspaceError, Result};
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde_json::json;
use tracing::debug;

const EXAGGERATION_ITER: usize = 250;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MIN_GAIN: f64 = 0.01;
const MIN_PROBABILITY: f64 = 1e-12;
const INIT_SCALE: f64 = 1e-4;

/// Stochastic neighbor embedding; seeded and reproducible for a fixed config.
#[derive(Debug, Clone)]
pub struct Tsne {
    config: DimensionReductionConfig,
    /// Final Kullback-Leibler divergence of the last fit.
    kl_divergence: Option<f64>,
}

impl Tsne {
    pub fn new(config: DimensionReductionConfig) -> Self {
        Self {
            config,
            kl_divergence: None,
        }
    }

    /// KL divergence between P and Q after the last fit.
    pub fn kl_divergence(&self) -> Option<f64> {
        self.kl_divergence
    }

    /// Symmetric joint probabilities P from a distance matrix.
    fn joint_probabilities(&self, distances: &DMatrix<f64>) -> DMatrix<f64> {
        let n = distances.nrows();
        let target_entropy = self.config.params().perplexity.ln();

        let conditional: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let sq: Vec<f64> = (0..n).map(|j| distances[(i, j)].powi(2)).collect();
                conditional_row(&sq, i, target_entropy)
            })
            .collect();

        let mut p = DMatrix::from_fn(n, n, |i, j| {
            (conditional[i][j] + conditional[j][i]) / (2.0 * n as f64)
        });
        p.apply(|v| *v = v.max(MIN_PROBABILITY));
        p.fill_diagonal(0.0);
        p
    }
}

impl DimensionReducer for Tsne {
    fn fit_transform(&mut self, data: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_input(data, "t-SNE")?;
        let n = data.nrows();
        let params = self.config.params();
        if (n as f64) <= params.perplexity {
            return Err(ProtspaceError::InsufficientData {
                method: "t-SNE".to_string(),
                min: params.perplexity.floor() as usize + 1,
                got: n,
            });
        }

        let k = self.config.n_components();
        let distances = pairwise_distances(data, params.metric);
        let p = self.joint_probabilities(&distances);

        let mut rng = ChaCha8Rng::seed_from_u64(params.random_state);
        let mut y = DMatrix::from_fn(n, k, |_, _| rng.gen_range(-1.0..1.0) * INIT_SCALE);
        let mut velocity = DMatrix::<f64>::zeros(n, k);
        let mut gains = DMatrix::<f64>::from_element(n, k, 1.0);

        let exaggeration_iter = EXAGGERATION_ITER.min(params.n_iter);
        for iter in 0..params.n_iter {
            let (exaggeration, momentum) = if iter < exaggeration_iter {
                (params.early_exaggeration, INITIAL_MOMENTUM)
            } else {
                (1.0, FINAL_MOMENTUM)
            };

            let grad = gradient(&p, &y, exaggeration);
            for i in 0..n {
                for d in 0..k {
                    let g = grad[(i, d)];
                    if (g > 0.0) != (velocity[(i, d)] > 0.0) {
                        gains[(i, d)] += 0.2;
                    } else {
                        gains[(i, d)] = (gains[(i, d)] * 0.8).max(MIN_GAIN);
                    }
                    velocity[(i, d)] =
                        momentum * velocity[(i, d)] - params.learning_rate * gains[(i, d)] * g;
                    y[(i, d)] += velocity[(i, d)];
                }
            }

            // Re-center
            for mut column in y.column_iter_mut() {
                let mean = column.mean();
                column.add_scalar_mut(-mean);
            }
        }

        if y.iter().any(|v| !v.is_finite()) {
            return Err(ProtspaceError::Numerical(
                "t-SNE optimization diverged".to_string(),
            ));
        }

        let kl = kl_divergence(&p, &y);
        debug!(kl, "t-SNE finished");
        self.kl_divergence = Some(kl);
        Ok(y)
    }

    fn params(&self) -> ProjectionInfo {
        let params = self.config.params();
        let mut info = ProjectionInfo::new();
        info.insert("n_components".into(), json!(self.config.n_components()));
        info.insert("perplexity".into(), json!(params.perplexity));
        info.insert("learning_rate".into(), json!(params.learning_rate));
        info.insert("metric".into(), json!(params.metric.as_str()));
        info
    }
}

/// Conditional probabilities p(j|i) whose entropy matches `target_entropy`,
/// by binary search on the precision beta = 1 / (2σ²).
fn conditional_row(sq_dists: &[f64], i: usize, target_entropy: f64) -> Vec<f64> {
    let n = sq_dists.len();
    let mut beta = 1.0f64;
    let mut beta_lo = f64::NEG_INFINITY;
    let mut beta_hi = f64::INFINITY;
    let mut probs = vec![0.0; n];

    for _ in 0..100 {
        let entropy = row_probabilities(sq_dists, i, beta, &mut probs);
        let diff = entropy - target_entropy;
        if diff.abs() < 1e-5 {
            break;
        }
        if diff > 0.0 {
            // Too flat: increase precision
            beta_lo = beta;
            beta = if beta_hi.is_infinite() { beta * 2.0 } else { (beta + beta_hi) / 2.0 };
        } else {
            beta_hi = beta;
            beta = if beta_lo.is_infinite() { beta / 2.0 } else { (beta + beta_lo) / 2.0 };
        }
    }

    row_probabilities(sq_dists, i, beta, &mut probs);
    probs
}

/// Fill `probs` with normalized Gaussian affinities; returns their entropy.
fn row_probabilities(sq_dists: &[f64], i: usize, beta: f64, probs: &mut [f64]) -> f64 {
    // Shift by the smallest distance so exp() cannot underflow to all zeros
    let min_sq = sq_dists
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(_, &d)| d)
        .fold(f64::INFINITY, f64::min);

    let mut sum = 0.0;
    for (j, p) in probs.iter_mut().enumerate() {
        *p = if j == i {
            0.0
        } else {
            (-(sq_dists[j] - min_sq) * beta).exp()
        };
        sum += *p;
    }

    let mut entropy = 0.0;
    if sum > 0.0 {
        for p in probs.iter_mut() {
            *p /= sum;
            if *p > 1e-300 {
                entropy -= *p * p.ln();
            }
        }
    }
    entropy
}

/// Gradient of KL(P || Q) with respect to the embedding.
fn gradient(p: &DMatrix<f64>, y: &DMatrix<f64>, exaggeration: f64) -> DMatrix<f64> {
    let n = y.nrows();
    let k = y.ncols();

    let num = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            0.0
        } else {
            let d: f64 = (0..k).map(|c| (y[(i, c)] - y[(j, c)]).powi(2)).sum();
            1.0 / (1.0 + d)
        }
    });
    let sum_num = num.sum().max(1e-300);

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut g = vec![0.0; k];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = (num[(i, j)] / sum_num).max(MIN_PROBABILITY);
                let mult = 4.0 * (exaggeration * p[(i, j)] - q) * num[(i, j)];
                for (c, gc) in g.iter_mut().enumerate() {
                    *gc += mult * (y[(i, c)] - y[(j, c)]);
                }
            }
            g
        })
        .collect();

    DMatrix::from_fn(n, k, |i, c| rows[i][c])
}

fn kl_divergence(p: &DMatrix<f64>, y: &DMatrix<f64>) -> f64 {
    let n = y.nrows();
    let k = y.ncols();
    let num = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            0.0
        } else {
            let d: f64 = (0..k).map(|c| (y[(i, c)] - y[(j, c)]).powi(2)).sum();
            1.0 / (1.0 + d)
        }
    });
    let sum_num = num.sum().max(1e-300);

    let mut kl = 0.0;
    for i in 0..n {
        for j in 0..n {
            if i != j {
                let pij = p[(i, j)];
                let qij = (num[(i, j)] / sum_num).max(MIN_PROBABILITY);
                kl += pij * (pij / qij).ln();
            }
        }
    }
    kl
}
