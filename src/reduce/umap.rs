//! Uniform Manifold Approximation and Projection (UMAP).
//!
//! Builds a fuzzy k-nearest-neighbor graph in the input space and lays it out
//! in 2 or 3 dimensions with negative-sampling SGD.

use super::distance::{check_input, pairwise_distances, squared_euclidean};
use super::{DimensionReducer, DimensionReductionConfig, ProjectionInfo};
use crate::error::{ProtspaceError, Result};
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const LEARNING_RATE: f64 = 1.0;
const NEGATIVE_SAMPLE_RATE: usize = 5;
const INIT_SCALE: f64 = 10.0;
const GRAD_CLIP: f64 = 4.0;

/// Neighbor-graph embedding; seeded and reproducible for a fixed config.
#[derive(Debug, Clone)]
pub struct Umap {
    config: DimensionReductionConfig,
    /// Neighborhood size used by the last fit, after clamping to `n - 1`.
    fitted_neighbors: Option<usize>,
}

/// Symmetric fuzzy graph as a list of directed weighted edges.
#[derive(Debug, Clone)]
struct FuzzyGraph {
    n_points: usize,
    edges: Vec<(usize, usize, f64)>,
}

impl Umap {
    pub fn new(config: DimensionReductionConfig) -> Self {
        Self {
            config,
            fitted_neighbors: None,
        }
    }

    /// Build the fuzzy simplicial set from a distance matrix using `k` neighbors.
    fn build_fuzzy_graph(&self, distances: &DMatrix<f64>, k: usize) -> FuzzyGraph {
        let n = distances.nrows();
        let target = (k as f64).log2();

        // (i, j) with i < j -> (w_ij, w_ji)
        let mut memberships: BTreeMap<(usize, usize), (f64, f64)> = BTreeMap::new();

        for i in 0..n {
            let mut dists: Vec<(usize, f64)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (j, distances[(i, j)]))
                .collect();
            dists.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            dists.truncate(k);

            // Local connectivity: distance to the nearest distinct neighbor
            let rho = dists
                .iter()
                .map(|&(_, d)| d)
                .find(|&d| d > 0.0)
                .unwrap_or(0.0);
            let knn: Vec<f64> = dists.iter().map(|&(_, d)| d).collect();
            let sigma = find_sigma(&knn, rho, target);

            for &(j, d) in &dists {
                let w = if d <= rho {
                    1.0
                } else {
                    (-(d - rho) / sigma).exp()
                };
                let key = (i.min(j), i.max(j));
                let entry = memberships.entry(key).or_insert((0.0, 0.0));
                if i < j {
                    entry.0 = w;
                } else {
                    entry.1 = w;
                }
            }
        }

        // Fuzzy union: a + b - ab
        let mut edges = Vec::with_capacity(memberships.len() * 2);
        for ((i, j), (w1, w2)) in memberships {
            let w = w1 + w2 - w1 * w2;
            if w > 1e-10 {
                edges.push((i, j, w));
                edges.push((j, i, w));
            }
        }

        FuzzyGraph { n_points: n, edges }
    }

    /// Negative-sampling SGD over the graph edges.
    fn optimize(
        &self,
        embedding: &mut DMatrix<f64>,
        graph: &FuzzyGraph,
        a: f64,
        b: f64,
        rng: &mut ChaCha8Rng,
    ) {
        let n = graph.n_points;
        let dim = embedding.ncols();
        let n_epochs = self.config.params().n_epochs;
        if graph.edges.is_empty() {
            return;
        }

        let max_w = graph.edges.iter().map(|e| e.2).fold(0.0f64, f64::max);
        let epochs_per_sample: Vec<f64> = graph.edges.iter().map(|&(_, _, w)| max_w / w).collect();
        let epochs_per_negative: Vec<f64> = epochs_per_sample
            .iter()
            .map(|&e| e / NEGATIVE_SAMPLE_RATE as f64)
            .collect();
        let mut next_sample = epochs_per_sample.clone();
        let mut next_negative = epochs_per_negative.clone();

        let mut yi = vec![0.0; dim];
        let mut yj = vec![0.0; dim];
        for epoch in 0..n_epochs {
            let alpha = LEARNING_RATE * (1.0 - epoch as f64 / n_epochs as f64);
            let now = epoch as f64;

            for (e, &(i, j, _)) in graph.edges.iter().enumerate() {
                if next_sample[e] > now {
                    continue;
                }

                // Attraction
                read_row(embedding, i, &mut yi);
                read_row(embedding, j, &mut yj);
                let dist_sq = squared_euclidean(&yi, &yj);
                if dist_sq > 0.0 {
                    let coeff = -2.0 * a * b * dist_sq.powf(b - 1.0) / (1.0 + a * dist_sq.powf(b));
                    for d in 0..dim {
                        let grad = (coeff * (yi[d] - yj[d])).clamp(-GRAD_CLIP, GRAD_CLIP);
                        embedding[(i, d)] += alpha * grad;
                        embedding[(j, d)] -= alpha * grad;
                    }
                }
                next_sample[e] += epochs_per_sample[e];

                // Repulsion from random points
                let n_neg = ((now - next_negative[e]) / epochs_per_negative[e]).max(0.0) as usize;
                for _ in 0..n_neg {
                    let k = rng.gen_range(0..n);
                    if k == i {
                        continue;
                    }
                    read_row(embedding, i, &mut yi);
                    read_row(embedding, k, &mut yj);
                    let dist_sq = squared_euclidean(&yi, &yj);
                    if dist_sq == 0.0 {
                        continue;
                    }
                    let coeff = 2.0 * b / ((0.001 + dist_sq) * (1.0 + a * dist_sq.powf(b)));
                    for d in 0..dim {
                        let grad = (coeff * (yi[d] - yj[d])).clamp(-GRAD_CLIP, GRAD_CLIP);
                        embedding[(i, d)] += alpha * grad;
                    }
                }
                next_negative[e] += n_neg as f64 * epochs_per_negative[e];
            }
        }
    }
}

impl DimensionReducer for Umap {
    fn fit_transform(&mut self, data: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        check_input(data, "UMAP")?;
        let n = data.nrows();
        let params = self.config.params();
        if n < 2 {
            return Err(ProtspaceError::InsufficientData {
                method: "UMAP".to_string(),
                min: 2,
                got: n,
            });
        }
        let k = params.n_neighbors.min(n - 1);
        if k < params.n_neighbors {
            warn!(
                requested = params.n_neighbors,
                used = k,
                n,
                "n_neighbors is not smaller than the number of proteins; using n - 1"
            );
        }
        self.fitted_neighbors = Some(k);

        let distances = pairwise_distances(data, params.metric);
        let graph = self.build_fuzzy_graph(&distances, k);
        let (a, b) = find_ab_params(params.spread, params.min_dist);
        debug!(edges = graph.edges.len(), a, b, "UMAP graph built");

        let mut rng = ChaCha8Rng::seed_from_u64(params.random_state);
        let k = self.config.n_components();
        let mut embedding =
            DMatrix::from_fn(n, k, |_, _| rng.gen_range(-INIT_SCALE..INIT_SCALE));

        self.optimize(&mut embedding, &graph, a, b, &mut rng);

        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(ProtspaceError::Numerical(
                "UMAP optimization diverged".to_string(),
            ));
        }
        Ok(embedding)
    }

    fn params(&self) -> ProjectionInfo {
        let params = self.config.params();
        let mut info = ProjectionInfo::new();
        info.insert("n_components".into(), json!(self.config.n_components()));
        let n_neighbors = self.fitted_neighbors.unwrap_or(params.n_neighbors);
        info.insert("n_neighbors".into(), json!(n_neighbors));
        info.insert("min_dist".into(), json!(params.min_dist));
        info.insert("metric".into(), json!(params.metric.as_str()));
        info
    }
}

fn read_row(m: &DMatrix<f64>, row: usize, out: &mut [f64]) {
    for (d, v) in out.iter_mut().enumerate() {
        *v = m[(row, d)];
    }
}

/// Binary search for the bandwidth whose membership sum equals `target`.
fn find_sigma(distances: &[f64], rho: f64, target: f64) -> f64 {
    let mut lo = 0.0f64;
    let mut hi = f64::INFINITY;
    let mut sigma = 1.0f64;

    for _ in 0..64 {
        let sum: f64 = distances
            .iter()
            .map(|&d| if d > rho { (-(d - rho) / sigma).exp() } else { 1.0 })
            .sum();

        if (sum - target).abs() < 1e-5 {
            break;
        }
        if sum > target {
            hi = sigma;
            sigma = (lo + hi) / 2.0;
        } else {
            lo = sigma;
            sigma = if hi.is_infinite() { sigma * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    sigma.max(1e-3 * mean(distances).max(1e-12))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Fit `1 / (1 + a d^(2b))` to the target curve implied by `spread` and
/// `min_dist`, by successive grid refinement over (ln a, b).
pub(crate) fn find_ab_params(spread: f64, min_dist: f64) -> (f64, f64) {
    let xs: Vec<f64> = (0..300).map(|i| 3.0 * spread * i as f64 / 299.0).collect();
    let ys: Vec<f64> = xs
        .iter()
        .map(|&x| if x < min_dist { 1.0 } else { (-(x - min_dist) / spread).exp() })
        .collect();
    let sse = |a: f64, b: f64| -> f64 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                let f = 1.0 / (1.0 + a * x.powf(2.0 * b));
                (f - y).powi(2)
            })
            .sum()
    };

    const STEPS: usize = 40;
    let (mut ln_a_lo, mut ln_a_hi) = ((1e-3f64).ln(), (1e3f64).ln());
    let (mut b_lo, mut b_hi) = (0.1f64, 3.0f64);
    let mut best = (1.0f64.ln(), 1.0f64, f64::INFINITY);

    for _ in 0..8 {
        let da = (ln_a_hi - ln_a_lo) / STEPS as f64;
        let db = (b_hi - b_lo) / STEPS as f64;
        for ia in 0..=STEPS {
            let ln_a = ln_a_lo + da * ia as f64;
            for ib in 0..=STEPS {
                let b = b_lo + db * ib as f64;
                let err = sse(ln_a.exp(), b);
                if err < best.2 {
                    best = (ln_a, b, err);
                }
            }
        }
        ln_a_lo = best.0 - 2.0 * da;
        ln_a_hi = best.0 + 2.0 * da;
        b_lo = (best.1 - 2.0 * db).max(1e-3);
        b_hi = best.1 + 2.0 * db;
    }

    (best.0.exp(), best.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::ReductionParams;

    fn umap(n_neighbors: usize) -> Umap {
        let params = ReductionParams {
            n_neighbors,
            n_epochs: 100,
            ..ReductionParams::default()
        };
        Umap::new(DimensionReductionConfig::new(2, params).unwrap())
    }

    fn two_blobs() -> DMatrix<f64> {
        DMatrix::from_fn(20, 4, |i, j| {
            let offset = if i < 10 { 0.0 } else { 50.0 };
            offset + ((i * 3 + j * 5) % 7) as f64 * 0.1
        })
    }

    #[test]
    fn test_ab_params_for_defaults() {
        let (a, b) = find_ab_params(1.0, 0.1);
        assert!((1.4..1.8).contains(&a), "a = {a}");
        assert!((0.8..1.0).contains(&b), "b = {b}");
    }

    #[test]
    fn test_output_shape_and_seeded_determinism() {
        let data = two_blobs();
        let a = umap(5).fit_transform(&data).unwrap();
        let b = umap(5).fit_transform(&data).unwrap();
        assert_eq!(a.shape(), (20, 2));
        assert_eq!(a, b);
    }

    #[test]
    fn test_small_input_clamps_neighbors() {
        let data = DMatrix::from_fn(10, 5, |i, j| ((i * 7 + j * 3) % 11) as f64);
        let mut reducer = umap(15);
        assert_eq!(reducer.params()["n_neighbors"], 15);

        let coords = reducer.fit_transform(&data).unwrap();
        assert_eq!(coords.shape(), (10, 2));
        assert!(coords.iter().all(|v| v.is_finite()));
        assert_eq!(reducer.params()["n_neighbors"], 9);
    }

    #[test]
    fn test_single_point_is_rejected() {
        let data = DMatrix::from_row_slice(1, 3, &[1.0, 2.0, 3.0]);
        let err = umap(15).fit_transform(&data).unwrap_err();
        assert!(matches!(err, ProtspaceError::InsufficientData { min: 2, got: 1, .. }));
    }

    #[test]
    fn test_graph_is_symmetric() {
        let data = two_blobs();
        let reducer = umap(4);
        let graph =
            reducer.build_fuzzy_graph(&pairwise_distances(&data, Default::default()), 4);
        let edges: BTreeMap<(usize, usize), f64> =
            graph.edges.iter().map(|&(i, j, w)| ((i, j), w)).collect();
        for (&(i, j), &w) in &edges {
            assert_eq!(edges.get(&(j, i)), Some(&w));
            assert!(w > 0.0 && w <= 1.0);
        }
    }

    #[test]
    fn test_info() {
        let info = umap(7).params();
        assert_eq!(info["n_neighbors"], 7);
        assert_eq!(info["min_dist"], 0.1);
        assert_eq!(info["metric"], "euclidean");
    }
}
