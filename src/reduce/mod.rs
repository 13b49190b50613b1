//! Dimension reduction to 2 or 3 coordinates.
//!
//! Four reducer families share one interface:
//!
//! - **PCA**: linear projection onto the directions of largest variance
//! - **UMAP**: fuzzy neighbor-graph embedding optimized by negative sampling
//! - **t-SNE**: perplexity-calibrated stochastic neighbor embedding
//! - **MDS**: classical scaling refined by SMACOF stress majorization
//!
//! A reducer is built from a validated [`DimensionReductionConfig`], so invalid
//! parameters are rejected before any matrix is touched. Output row `i`
//! always belongs to input row `i`.

mod config;
pub mod distance;
mod mds;
mod method;
mod pca;
mod tsne;
mod umap;

pub use config::{DimensionReductionConfig, Dissimilarity, Metric, PrecomputedKind, ReductionParams};
pub use mds::{looks_like_similarity, similarity_to_dissimilarity, Mds};
pub use method::{MethodSpec, ReductionMethod};
pub use pca::Pca;
pub use tsne::Tsne;
pub use umap::Umap;

use crate::error::Result;
use nalgebra::DMatrix;
use serde_json::{Map, Value};

/// Parameters and diagnostics reported by a reducer.
pub type ProjectionInfo = Map<String, Value>;

/// The capability every reducer family provides.
pub trait DimensionReducer {
    /// Reduce `data` (one row per protein) to `n_components` columns.
    fn fit_transform(&mut self, data: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Parameters used, plus any diagnostics from the last fit.
    fn params(&self) -> ProjectionInfo;
}

/// Closed set of reducers, selected at runtime by method name.
#[derive(Debug, Clone)]
pub enum Reducer {
    Pca(Pca),
    Umap(Umap),
    Tsne(Tsne),
    Mds(Mds),
}

impl Reducer {
    /// Create the reducer for `method`.
    pub fn new(method: ReductionMethod, config: DimensionReductionConfig) -> Self {
        match method {
            ReductionMethod::Pca => Self::Pca(Pca::new(config)),
            ReductionMethod::Umap => Self::Umap(Umap::new(config)),
            ReductionMethod::Tsne => Self::Tsne(Tsne::new(config)),
            ReductionMethod::Mds => Self::Mds(Mds::new(config)),
        }
    }

    /// Which family this reducer belongs to.
    pub fn method(&self) -> ReductionMethod {
        match self {
            Self::Pca(_) => ReductionMethod::Pca,
            Self::Umap(_) => ReductionMethod::Umap,
            Self::Tsne(_) => ReductionMethod::Tsne,
            Self::Mds(_) => ReductionMethod::Mds,
        }
    }
}

impl DimensionReducer for Reducer {
    fn fit_transform(&mut self, data: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        match self {
            Self::Pca(r) => r.fit_transform(data),
            Self::Umap(r) => r.fit_transform(data),
            Self::Tsne(r) => r.fit_transform(data),
            Self::Mds(r) => r.fit_transform(data),
        }
    }

    fn params(&self) -> ProjectionInfo {
        match self {
            Self::Pca(r) => r.params(),
            Self::Umap(r) => r.params(),
            Self::Tsne(r) => r.params(),
            Self::Mds(r) => r.params(),
        }
    }
}

/// Output of one reducer run, ready to become a projection record.
#[derive(Debug, Clone)]
pub struct ReductionResult {
    /// Projection name (default `METHOD_DIMS` or a custom name).
    pub name: String,
    /// 2 or 3.
    pub dimensions: usize,
    /// One row per identifier, `dimensions` columns.
    pub coordinates: DMatrix<f64>,
    /// Reducer parameters and diagnostics.
    pub info: ProjectionInfo,
}

/// Flip each column so its largest-magnitude entry is positive.
///
/// Linear decompositions are defined up to sign; this makes the output
/// reproducible across runs and platforms.
pub(crate) fn fix_column_signs(coords: &mut DMatrix<f64>) {
    for mut column in coords.column_iter_mut() {
        let pivot = column
            .iter()
            .copied()
            .fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if pivot < 0.0 {
            column.neg_mut();
        }
    }
}
