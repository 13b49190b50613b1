//! Reducer parameters and their validation.

use crate::error::{ProtspaceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance metric used by the neighbor-based reducers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    Cosine,
    Manhattan,
}

impl Metric {
    /// Name as written in configs and projection info.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Cosine => "cosine",
            Self::Manhattan => "manhattan",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ProtspaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "cosine" => Ok(Self::Cosine),
            "manhattan" => Ok(Self::Manhattan),
            _ => Err(ProtspaceError::UnsupportedMetric(s.to_string())),
        }
    }
}

/// What the MDS input rows are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dissimilarity {
    /// Feature vectors; distances are computed as Euclidean.
    #[default]
    Euclidean,
    /// A square matrix of precomputed pairwise values.
    Precomputed,
}

impl Dissimilarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Precomputed => "precomputed",
        }
    }
}

impl FromStr for Dissimilarity {
    type Err = ProtspaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "precomputed" => Ok(Self::Precomputed),
            other => Err(ProtspaceError::InvalidConfig(format!(
                "dissimilarity must be 'euclidean' or 'precomputed', got '{}'",
                other
            ))),
        }
    }
}

/// How a precomputed matrix is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecomputedKind {
    /// Values are distances and are used as given.
    #[default]
    Dissimilarity,
    /// Values are similarities and are converted with `sqrt(max(S) - S)`.
    Similarity,
    /// Convert only when every diagonal entry is close to 1.
    Detect,
}

impl PrecomputedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dissimilarity => "dissimilarity",
            Self::Similarity => "similarity",
            Self::Detect => "detect",
        }
    }
}

impl FromStr for PrecomputedKind {
    type Err = ProtspaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dissimilarity" => Ok(Self::Dissimilarity),
            "similarity" => Ok(Self::Similarity),
            "detect" => Ok(Self::Detect),
            other => Err(ProtspaceError::InvalidConfig(format!(
                "precomputed_kind must be 'dissimilarity', 'similarity' or 'detect', got '{}'",
                other
            ))),
        }
    }
}

/// User-facing reducer parameters.
///
/// Every reducer reads the subset it needs; the others are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionParams {
    /// Neighborhood size for UMAP.
    pub n_neighbors: usize,
    /// Distance metric for UMAP and t-SNE.
    pub metric: Metric,
    /// Seed for every stochastic reducer.
    pub random_state: u64,
    /// Minimum spacing of embedded points (UMAP).
    pub min_dist: f64,
    /// Scale of embedded points (UMAP).
    pub spread: f64,
    /// Optimization epochs (UMAP).
    pub n_epochs: usize,
    /// Effective neighbor count (t-SNE).
    pub perplexity: f64,
    /// Gradient step (t-SNE).
    pub learning_rate: f64,
    /// Gradient descent iterations (t-SNE).
    pub n_iter: usize,
    /// P-matrix multiplier for the first phase (t-SNE).
    pub early_exaggeration: f64,
    /// Number of SMACOF starts (MDS).
    pub n_init: usize,
    /// SMACOF iterations per start (MDS).
    pub max_iter: usize,
    /// Relative stress tolerance (MDS).
    pub eps: f64,
    /// Whether MDS input is feature vectors or a precomputed matrix.
    pub dissimilarity: Dissimilarity,
    /// Interpretation of a precomputed MDS matrix.
    pub precomputed_kind: PrecomputedKind,
}

impl Default for ReductionParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            metric: Metric::Euclidean,
            random_state: 42,
            min_dist: 0.1,
            spread: 1.0,
            n_epochs: 200,
            perplexity: 30.0,
            learning_rate: 200.0,
            n_iter: 1000,
            early_exaggeration: 12.0,
            n_init: 4,
            max_iter: 300,
            eps: 1e-3,
            dissimilarity: Dissimilarity::Euclidean,
            precomputed_kind: PrecomputedKind::Dissimilarity,
        }
    }
}

/// Validated, immutable parameter bundle for one reducer run.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionReductionConfig {
    n_components: usize,
    params: ReductionParams,
}

impl DimensionReductionConfig {
    /// Validate and freeze parameters. Fails on the first invalid field.
    pub fn new(n_components: usize, params: ReductionParams) -> Result<Self> {
        if !(2..=3).contains(&n_components) {
            return invalid(format!("n_components must be 2 or 3, got {}", n_components));
        }
        if params.n_neighbors < 1 {
            return invalid("n_neighbors must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&params.min_dist) {
            return invalid(format!("min_dist must be in [0, 1], got {}", params.min_dist));
        }
        if !(params.spread > 0.0) {
            return invalid(format!("spread must be positive, got {}", params.spread));
        }
        if params.min_dist > params.spread {
            return invalid(format!(
                "min_dist ({}) must not exceed spread ({})",
                params.min_dist, params.spread
            ));
        }
        if params.n_epochs < 1 {
            return invalid("n_epochs must be at least 1".to_string());
        }
        if !(1.0..=100.0).contains(&params.perplexity) {
            return invalid(format!(
                "perplexity must be in [1, 100], got {}",
                params.perplexity
            ));
        }
        if !(params.learning_rate > 0.0) {
            return invalid(format!(
                "learning_rate must be positive, got {}",
                params.learning_rate
            ));
        }
        if params.n_iter < 1 {
            return invalid("n_iter must be at least 1".to_string());
        }
        if !(params.early_exaggeration >= 1.0) {
            return invalid(format!(
                "early_exaggeration must be at least 1, got {}",
                params.early_exaggeration
            ));
        }
        if params.n_init < 1 {
            return invalid("n_init must be at least 1".to_string());
        }
        if params.max_iter < 1 {
            return invalid("max_iter must be at least 1".to_string());
        }
        if !(params.eps > 0.0) {
            return invalid(format!("eps must be positive, got {}", params.eps));
        }

        Ok(Self {
            n_components,
            params,
        })
    }

    /// Default parameters for the given output dimensionality.
    pub fn with_defaults(n_components: usize) -> Result<Self> {
        Self::new(n_components, ReductionParams::default())
    }

    /// Output dimensionality (2 or 3).
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// The validated parameters.
    pub fn params(&self) -> &ReductionParams {
        &self.params
    }
}

fn invalid<T>(message: String) -> Result<T> {
    Err(ProtspaceError::InvalidConfig(message))
}
