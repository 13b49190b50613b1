//! Reduction method names and `<name><dims>` method specs.

use super::{DimensionReductionConfig, ReductionParams};
use crate::error::{ProtspaceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The supported reducer families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReductionMethod {
    /// Principal component analysis.
    Pca,
    /// Uniform manifold approximation and projection.
    Umap,
    /// t-distributed stochastic neighbor embedding.
    Tsne,
    /// Multidimensional scaling.
    Mds,
}

impl ReductionMethod {
    /// Every supported method, in listing order.
    pub const ALL: [ReductionMethod; 4] = [Self::Pca, Self::Umap, Self::Tsne, Self::Mds];

    /// Lower-case name used in method specs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pca => "pca",
            Self::Umap => "umap",
            Self::Tsne => "tsne",
            Self::Mds => "mds",
        }
    }

    /// Comma-separated list of supported names.
    pub fn supported() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ReductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReductionMethod {
    type Err = ProtspaceError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == name)
            .ok_or_else(|| ProtspaceError::UnknownMethod {
                name,
                supported: Self::supported(),
            })
    }
}

/// A parsed method spec such as `pca2` or `tsne3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSpec {
    method: ReductionMethod,
    dims: usize,
}

impl MethodSpec {
    /// Create a spec from its parts.
    pub fn new(method: ReductionMethod, dims: usize) -> Self {
        Self { method, dims }
    }

    /// Parse `<name><digit>`, case-insensitively.
    ///
    /// An unrecognized name fails with `UnknownMethod`. The digit is not
    /// range-checked here; `config` rejects anything but 2 or 3.
    pub fn parse(spec: &str) -> Result<Self> {
        let normalized = spec.trim().to_lowercase();
        let invalid = || ProtspaceError::InvalidMethodSpec(spec.to_string());

        let mut chars = normalized.chars();
        let dims = chars
            .next_back()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(invalid)? as usize;
        let name = chars.as_str();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(invalid());
        }
        let method: ReductionMethod = name.parse()?;

        Ok(Self { method, dims })
    }

    /// The reducer family.
    pub fn method(&self) -> ReductionMethod {
        self.method
    }

    /// Requested output dimensionality.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Projection name used when no custom name is given, e.g. `PCA_2`.
    pub fn default_name(&self) -> String {
        format!("{}_{}", self.method.as_str().to_uppercase(), self.dims)
    }

    /// Build the validated config for this spec.
    pub fn config(&self, params: &ReductionParams) -> Result<DimensionReductionConfig> {
        DimensionReductionConfig::new(self.dims, params.clone())
    }
}

impl fmt::Display for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.method, self.dims)
    }
}

impl FromStr for MethodSpec {
    type Err = ProtspaceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
