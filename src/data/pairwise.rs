//! Long-format pairwise score tables (query, target, score) converted into
//! square similarity matrices.

use super::{delimiter_for, LoadWarning, SimilarityMatrix};
use crate::error::{ProtspaceError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// Smallest e-value used before taking the logarithm.
const MIN_EVALUE: f64 = 1e-300;

/// How raw scores are turned into "higher is closer" similarities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTransform {
    /// Use the score as is (identity fractions, TM-scores, lDDT).
    Identity,
    /// `-log10(e)`, with zero e-values clamped to 1e-300.
    EValue,
    /// Bit scores, higher is better already.
    Bits,
    /// `(max - r) / max`, so the smallest deviation scores highest.
    Rmsd,
}

impl ScoreTransform {
    /// Pick the transform implied by a well-known score column name.
    pub fn for_column(column: &str) -> Self {
        match column.to_lowercase().as_str() {
            "evalue" => Self::EValue,
            "bits" => Self::Bits,
            "rmsd" => Self::Rmsd,
            _ => Self::Identity,
        }
    }

    /// Apply the transform to a whole column.
    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        match self {
            Self::Identity | Self::Bits => values.to_vec(),
            Self::EValue => values
                .iter()
                .map(|&e| -(e.max(MIN_EVALUE)).log10())
                .collect(),
            Self::Rmsd => {
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if max > 0.0 {
                    values.iter().map(|&r| (max - r) / max).collect()
                } else {
                    // All deviations are zero: every pair is structurally identical
                    vec![1.0; values.len()]
                }
            }
        }
    }
}

impl fmt::Display for ScoreTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identity => "identity",
            Self::EValue => "evalue",
            Self::Bits => "bits",
            Self::Rmsd => "rmsd",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ScoreTransform {
    type Err = ProtspaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "identity" | "none" => Ok(Self::Identity),
            "evalue" => Ok(Self::EValue),
            "bits" => Ok(Self::Bits),
            "rmsd" => Ok(Self::Rmsd),
            other => Err(ProtspaceError::InvalidConfig(format!(
                "Unknown score transform '{}' (supported: identity, evalue, bits, rmsd)",
                other
            ))),
        }
    }
}

/// One score column of a pairwise comparison table.
#[derive(Debug, Clone)]
pub struct PairwiseTable {
    queries: Vec<String>,
    targets: Vec<String>,
    scores: Vec<f64>,
    score_column: String,
}

impl PairwiseTable {
    /// Create from parallel query/target/score columns.
    pub fn new(
        queries: Vec<String>,
        targets: Vec<String>,
        scores: Vec<f64>,
        score_column: impl Into<String>,
    ) -> Result<Self> {
        if queries.len() != targets.len() {
            return Err(ProtspaceError::DimensionMismatch {
                expected: queries.len(),
                actual: targets.len(),
            });
        }
        if queries.len() != scores.len() {
            return Err(ProtspaceError::DimensionMismatch {
                expected: queries.len(),
                actual: scores.len(),
            });
        }
        if queries.is_empty() {
            return Err(ProtspaceError::EmptyData(
                "Pairwise table has no rows".to_string(),
            ));
        }
        Ok(Self {
            queries,
            targets,
            scores,
            score_column: score_column.into(),
        })
    }

    /// Read a delimited table with `query`, `target` and `score_column` columns.
    pub fn from_path<P: AsRef<Path>>(path: P, score_column: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .from_path(path)?;

        let header: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let column = |name: &str| {
            header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| ProtspaceError::MissingColumn(name.to_string()))
        };
        let query_idx = column("query")?;
        let target_idx = column("target")?;
        let score_idx = column(score_column)?;

        let mut queries = Vec::new();
        let mut targets = Vec::new();
        let mut scores = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");
            let score_str = field(score_idx);
            let score: f64 = score_str.parse().map_err(|_| {
                ProtspaceError::Numerical(format!(
                    "Invalid {} value '{}' at row {}",
                    score_column,
                    score_str,
                    row_idx + 1
                ))
            })?;
            queries.push(field(query_idx).to_string());
            targets.push(field(target_idx).to_string());
            scores.push(score);
        }

        debug!(
            rows = scores.len(),
            column = score_column,
            "loaded pairwise table from {}",
            path.display()
        );
        Self::new(queries, targets, scores, score_column)
    }

    /// Number of scored pairs.
    pub fn n_pairs(&self) -> usize {
        self.scores.len()
    }

    /// Name of the score column.
    pub fn score_column(&self) -> &str {
        &self.score_column
    }

    /// Sorted union of query and target identifiers.
    pub fn identifiers(&self) -> Vec<String> {
        self.queries
            .iter()
            .chain(self.targets.iter())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Build the square similarity matrix.
    ///
    /// Scores are transformed, min-max normalized to [0, 1] and rounded to
    /// three decimals. Pairs that were never compared stay 0; the diagonal is 1.
    /// A constant score range skips normalization and records a warning.
    pub fn to_similarity(
        &self,
        transform: ScoreTransform,
    ) -> Result<(SimilarityMatrix, Vec<LoadWarning>)> {
        let mut warnings = Vec::new();
        let transformed = transform.apply(&self.scores);
        let (min, max) = transformed
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        let values: Vec<f64> = if min < max {
            transformed
                .iter()
                .map(|&v| round3((v - min) / (max - min)))
                .collect()
        } else {
            warn!(
                column = %self.score_column,
                value = min,
                "constant score range, skipping normalization"
            );
            warnings.push(LoadWarning::ConstantRange {
                context: format!("score column '{}'", self.score_column),
                value: min,
            });
            transformed.iter().map(|&v| round3(v)).collect()
        };

        let identifiers = self.identifiers();
        let index: HashMap<&str, usize> = identifiers
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let n = identifiers.len();

        let mut tri_mat = TriMat::new((n, n));
        for ((query, target), value) in self.queries.iter().zip(&self.targets).zip(values) {
            if let (Some(&row), Some(&col)) = (index.get(query.as_str()), index.get(target.as_str())) {
                tri_mat.add_triplet(row, col, value);
            }
        }
        let sparse: CsMat<f64> = tri_mat.to_csr();

        let mut dense = DMatrix::zeros(n, n);
        for (&value, (row, col)) in sparse.iter() {
            dense[(row, col)] = value;
        }
        dense.fill_diagonal(1.0);

        Ok((SimilarityMatrix::new(dense, identifiers)?, warnings))
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
