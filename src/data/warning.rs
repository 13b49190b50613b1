//! Non-fatal conditions observed while loading inputs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A recoverable condition that was corrected during loading.
///
/// Warnings are logged when they occur and also handed back to the caller,
/// so a run can complete while still reporting what was adjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadWarning {
    /// The similarity matrix was not symmetric and was replaced by (M + Mᵗ)/2.
    AsymmetricMatrix { max_deviation: f64 },
    /// A value range was constant, so min-max normalization was skipped.
    ConstantRange { context: String, value: f64 },
    /// Metadata could not be used; an identifier-only table was substituted.
    MetadataUnavailable { reason: String },
    /// Identifiers listed more than once in the metadata; first rows were kept.
    DuplicateMetadataRows { n_duplicates: usize },
    /// Infinite numeric metadata cells, stored as missing values.
    NonFiniteMetadata { n_cells: usize },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsymmetricMatrix { max_deviation } => write!(
                f,
                "similarity matrix is not symmetric (max |M - Mᵗ| = {:.3e}), using (M + Mᵗ)/2",
                max_deviation
            ),
            Self::ConstantRange { context, value } => write!(
                f,
                "{} has a constant value range ({}), normalization skipped",
                context, value
            ),
            Self::MetadataUnavailable { reason } => {
                write!(f, "metadata unavailable ({}), using identifiers only", reason)
            }
            Self::DuplicateMetadataRows { n_duplicates } => write!(
                f,
                "{} duplicate metadata rows ignored (first occurrence kept)",
                n_duplicates
            ),
            Self::NonFiniteMetadata { n_cells } => write!(
                f,
                "{} infinite metadata values stored as missing",
                n_cells
            ),
        }
    }
}
