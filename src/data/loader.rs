//! Input loading: embeddings or a similarity matrix, aligned with metadata.

use super::{EmbeddingSet, LoadWarning, MetadataSource, MetadataTable, SimilarityMatrix};
use crate::error::{ProtspaceError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Supported primary input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// Keyed JSON container of one (possibly nested) numeric array per identifier.
    EmbeddingJson,
    /// Delimited rows of `identifier, v1, ..., vD`.
    EmbeddingTable,
    /// Square labelled similarity or distance matrix.
    SimilarityMatrix,
}

impl InputFormat {
    /// Infer the format from a file extension.
    ///
    /// `.json` is an embedding container, `.csv`/`.tsv` a similarity matrix.
    /// Embedding tables share those extensions and must be requested explicitly.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::EmbeddingJson),
            Some("csv") | Some("tsv") => Ok(Self::SimilarityMatrix),
            _ => Err(ProtspaceError::UnsupportedInput(format!(
                "{} (expected .json embeddings or a .csv/.tsv similarity matrix)",
                path.display()
            ))),
        }
    }

    /// Whether rows are precomputed pairwise values rather than feature vectors.
    pub fn is_similarity(&self) -> bool {
        matches!(self, Self::SimilarityMatrix)
    }
}

/// Everything a reduction run needs, aligned by row.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    /// Metadata left-joined onto `identifiers` (one row per identifier).
    pub metadata: MetadataTable,
    /// Row `i` belongs to `identifiers[i]`.
    pub matrix: DMatrix<f64>,
    /// Canonical identifier order for this run.
    pub identifiers: Vec<String>,
    /// Which kind of input produced `matrix`.
    pub kind: InputFormat,
    /// Non-fatal corrections applied while loading.
    pub warnings: Vec<LoadWarning>,
}

impl LoadedInput {
    /// Number of identifiers (matrix rows).
    pub fn n_samples(&self) -> usize {
        self.identifiers.len()
    }
}

/// Load an input file, detecting its format from the extension.
pub fn load<P: AsRef<Path>>(input: P, metadata: Option<&Path>) -> Result<LoadedInput> {
    let format = InputFormat::from_path(&input)?;
    load_with_format(input, format, metadata)
}

/// Load an input file of a known format, then align metadata with it.
///
/// Without a metadata path the run gets an identifier-only table. A metadata
/// file that cannot be used degrades to the same table and is reported as a
/// warning.
pub fn load_with_format<P: AsRef<Path>>(
    input: P,
    format: InputFormat,
    metadata: Option<&Path>,
) -> Result<LoadedInput> {
    let input = input.as_ref();
    let mut warnings = Vec::new();

    let (identifiers, matrix) = match format {
        InputFormat::EmbeddingJson => EmbeddingSet::from_json(input)?.into_parts(),
        InputFormat::EmbeddingTable => EmbeddingSet::from_table(input)?.into_parts(),
        InputFormat::SimilarityMatrix => {
            let mut similarity = SimilarityMatrix::from_path(input)?;
            warnings.extend(similarity.symmetrize());
            similarity.into_parts()
        }
    };

    let metadata = match metadata {
        None => MetadataTable::identifier_only(&identifiers),
        Some(path) => match MetadataSource::load(path) {
            MetadataSource::Available(table) => {
                if table.n_duplicates() > 0 {
                    warn!(
                        n_duplicates = table.n_duplicates(),
                        "duplicate identifiers in metadata, keeping first rows"
                    );
                    warnings.push(LoadWarning::DuplicateMetadataRows {
                        n_duplicates: table.n_duplicates(),
                    });
                }
                if table.n_non_finite() > 0 {
                    warn!(
                        n_cells = table.n_non_finite(),
                        "infinite metadata values stored as missing"
                    );
                    warnings.push(LoadWarning::NonFiniteMetadata {
                        n_cells: table.n_non_finite(),
                    });
                }
                let covered = table.coverage(&identifiers);
                if covered < identifiers.len() {
                    info!(
                        covered,
                        total = identifiers.len(),
                        "metadata does not cover every identifier"
                    );
                }
                table.left_join(&identifiers)
            }
            MetadataSource::Unavailable { reason } => {
                warnings.push(LoadWarning::MetadataUnavailable { reason });
                MetadataTable::identifier_only(&identifiers)
            }
        },
    };

    info!(
        n = identifiers.len(),
        dim = matrix.ncols(),
        format = ?format,
        "loaded {}",
        input.display()
    );

    Ok(LoadedInput {
        metadata,
        matrix,
        identifiers,
        kind: format,
        warnings,
    })
}
