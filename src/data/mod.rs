//! Input data: embeddings, similarity matrices, pairwise tables and metadata.

mod embeddings;
mod loader;
mod metadata;
mod pairwise;
mod similarity;
mod warning;

use std::path::Path;

pub use embeddings::EmbeddingSet;
pub use loader::{load, load_with_format, InputFormat, LoadedInput};
pub use metadata::{ColumnType, FeatureValue, MetadataSource, MetadataTable, IDENTIFIER_COLUMN};
pub use pairwise::{PairwiseTable, ScoreTransform};
pub use similarity::{SimilarityMatrix, SYMMETRY_ATOL, SYMMETRY_RTOL};
pub use warning::LoadWarning;

/// Field delimiter for a delimited file: tab for `.tsv`, comma otherwise.
pub(crate) fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}
