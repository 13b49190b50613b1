//! Protein Embedding Landscape Library
//!
//! Projects high-dimensional protein representations to 2D/3D and keeps the
//! results, with per-protein metadata and user styling, in one incrementally
//! updated JSON document.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Input loading (embeddings, similarity matrices, pairwise score
//!   tables) aligned with optional metadata
//! - **reduce**: Dimension reduction (PCA, UMAP, t-SNE, MDS) behind one trait
//! - **document**: Building, merging, styling and atomically saving documents
//! - **pipeline**: Pipeline composition and execution
//!
//! # Example
//!
//! ```no_run
//! use protspace::prelude::*;
//! use std::path::Path;
//!
//! let output = Pipeline::new()
//!     .method("pca2")
//!     .method("umap2")
//!     .custom_name("umap2", "UMAP")
//!     .run_and_save(
//!         Path::new("embeddings.json"),
//!         Some(Path::new("metadata.csv")),
//!         Path::new("landscape.json"),
//!     )
//!     .unwrap();
//!
//! for warning in &output.warnings {
//!     eprintln!("warning: {}", warning);
//! }
//! ```

pub mod data;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod reduce;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{
        load, load_with_format, EmbeddingSet, FeatureValue, InputFormat, LoadWarning,
        LoadedInput, MetadataSource, MetadataTable, PairwiseTable, ScoreTransform,
        SimilarityMatrix,
    };
    pub use crate::document::{
        apply_feature_styles, build_document, merge_documents, Document, DocumentStore,
        DocumentSummary, FeatureStyles, ProjectionRecord, VisualizationState,
    };
    pub use crate::error::{ProtspaceError, Result};
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineOutput};
    pub use crate::reduce::{
        DimensionReducer, DimensionReductionConfig, Dissimilarity, Mds, MethodSpec, Metric, Pca,
        PrecomputedKind, ReductionMethod, ReductionParams, ReductionResult, Reducer, Tsne, Umap,
    };
}
