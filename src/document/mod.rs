//! The projection document: building, merging, styling and persistence.

mod builder;
mod merge;
mod model;
mod store;
mod style;
mod summary;

pub use builder::build_document;
pub use merge::merge_documents;
pub use model::{
    Coordinates, Document, FeatureSet, ProjectionPoint, ProjectionRecord, ProteinEntry, StyleMap,
    VisualizationState,
};
pub use store::DocumentStore;
pub use style::{apply_feature_styles, FeatureStyle, FeatureStyles, ALLOWED_SHAPES};
pub use summary::{DocumentSummary, FeatureSummary, ProjectionSummary};
