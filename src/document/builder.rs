//! Assemble a document from metadata and reduction results.

use super::model::{Coordinates, Document, ProjectionPoint, ProjectionRecord, ProteinEntry};
use crate::data::MetadataTable;
use crate::error::{ProtspaceError, Result};
use crate::reduce::ReductionResult;
use std::collections::BTreeMap;
use tracing::debug;

/// Build a document from a metadata table and reduction results.
///
/// Each result's rows are zipped positionally with `identifiers`. Every
/// identifier gets a protein entry, using its metadata row when one exists
/// and explicit missing markers otherwise.
pub fn build_document(
    metadata: &MetadataTable,
    results: &[ReductionResult],
    identifiers: &[String],
) -> Result<Document> {
    let mut protein_data = BTreeMap::new();
    for id in metadata.identifiers().iter().chain(identifiers) {
        protein_data
            .entry(id.clone())
            .or_insert_with(|| ProteinEntry {
                features: metadata.features(id),
            });
    }

    let projections = results
        .iter()
        .map(|result| projection_record(result, identifiers))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        n_proteins = protein_data.len(),
        n_projections = projections.len(),
        "Built document"
    );

    Ok(Document {
        protein_data,
        projections,
        ..Document::default()
    })
}

fn projection_record(result: &ReductionResult, identifiers: &[String]) -> Result<ProjectionRecord> {
    let coords = &result.coordinates;
    if coords.nrows() != identifiers.len() {
        return Err(ProtspaceError::RowCountMismatch {
            projection: result.name.clone(),
            expected: identifiers.len(),
            actual: coords.nrows(),
        });
    }
    if coords.ncols() != result.dimensions {
        return Err(ProtspaceError::DimensionMismatch {
            expected: result.dimensions,
            actual: coords.ncols(),
        });
    }
    if coords.iter().any(|v| !v.is_finite()) {
        return Err(ProtspaceError::Numerical(format!(
            "projection '{}' contains non-finite coordinates",
            result.name
        )));
    }

    let data = identifiers
        .iter()
        .enumerate()
        .map(|(row, id)| {
            let values: Vec<f64> = coords.row(row).iter().copied().collect();
            Ok(ProjectionPoint {
                identifier: id.clone(),
                coordinates: Coordinates::from_slice(&values)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ProjectionRecord {
        name: result.name.clone(),
        dimensions: result.dimensions,
        info: result.info.clone(),
        data,
    })
}
