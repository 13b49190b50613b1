//! Human-readable overview of a document.

use super::model::Document;
use crate::reduce::ProjectionInfo;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSummary {
    pub name: String,
    /// Distinct non-missing values.
    pub n_values: usize,
    /// Proteins where the feature is missing or absent.
    pub n_missing: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSummary {
    pub name: String,
    pub dimensions: usize,
    pub n_points: usize,
    pub info: ProjectionInfo,
}

/// Counts and per-projection details of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSummary {
    pub n_proteins: usize,
    pub features: Vec<FeatureSummary>,
    pub projections: Vec<ProjectionSummary>,
    pub n_color_entries: usize,
    pub n_shape_entries: usize,
}

impl Document {
    /// Summarize proteins, features, projections and styling.
    pub fn summary(&self) -> DocumentSummary {
        let features = self
            .all_features()
            .into_iter()
            .map(|name| {
                let n_missing = self
                    .protein_data
                    .values()
                    .filter(|e| e.features.get(&name).map_or(true, |v| v.is_missing()))
                    .count();
                FeatureSummary {
                    n_values: self.unique_feature_values(&name).len(),
                    n_missing,
                    name,
                }
            })
            .collect();

        let projections = self
            .projections
            .iter()
            .map(|p| ProjectionSummary {
                name: p.name.clone(),
                dimensions: p.dimensions,
                n_points: p.n_points(),
                info: p.info.clone(),
            })
            .collect();

        let (n_color_entries, n_shape_entries) = match &self.visualization_state {
            Some(state) => (
                state.feature_colors.values().map(|m| m.len()).sum(),
                state.marker_shapes.values().map(|m| m.len()).sum(),
            ),
            None => (0, 0),
        };

        DocumentSummary {
            n_proteins: self.protein_data.len(),
            features,
            projections,
            n_color_entries,
            n_shape_entries,
        }
    }
}

impl fmt::Display for DocumentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Proteins: {}", self.n_proteins)?;
        writeln!(f, "Features: {}", self.features.len())?;
        for feature in &self.features {
            writeln!(
                f,
                "  {}: {} distinct values, {} missing",
                feature.name, feature.n_values, feature.n_missing
            )?;
        }
        writeln!(f, "Projections: {}", self.projections.len())?;
        for p in &self.projections {
            writeln!(f, "  {} ({}D, {} points)", p.name, p.dimensions, p.n_points)?;
            for (key, value) in &p.info {
                writeln!(f, "    {}: {}", key, value)?;
            }
        }
        write!(
            f,
            "Styling: {} colors, {} shapes",
            self.n_color_entries, self.n_shape_entries
        )
    }
}
