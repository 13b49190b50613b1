//! The persisted projection document.
//!
//! ```json
//! {
//!   "protein_data": { "<id>": { "features": { "<feature>": <value>, ... } } },
//!   "projections": [ { "name": "PCA_2", "dimensions": 2, "info": {...},
//!                      "data": [ { "identifier": "<id>", "coordinates": { "x": .., "y": .. } } ] } ],
//!   "visualization_state": { "feature_colors": {...}, "marker_shapes": {...} }
//! }
//! ```

use crate::data::FeatureValue;
use crate::error::{ProtspaceError, Result};
use crate::reduce::ProjectionInfo;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Features of one protein, keyed by feature name.
pub type FeatureSet = BTreeMap<String, FeatureValue>;

/// value -> color or shape, for one feature.
pub type StyleMap = BTreeMap<String, String>;

/// One protein entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProteinEntry {
    #[serde(default)]
    pub features: FeatureSet,
}

/// Position of one protein in a projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Coordinates {
    /// Build from a coordinate row of length 2 or 3.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match *values {
            [x, y] => Ok(Self { x, y, z: None }),
            [x, y, z] => Ok(Self { x, y, z: Some(z) }),
            _ => Err(ProtspaceError::DimensionMismatch {
                expected: 3,
                actual: values.len(),
            }),
        }
    }

    /// Number of coordinates (2 or 3).
    pub fn dimensions(&self) -> usize {
        if self.z.is_some() {
            3
        } else {
            2
        }
    }
}

/// One identifier with its coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPoint {
    pub identifier: String,
    pub coordinates: Coordinates,
}

/// One named projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRecord {
    pub name: String,
    pub dimensions: usize,
    #[serde(default)]
    pub info: ProjectionInfo,
    pub data: Vec<ProjectionPoint>,
}

impl ProjectionRecord {
    /// Number of coordinate entries.
    pub fn n_points(&self) -> usize {
        self.data.len()
    }

    /// Coordinates of one identifier.
    pub fn coordinates(&self, identifier: &str) -> Option<&Coordinates> {
        self.data
            .iter()
            .find(|p| p.identifier == identifier)
            .map(|p| &p.coordinates)
    }

    /// Check dimensions and coordinate keys.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ProtspaceError::InvalidDocument(
                "projection with an empty name".to_string(),
            ));
        }
        if !(2..=3).contains(&self.dimensions) {
            return Err(ProtspaceError::InvalidDocument(format!(
                "projection '{}' has {} dimensions (expected 2 or 3)",
                self.name, self.dimensions
            )));
        }
        let mut seen = HashSet::new();
        for point in &self.data {
            if point.coordinates.dimensions() != self.dimensions {
                return Err(ProtspaceError::InvalidDocument(format!(
                    "projection '{}': '{}' has {} coordinates, expected {}",
                    self.name,
                    point.identifier,
                    point.coordinates.dimensions(),
                    self.dimensions
                )));
            }
            if !seen.insert(point.identifier.as_str()) {
                return Err(ProtspaceError::InvalidDocument(format!(
                    "projection '{}' lists '{}' more than once",
                    self.name, point.identifier
                )));
            }
        }
        Ok(())
    }
}

/// User-authored color and shape overrides per feature value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationState {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub feature_colors: BTreeMap<String, StyleMap>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub marker_shapes: BTreeMap<String, StyleMap>,
}

/// The whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub protein_data: BTreeMap<String, ProteinEntry>,
    #[serde(default)]
    pub projections: Vec<ProjectionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_state: Option<VisualizationState>,
    /// Unknown top-level keys, kept so they survive a round trip.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(ProtspaceError::from)
    }

    /// Serialize to pretty JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ProtspaceError::from)
    }

    /// Projection names in document order.
    pub fn projection_names(&self) -> Vec<&str> {
        self.projections.iter().map(|p| p.name.as_str()).collect()
    }

    /// Look up a projection by name.
    pub fn projection(&self, name: &str) -> Option<&ProjectionRecord> {
        self.projections.iter().find(|p| p.name == name)
    }

    /// Every feature name used by any protein, sorted.
    pub fn all_features(&self) -> Vec<String> {
        self.protein_data
            .values()
            .flat_map(|entry| entry.features.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Protein identifiers, sorted.
    pub fn protein_ids(&self) -> Vec<&str> {
        self.protein_data.keys().map(String::as_str).collect()
    }

    /// Features of one protein.
    pub fn protein_features(&self, identifier: &str) -> Option<&FeatureSet> {
        self.protein_data.get(identifier).map(|e| &e.features)
    }

    /// Distinct values of a feature across all proteins.
    ///
    /// Missing values and proteins without the feature are skipped. The
    /// result is deduplicated and ordered deterministically.
    pub fn unique_feature_values(&self, feature: &str) -> Vec<FeatureValue> {
        let mut by_key: BTreeMap<(u8, String), FeatureValue> = BTreeMap::new();
        for entry in self.protein_data.values() {
            if let Some(value) = entry.features.get(feature) {
                if !value.is_missing() {
                    by_key
                        .entry(value.sort_key())
                        .or_insert_with(|| value.clone());
                }
            }
        }
        by_key.into_values().collect()
    }

    /// Give every protein the same feature schema, inserting explicit
    /// missing markers for features it lacks.
    pub fn pad_feature_schema(&mut self) {
        let features = self.all_features();
        for entry in self.protein_data.values_mut() {
            for feature in &features {
                entry
                    .features
                    .entry(feature.clone())
                    .or_insert(FeatureValue::Missing);
            }
        }
    }

    /// Check the document invariants.
    ///
    /// Projection names are unique, every projection is well formed and only
    /// references known proteins, and the visualization state only references
    /// observed feature values.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for projection in &self.projections {
            if !names.insert(projection.name.as_str()) {
                return Err(ProtspaceError::InvalidDocument(format!(
                    "duplicate projection name '{}'",
                    projection.name
                )));
            }
            projection.validate()?;
            if let Some(point) = projection
                .data
                .iter()
                .find(|p| !self.protein_data.contains_key(&p.identifier))
            {
                return Err(ProtspaceError::InvalidDocument(format!(
                    "projection '{}' references unknown protein '{}'",
                    projection.name, point.identifier
                )));
            }
        }

        if let Some((feature, value)) = self.stale_style_entries().into_iter().next() {
            return Err(ProtspaceError::InvalidDocument(format!(
                "visualization state references '{}' = '{}', which no protein has",
                feature, value
            )));
        }
        Ok(())
    }
}
