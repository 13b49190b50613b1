//! Per-feature color and marker-shape overrides.

use super::model::{Document, StyleMap, VisualizationState};
use crate::data::FeatureValue;
use crate::error::{ProtspaceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

/// Marker shapes the viewer can draw.
pub const ALLOWED_SHAPES: [&str; 8] = [
    "circle",
    "circle-open",
    "cross",
    "diamond",
    "diamond-open",
    "square",
    "square-open",
    "x",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StyleKind {
    Color,
    Shape,
}

impl VisualizationState {
    fn section(&self, kind: StyleKind) -> &BTreeMap<String, StyleMap> {
        match kind {
            StyleKind::Color => &self.feature_colors,
            StyleKind::Shape => &self.marker_shapes,
        }
    }

    fn section_mut(&mut self, kind: StyleKind) -> &mut BTreeMap<String, StyleMap> {
        match kind {
            StyleKind::Color => &mut self.feature_colors,
            StyleKind::Shape => &mut self.marker_shapes,
        }
    }
}

impl Document {
    /// Color overrides for a feature; empty if none are set.
    pub fn feature_colors(&self, feature: &str) -> StyleMap {
        self.style_map(StyleKind::Color, feature)
    }

    /// Marker shape overrides for a feature; empty if none are set.
    pub fn marker_shapes(&self, feature: &str) -> StyleMap {
        self.style_map(StyleKind::Shape, feature)
    }

    /// Set the color of one feature value, creating any missing sections.
    pub fn update_feature_color(&mut self, feature: &str, value: &str, color: &str) {
        self.style_map_mut(StyleKind::Color, feature)
            .insert(value.to_string(), color.to_string());
    }

    /// Set the marker shape of one feature value, creating any missing sections.
    pub fn update_marker_shape(&mut self, feature: &str, value: &str, shape: &str) {
        self.style_map_mut(StyleKind::Shape, feature)
            .insert(value.to_string(), shape.to_string());
    }

    fn style_map(&self, kind: StyleKind, feature: &str) -> StyleMap {
        self.visualization_state
            .as_ref()
            .and_then(|state| state.section(kind).get(feature))
            .cloned()
            .unwrap_or_default()
    }

    fn style_map_mut(&mut self, kind: StyleKind, feature: &str) -> &mut StyleMap {
        self.visualization_state
            .get_or_insert_with(VisualizationState::default)
            .section_mut(kind)
            .entry(feature.to_string())
            .or_default()
    }

    /// Display strings of the observed values of a feature.
    ///
    /// An explicit missing value counts as `"null"`, so it can be styled too.
    fn observed_values(&self, feature: &str) -> BTreeSet<String> {
        let mut observed: BTreeSet<String> = self
            .unique_feature_values(feature)
            .iter()
            .map(|v| v.to_string())
            .collect();
        let carries_missing = self
            .protein_data
            .values()
            .any(|entry| entry.features.get(feature).is_some_and(FeatureValue::is_missing));
        if carries_missing {
            observed.insert(FeatureValue::Missing.to_string());
        }
        observed
    }

    /// Style entries whose feature or value no protein carries.
    pub fn stale_style_entries(&self) -> Vec<(String, String)> {
        let Some(state) = &self.visualization_state else {
            return Vec::new();
        };
        let mut stale = Vec::new();
        for kind in [StyleKind::Color, StyleKind::Shape] {
            for (feature, values) in state.section(kind) {
                let observed = self.observed_values(feature);
                stale.extend(
                    values
                        .keys()
                        .filter(|v| !observed.contains(*v))
                        .map(|v| (feature.clone(), v.clone())),
                );
            }
        }
        stale
    }

    /// Drop style entries that no longer match any protein.
    ///
    /// Returns the removed `(feature, value)` pairs.
    pub fn prune_visualization_state(&mut self) -> Vec<(String, String)> {
        let stale = self.stale_style_entries();
        if stale.is_empty() {
            return stale;
        }
        if let Some(state) = self.visualization_state.as_mut() {
            for kind in [StyleKind::Color, StyleKind::Shape] {
                let section = state.section_mut(kind);
                for (feature, value) in &stale {
                    if let Some(values) = section.get_mut(feature) {
                        values.remove(value);
                    }
                }
                section.retain(|_, values| !values.is_empty());
            }
        }
        for (feature, value) in &stale {
            warn!(feature = %feature, value = %value, "Dropping style for unobserved value");
        }
        stale
    }
}

/// Requested styles for one feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStyle {
    #[serde(default)]
    pub colors: StyleMap,
    #[serde(default)]
    pub shapes: StyleMap,
}

/// Requested styles keyed by feature name.
///
/// ```json
/// {"group": {"colors": {"toxin": "#ff0000"}, "shapes": {"toxin": "diamond"}}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureStyles(pub BTreeMap<String, FeatureStyle>);

impl FeatureStyles {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(ProtspaceError::from)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Treat the argument as a file path if it names an existing file,
    /// otherwise as inline JSON.
    pub fn from_json_or_path(arg: &str) -> Result<Self> {
        let path = Path::new(arg);
        if path.is_file() {
            Self::from_path(path)
        } else {
            Self::from_json(arg)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Validate every requested style against the document, then apply them.
///
/// Nothing is changed unless all entries are valid. Returns the number of
/// entries written.
pub fn apply_feature_styles(document: &mut Document, styles: &FeatureStyles) -> Result<usize> {
    let features: BTreeSet<String> = document.all_features().into_iter().collect();

    for (feature, style) in &styles.0 {
        if !features.contains(feature) {
            return Err(ProtspaceError::InvalidStyle(format!(
                "feature '{}' not found (available: {})",
                feature,
                features.iter().cloned().collect::<Vec<_>>().join(", ")
            )));
        }
        let observed = document.observed_values(feature);
        for value in style.colors.keys().chain(style.shapes.keys()) {
            if !observed.contains(value) {
                return Err(ProtspaceError::InvalidStyle(format!(
                    "value '{}' does not occur in feature '{}'",
                    value, feature
                )));
            }
        }
        if let Some((value, shape)) = style
            .shapes
            .iter()
            .find(|(_, shape)| !ALLOWED_SHAPES.contains(&shape.as_str()))
        {
            return Err(ProtspaceError::InvalidStyle(format!(
                "shape '{}' for '{}' = '{}' is not one of: {}",
                shape,
                feature,
                value,
                ALLOWED_SHAPES.join(", ")
            )));
        }
    }

    let mut written = 0;
    for (feature, style) in &styles.0 {
        for (value, color) in &style.colors {
            document.update_feature_color(feature, value, color);
            written += 1;
        }
        for (value, shape) in &style.shapes {
            document.update_marker_shape(feature, value, shape);
            written += 1;
        }
    }
    info!(entries = written, "Applied feature styles");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn doc() -> Document {
        Document::from_json(
            r#"{
                "protein_data": {
                    "P1": {"features": {"group": "toxin", "length": 60}},
                    "P2": {"features": {"group": "enzyme", "length": null}}
                },
                "projections": []
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_missing_section_reads_empty() {
        let d = doc();
        assert!(d.feature_colors("group").is_empty());
        assert!(d.marker_shapes("nope").is_empty());
    }

    #[test]
    fn test_update_creates_sections_lazily() {
        let mut d = doc();
        let before = d.clone();
        d.update_feature_color("group", "toxin", "#ff0000");

        assert_eq!(d.feature_colors("group")["toxin"], "#ff0000");
        let state = d.visualization_state.as_ref().unwrap();
        assert!(state.marker_shapes.is_empty());

        // Only the new section differs
        let mut stripped = d.clone();
        stripped.visualization_state = None;
        assert_eq!(stripped, before);

        let json: serde_json::Value = serde_json::from_str(&d.to_json().unwrap()).unwrap();
        assert_eq!(
            json["visualization_state"],
            serde_json::json!({"feature_colors": {"group": {"toxin": "#ff0000"}}})
        );
    }

    #[test]
    fn test_update_overwrites_value() {
        let mut d = doc();
        d.update_marker_shape("group", "toxin", "circle");
        d.update_marker_shape("group", "toxin", "diamond");
        d.update_marker_shape("group", "enzyme", "x");
        let shapes = d.marker_shapes("group");
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes["toxin"], "diamond");
    }

    #[test]
    fn test_apply_styles() {
        let mut d = doc();
        let styles = FeatureStyles::from_json(
            r##"{"group": {"colors": {"toxin": "#f00"}, "shapes": {"enzyme": "square-open"}},
                "length": {"colors": {"60": "blue"}}}"##,
        )
        .unwrap();
        assert_eq!(apply_feature_styles(&mut d, &styles).unwrap(), 3);
        assert_eq!(d.feature_colors("length")["60"], "blue");
        assert_eq!(d.marker_shapes("group")["enzyme"], "square-open");
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_apply_rejects_without_mutating() {
        let mut d = doc();
        let before = d.clone();

        let bad_feature = FeatureStyles::from_json(r#"{"color": {"colors": {"x": "red"}}}"#).unwrap();
        let err = apply_feature_styles(&mut d, &bad_feature).unwrap_err();
        assert!(err.to_string().contains("'color' not found"));

        let bad_value = FeatureStyles::from_json(
            r#"{"group": {"colors": {"toxin": "red", "lectin": "blue"}}}"#,
        )
        .unwrap();
        assert!(apply_feature_styles(&mut d, &bad_value).is_err());

        let bad_shape =
            FeatureStyles::from_json(r#"{"group": {"shapes": {"toxin": "hexagon"}}}"#).unwrap();
        let err = apply_feature_styles(&mut d, &bad_shape).unwrap_err();
        assert!(err.to_string().contains("hexagon"));

        assert_eq!(d, before);
    }

    #[test]
    fn test_styles_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"group": {{"colors": {{"toxin": "red"}}}}}}"#).unwrap();
        let styles = FeatureStyles::from_json_or_path(file.path().to_str().unwrap()).unwrap();
        assert_eq!(styles.0["group"].colors["toxin"], "red");
        assert!(styles.0["group"].shapes.is_empty());

        let inline = FeatureStyles::from_json_or_path(r#"{"group": {}}"#).unwrap();
        assert!(!inline.is_empty());
    }

    #[test]
    fn test_prune_stale_entries() {
        let mut d = doc();
        d.update_feature_color("group", "toxin", "red");
        d.update_feature_color("group", "lectin", "blue");
        d.update_marker_shape("gone", "a", "x");
        assert!(d.validate().is_err());

        let removed = d.prune_visualization_state();
        assert_eq!(removed.len(), 2);
        assert_eq!(d.feature_colors("group").len(), 1);
        assert!(d.visualization_state.as_ref().unwrap().marker_shapes.is_empty());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_missing_value_is_stylable() {
        let mut d = doc();
        let styles =
            FeatureStyles::from_json(r##"{"length": {"colors": {"null": "#000000"}}}"##).unwrap();
        assert_eq!(apply_feature_styles(&mut d, &styles).unwrap(), 1);
        assert_eq!(d.feature_colors("length")["null"], "#000000");
        assert!(d.stale_style_entries().is_empty());
        assert!(d.prune_visualization_state().is_empty());
        assert!(d.validate().is_ok());

        // "null" is only observed where some protein carries a missing value
        let no_missing =
            FeatureStyles::from_json(r#"{"group": {"colors": {"null": "red"}}}"#).unwrap();
        assert!(apply_feature_styles(&mut d, &no_missing).is_err());
    }
}
