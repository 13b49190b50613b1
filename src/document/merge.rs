//! Merge a freshly built document into an existing one.

use super::model::{Document, VisualizationState};
use std::collections::HashMap;
use tracing::debug;

/// Merge `new` into `existing`.
///
/// - Proteins are unioned by identifier; new entries replace old ones.
/// - Projections are merged by name. A replaced projection keeps its
///   position; new names are appended in `new`'s order.
/// - The new visualization state overlays the old one per feature value.
/// - Unknown top-level keys are unioned, new values winning.
///
/// Merging the same `new` twice gives the same result as merging it once.
pub fn merge_documents(existing: Option<Document>, new: Document) -> Document {
    let Some(mut merged) = existing else {
        return new;
    };

    let n_old_proteins = merged.protein_data.len();
    merged.protein_data.extend(new.protein_data);

    let mut positions: HashMap<String, usize> = merged
        .projections
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.clone(), i))
        .collect();
    for projection in new.projections {
        match positions.get(&projection.name) {
            Some(&i) => {
                debug!(name = %projection.name, "Replacing projection");
                merged.projections[i] = projection;
            }
            None => {
                positions.insert(projection.name.clone(), merged.projections.len());
                merged.projections.push(projection);
            }
        }
    }

    merged.visualization_state = match (merged.visualization_state, new.visualization_state) {
        (Some(old), Some(overlay)) => Some(overlay_state(old, overlay)),
        (old, overlay) => overlay.or(old),
    };

    merged.extra.extend(new.extra);

    debug!(
        proteins_before = n_old_proteins,
        proteins_after = merged.protein_data.len(),
        projections = merged.projections.len(),
        "Merged documents"
    );
    merged
}

fn overlay_state(mut base: VisualizationState, overlay: VisualizationState) -> VisualizationState {
    for (feature, values) in overlay.feature_colors {
        base.feature_colors.entry(feature).or_default().extend(values);
    }
    for (feature, values) in overlay.marker_shapes {
        base.marker_shapes.entry(feature).or_default().extend(values);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing() -> Document {
        let mut doc = Document::from_json(
            r#"{
                "protein_data": {
                    "old": {"features": {"group": "a"}},
                    "shared": {"features": {"group": "a"}}
                },
                "projections": [
                    {"name": "PCA_2", "dimensions": 2, "info": {"v": 1},
                     "data": [{"identifier": "old", "coordinates": {"x": 0.0, "y": 0.0}}]},
                    {"name": "MDS_2", "dimensions": 2, "info": {},
                     "data": [{"identifier": "shared", "coordinates": {"x": 1.0, "y": 1.0}}]}
                ],
                "settings": {"keep": true}
            }"#,
        )
        .unwrap();
        doc.update_feature_color("group", "a", "red");
        doc
    }

    fn incoming() -> Document {
        let mut doc = Document::from_json(
            r#"{
                "protein_data": {
                    "shared": {"features": {"group": "b"}},
                    "new": {"features": {"group": "b"}}
                },
                "projections": [
                    {"name": "UMAP_2", "dimensions": 2, "info": {},
                     "data": [{"identifier": "new", "coordinates": {"x": 5.0, "y": 5.0}}]},
                    {"name": "PCA_2", "dimensions": 2, "info": {"v": 2},
                     "data": [{"identifier": "shared", "coordinates": {"x": 9.0, "y": 9.0}}]}
                ]
            }"#,
        )
        .unwrap();
        doc.update_marker_shape("group", "b", "x");
        doc
    }

    #[test]
    fn test_no_existing_document() {
        assert_eq!(merge_documents(None, incoming()), incoming());
    }

    #[test]
    fn test_merge_keeps_positions_and_appends() {
        let merged = merge_documents(Some(existing()), incoming());
        assert_eq!(merged.projection_names(), vec!["PCA_2", "MDS_2", "UMAP_2"]);

        let pca = merged.projection("PCA_2").unwrap();
        assert_eq!(pca.info["v"], 2);
        assert_eq!(pca.data[0].identifier, "shared");
    }

    #[test]
    fn test_merge_is_non_destructive() {
        let old = existing();
        let merged = merge_documents(Some(old.clone()), incoming());

        assert_eq!(merged.protein_data["old"], old.protein_data["old"]);
        assert_eq!(merged.projection("MDS_2"), old.projection("MDS_2"));
        assert_eq!(
            merged.protein_features("shared").unwrap()["group"].to_string(),
            "b"
        );
        assert_eq!(merged.feature_colors("group")["a"], "red");
        assert_eq!(merged.marker_shapes("group")["b"], "x");
        assert_eq!(merged.extra["settings"]["keep"], true);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = merge_documents(Some(existing()), incoming());
        let twice = merge_documents(Some(once.clone()), incoming());
        assert_eq!(once, twice);
    }
}
