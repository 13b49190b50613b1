//! Integration tests for the projection pipeline and document store.

use approx::assert_relative_eq;
use nalgebra::DMatrix;
use protspace::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use std::path::Path;
use tempfile::{tempdir, Builder, NamedTempFile};

/// Write `{"id": [..], ...}` with entries in the given order.
fn write_embeddings(entries: &[(&str, Vec<f64>)]) -> NamedTempFile {
    let mut file = Builder::new().suffix(".json").tempfile().unwrap();
    let body: Vec<String> = entries
        .iter()
        .map(|(id, v)| {
            let values: Vec<String> = v.iter().map(|x| format!("{}", x)).collect();
            format!("\"{}\": [{}]", id, values.join(", "))
        })
        .collect();
    writeln!(file, "{{{}}}", body.join(",\n")).unwrap();
    file.flush().unwrap();
    file
}

fn write_matrix(labels: &[&str], rows: &[&[f64]]) -> NamedTempFile {
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "identifier,{}", labels.join(",")).unwrap();
    for (label, row) in labels.iter().zip(rows) {
        let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(file, "{},{}", label, values.join(",")).unwrap();
    }
    file.flush().unwrap();
    file
}

/// Three well-separated clusters of 34/33/33 points in 50 dimensions.
fn three_clusters(noise: f64) -> (DMatrix<f64>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let dim = 50;
    let centers: Vec<Vec<f64>> = (0..3)
        .map(|_| (0..dim).map(|_| rng.gen_range(-10.0..10.0)).collect())
        .collect();
    let labels: Vec<usize> = (0..100)
        .map(|i| match i {
            0..=33 => 0,
            34..=66 => 1,
            _ => 2,
        })
        .collect();
    let data = DMatrix::from_fn(100, dim, |i, j| {
        centers[labels[i]][j] + rng.gen_range(-1.0..1.0) * noise
    });
    (data, labels)
}

fn mean_distances(coords: &DMatrix<f64>, labels: &[usize]) -> (f64, f64) {
    let (mut intra, mut n_intra, mut inter, mut n_inter) = (0.0, 0, 0.0, 0);
    for i in 0..coords.nrows() {
        for j in (i + 1)..coords.nrows() {
            let d = (coords.row(i) - coords.row(j)).norm();
            if labels[i] == labels[j] {
                intra += d;
                n_intra += 1;
            } else {
                inter += d;
                n_inter += 1;
            }
        }
    }
    (intra / n_intra as f64, inter / n_inter as f64)
}

fn max_pairwise_distance(coords: &DMatrix<f64>) -> f64 {
    let mut max = 0.0f64;
    for i in 0..coords.nrows() {
        for j in (i + 1)..coords.nrows() {
            max = max.max((coords.row(i) - coords.row(j)).norm());
        }
    }
    max
}

#[test]
fn test_embedding_round_trip_pca2() {
    let entries: Vec<(&str, Vec<f64>)> = ["p1", "p2", "p3", "p4"]
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let v = (0..8).map(|j| ((i + 1) * (j + 2) % 5) as f64 + i as f64 * 0.5).collect();
            (*id, v)
        })
        .collect();
    let input = write_embeddings(&entries);

    let output = Pipeline::new().method("pca2").run(input.path(), None).unwrap();
    let doc = &output.document;

    let projection = doc.projection("PCA_2").unwrap();
    assert_eq!(projection.dimensions, 2);
    assert_eq!(projection.n_points(), 4);
    let ids: Vec<&str> = projection.data.iter().map(|p| p.identifier.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2", "p3", "p4"]);
    assert!(projection.data.iter().all(|p| p.coordinates.z.is_none()));

    let ratio = projection.info["explained_variance_ratio"].as_array().unwrap();
    assert_eq!(ratio.len(), 2);
    let sum: f64 = ratio.iter().map(|v| v.as_f64().unwrap()).sum();
    assert!(sum <= 1.0 + 1e-12);
    assert!(doc.validate().is_ok());
}

#[test]
fn test_embedding_order_independence() {
    let a = ("alpha", vec![1.0, 2.0, 3.0]);
    let b = ("beta", vec![4.0, 5.0, 6.0]);
    let c = ("gamma", vec![7.0, 8.0, 9.5]);
    let forward = write_embeddings(&[a.clone(), b.clone(), c.clone()]);
    let shuffled = write_embeddings(&[c, a, b]);

    let x = EmbeddingSet::from_json(forward.path()).unwrap();
    let y = EmbeddingSet::from_json(shuffled.path()).unwrap();
    for id in ["alpha", "beta", "gamma"] {
        assert_eq!(x.vector(id), y.vector(id));
    }
    assert_eq!(x.vector("gamma").unwrap(), vec![7.0, 8.0, 9.5]);
}

#[test]
fn test_asymmetric_similarity_is_symmetrized() {
    let file = write_matrix(
        &["a", "b", "c"],
        &[&[1.0, 0.8, 0.2], &[0.9, 1.0, 0.3], &[0.2, 0.3, 1.0]],
    );
    let loaded = load(file.path(), None).unwrap();

    assert_eq!(loaded.identifiers, vec!["a", "b", "c"]);
    assert_relative_eq!(loaded.matrix[(0, 1)], 0.85, epsilon = 1e-12);
    assert_eq!(loaded.matrix[(0, 1)], loaded.matrix[(1, 0)]);
    assert_eq!(loaded.matrix[(0, 2)], 0.2);
    assert!(loaded
        .warnings
        .iter()
        .any(|w| matches!(w, LoadWarning::AsymmetricMatrix { .. })));
}

#[test]
fn test_similarity_label_mismatch() {
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    let cols: Vec<String> = (0..100).map(|i| format!("c{}", i)).collect();
    writeln!(file, "identifier,{}", cols.join(",")).unwrap();
    for i in 0..50 {
        let row = vec!["0.5"; 100].join(",");
        writeln!(file, "c{},{}", i, row).unwrap();
    }
    file.flush().unwrap();

    let err = load(file.path(), None).unwrap_err();
    assert!(err.to_string().contains("matching row and column"));

    let renamed = write_matrix(&["a", "b"], &[&[1.0, 0.5], &[0.5, 1.0]]);
    let text = std::fs::read_to_string(renamed.path())
        .unwrap()
        .replacen("identifier,a,b", "identifier,x,y", 1);
    std::fs::write(renamed.path(), text).unwrap();
    let err = load(renamed.path(), None).unwrap_err();
    assert!(err.to_string().contains("matching row and column"));
}

#[test]
fn test_unknown_method() {
    let err = MethodSpec::parse("foo2").unwrap_err();
    let msg = err.to_string().to_lowercase();
    assert!(msg.contains("unknown reduction method"));
    assert!(msg.contains("foo"));
    assert!(msg.contains("pca, umap, tsne, mds"));
}

#[test]
fn test_visualization_state_lazy_create() {
    let input = write_embeddings(&[
        ("p1", vec![0.0, 1.0, 2.0]),
        ("p2", vec![1.0, 0.0, 2.0]),
        ("p3", vec![2.0, 1.0, 0.0]),
    ]);
    let mut metadata = Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(metadata, "identifier,family").unwrap();
    writeln!(metadata, "p1,kinase\np2,kinase\np3,protease").unwrap();
    metadata.flush().unwrap();

    let doc = Pipeline::new()
        .method("pca2")
        .run(input.path(), Some(metadata.path()))
        .unwrap()
        .document;
    assert!(doc.visualization_state.is_none());

    let mut styled = doc.clone();
    styled.update_feature_color("family", "kinase", "#1f77b4");
    assert_eq!(styled.feature_colors("family")["kinase"], "#1f77b4");

    styled.visualization_state = None;
    assert_eq!(styled, doc);
}

#[test]
fn test_merge_idempotent_and_non_destructive() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("landscape.json");

    // An earlier document with an unrelated protein, projection and style
    let mut earlier = Document::from_json(
        r#"{
            "protein_data": {"legacy": {"features": {"family": "old"}}},
            "projections": [
                {"name": "Legacy", "dimensions": 2, "info": {},
                 "data": [{"identifier": "legacy", "coordinates": {"x": 1.0, "y": 2.0}}]}
            ]
        }"#,
    )
    .unwrap();
    earlier.update_marker_shape("family", "old", "diamond");
    DocumentStore::new(&out).save(&earlier).unwrap();

    let (data, _) = three_clusters(0.1);
    let entries: Vec<(String, Vec<f64>)> = (0..20)
        .map(|i| (format!("P{:03}", i * 5), data.row(i * 5).iter().copied().collect()))
        .collect();
    let borrowed: Vec<(&str, Vec<f64>)> =
        entries.iter().map(|(id, v)| (id.as_str(), v.clone())).collect();
    let input = write_embeddings(&borrowed);

    let pipeline = Pipeline::new().method("pca2").method("mds2");
    let once = pipeline.run_and_save(input.path(), None, &out).unwrap().document;
    let first_bytes = std::fs::read_to_string(&out).unwrap();
    let twice = pipeline.run_and_save(input.path(), None, &out).unwrap().document;
    let second_bytes = std::fs::read_to_string(&out).unwrap();

    assert_eq!(first_bytes, second_bytes);
    assert_eq!(once.projection_names(), twice.projection_names());
    assert_eq!(once.projection_names(), vec!["Legacy", "PCA_2", "MDS_2"]);

    assert_eq!(twice.projection("Legacy"), earlier.projection("Legacy"));
    assert_eq!(twice.marker_shapes("family")["old"], "diamond");
    assert_eq!(twice.protein_data.len(), 21);
    // Schema is padded for proteins that never had the legacy feature
    assert!(twice.protein_features("P000").unwrap()["family"].is_missing());
}

#[test]
fn test_deterministic_reduction() {
    let (data, _) = three_clusters(0.1);
    for spec in ["pca2", "umap2", "mds3"] {
        let spec = MethodSpec::parse(spec).unwrap();
        let config = spec.config(&ReductionParams::default()).unwrap();
        let a = Reducer::new(spec.method(), config.clone())
            .fit_transform(&data)
            .unwrap();
        let b = Reducer::new(spec.method(), config).fit_transform(&data).unwrap();
        assert_eq!(a, b, "{} is not deterministic", spec);
    }
}

#[test]
fn test_cluster_preservation() {
    let (data, labels) = three_clusters(0.1);

    let config = DimensionReductionConfig::with_defaults(2).unwrap();
    let pca = Pca::new(config.clone()).fit_transform(&data).unwrap();
    let (intra, inter) = mean_distances(&pca, &labels);
    assert!(intra < inter, "PCA: intra {} >= inter {}", intra, inter);

    let mds = Mds::new(config).fit_transform(&data).unwrap();
    let (intra, inter) = mean_distances(&mds, &labels);
    assert!(intra < inter, "MDS: intra {} >= inter {}", intra, inter);
}

#[test]
fn test_near_degenerate_input_is_stable() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let data = DMatrix::from_fn(30, 50, |_, j| j as f64 * 0.01 + rng.gen_range(-1.0..1.0) * 0.001);

    let config = DimensionReductionConfig::with_defaults(2).unwrap();
    let pca = Pca::new(config.clone()).fit_transform(&data).unwrap();
    assert!(pca.iter().all(|v| v.is_finite()));
    assert!(max_pairwise_distance(&pca) < 1.0);

    let mds = Mds::new(config).fit_transform(&data).unwrap();
    assert!(mds.iter().all(|v| v.is_finite()));
    assert!(max_pairwise_distance(&mds) < 1.0);
}

#[test]
fn test_precomputed_similarity_with_mds() {
    let file = write_matrix(
        &["a", "b", "c", "d"],
        &[
            &[1.0, 0.9, 0.1, 0.1],
            &[0.9, 1.0, 0.1, 0.1],
            &[0.1, 0.1, 1.0, 0.9],
            &[0.1, 0.1, 0.9, 1.0],
        ],
    );
    let params = ReductionParams {
        dissimilarity: Dissimilarity::Precomputed,
        precomputed_kind: PrecomputedKind::Similarity,
        ..ReductionParams::default()
    };
    let doc = Pipeline::new()
        .method("mds2")
        .params(params)
        .run(file.path(), None)
        .unwrap()
        .document;

    let proj = doc.projection("MDS_2").unwrap();
    let dist = |x: &str, y: &str| {
        let (p, q) = (proj.coordinates(x).unwrap(), proj.coordinates(y).unwrap());
        ((p.x - q.x).powi(2) + (p.y - q.y).powi(2)).sqrt()
    };
    assert!(dist("a", "b") < dist("a", "c"));
    assert!(dist("c", "d") < dist("b", "d"));
    assert_eq!(proj.info["precomputed_kind"], "similarity");
}

#[test]
fn test_style_and_inspect_saved_document() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("doc.json");
    let input = write_embeddings(&[
        ("p1", vec![0.0, 1.0, 2.0]),
        ("p2", vec![1.0, 0.0, 2.0]),
        ("p3", vec![2.0, 1.0, 0.0]),
    ]);
    let mut metadata = Builder::new().suffix(".tsv").tempfile().unwrap();
    writeln!(metadata, "identifier\tfamily\tlength").unwrap();
    writeln!(metadata, "p1\tkinase\t120\np2\tprotease\t\np3\tkinase\t98").unwrap();
    metadata.flush().unwrap();

    Pipeline::new()
        .method("pca3")
        .run_and_save(input.path(), Some(metadata.path()), &out)
        .unwrap();

    let store = DocumentStore::new(&out);
    let mut doc = store.load_existing().unwrap();
    let styles = FeatureStyles::from_json(
        r##"{"family": {"colors": {"kinase": "#ff0000"}, "shapes": {"protease": "cross"}}}"##,
    )
    .unwrap();
    apply_feature_styles(&mut doc, &styles).unwrap();
    store.save(&doc).unwrap();

    let reloaded = store.load_existing().unwrap();
    assert_eq!(reloaded.feature_colors("family")["kinase"], "#ff0000");
    assert_eq!(reloaded.projection("PCA_3").unwrap().data[0].coordinates.dimensions(), 3);

    let summary = reloaded.summary();
    assert_eq!(summary.n_proteins, 3);
    assert_eq!(summary.n_color_entries, 1);
    assert_eq!(summary.n_shape_entries, 1);
    let length = summary.features.iter().find(|f| f.name == "length").unwrap();
    assert_eq!(length.n_missing, 1);
}

#[test]
fn test_pairwise_table_feeds_pipeline() {
    let dir = tempdir().unwrap();
    let table_path = dir.path().join("hits.tsv");
    std::fs::write(
        &table_path,
        "query\ttarget\tevalue\n\
         a\tb\t1e-50\nb\ta\t1e-50\n\
         a\tc\t1e-2\nc\ta\t1e-2\n\
         b\tc\t1e-3\nc\tb\t1e-3\n\
         c\td\t1e-40\nd\tc\t1e-40\n",
    )
    .unwrap();

    let table = PairwiseTable::from_path(&table_path, "evalue").unwrap();
    let (matrix, warnings) = table.to_similarity(ScoreTransform::EValue).unwrap();
    assert!(warnings.is_empty());
    let matrix_path = dir.path().join("similarity.csv");
    matrix.to_csv(&matrix_path).unwrap();

    let loaded = load(Path::new(&matrix_path), None).unwrap();
    assert_eq!(loaded.identifiers, vec!["a", "b", "c", "d"]);
    assert_eq!(loaded.matrix[(0, 0)], 1.0);
    assert_eq!(loaded.matrix[(0, 1)], 1.0);
    assert_eq!(loaded.matrix[(0, 3)], 0.0);

    let params = ReductionParams {
        dissimilarity: Dissimilarity::Precomputed,
        precomputed_kind: PrecomputedKind::Detect,
        ..ReductionParams::default()
    };
    let doc = Pipeline::new()
        .method("mds2")
        .params(params)
        .run(&matrix_path, None)
        .unwrap()
        .document;
    assert_eq!(doc.projection("MDS_2").unwrap().n_points(), 4);
}

fn cluster_entries(data: &DMatrix<f64>) -> Vec<(String, Vec<f64>)> {
    (0..data.nrows())
        .map(|i| (format!("P{:03}", i), data.row(i).iter().copied().collect()))
        .collect()
}

#[test]
fn test_umap_and_tsne_through_pipeline() {
    let (data, labels) = three_clusters(0.1);
    let entries = cluster_entries(&data);
    let borrowed: Vec<(&str, Vec<f64>)> =
        entries.iter().map(|(id, v)| (id.as_str(), v.clone())).collect();
    let input = write_embeddings(&borrowed);

    let doc = Pipeline::new()
        .method("umap2")
        .method("tsne3")
        .run(input.path(), None)
        .unwrap()
        .document;
    assert_eq!(doc.projection_names(), vec!["UMAP_2", "TSNE_3"]);

    let umap = doc.projection("UMAP_2").unwrap();
    assert_eq!(umap.dimensions, 2);
    assert_eq!(umap.n_points(), 100);
    assert!(umap.data.iter().all(|p| p.coordinates.z.is_none()));
    for key in ["n_components", "n_neighbors", "min_dist", "metric"] {
        assert!(umap.info.contains_key(key), "UMAP info lacks {}", key);
    }

    let tsne = doc.projection("TSNE_3").unwrap();
    assert_eq!(tsne.dimensions, 3);
    assert_eq!(tsne.n_points(), 100);
    for key in ["n_components", "perplexity", "learning_rate", "metric"] {
        assert!(tsne.info.contains_key(key), "t-SNE info lacks {}", key);
    }

    for projection in [umap, tsne] {
        for point in &projection.data {
            let c = &point.coordinates;
            assert!(c.x.is_finite() && c.y.is_finite());
            if projection.dimensions == 3 {
                assert!(c.z.is_some_and(f64::is_finite));
            }
        }
        // Identifiers sort in row order, so labels line up with the projection
        let coords = DMatrix::from_fn(projection.n_points(), projection.dimensions, |i, d| {
            let c = &projection.data[i].coordinates;
            [c.x, c.y, c.z.unwrap_or(0.0)][d]
        });
        let (intra, inter) = mean_distances(&coords, &labels);
        assert!(intra < inter, "{}: intra {} >= inter {}", projection.name, intra, inter);
    }
    assert!(doc.validate().is_ok());
}

#[test]
fn test_umap_on_fewer_proteins_than_neighbors() {
    let entries: Vec<(String, Vec<f64>)> = (0..10)
        .map(|i| {
            let v = (0..5).map(|j| ((i * 7 + j * 3) % 11) as f64).collect();
            (format!("q{}", i), v)
        })
        .collect();
    let borrowed: Vec<(&str, Vec<f64>)> =
        entries.iter().map(|(id, v)| (id.as_str(), v.clone())).collect();
    let input = write_embeddings(&borrowed);

    let doc = Pipeline::new()
        .method("umap2")
        .run(input.path(), None)
        .unwrap()
        .document;
    let projection = doc.projection("UMAP_2").unwrap();
    assert_eq!(projection.n_points(), 10);
    assert_eq!(projection.info["n_neighbors"], 9);
}

#[test]
fn test_missing_value_style_survives_rerun() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("doc.json");
    let input = write_embeddings(&[
        ("p1", vec![0.0, 1.0, 2.0]),
        ("p2", vec![1.0, 0.0, 2.0]),
        ("p3", vec![2.0, 1.0, 0.0]),
    ]);
    let mut metadata = Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(metadata, "identifier,length\np1,120\np2,\np3,98").unwrap();
    metadata.flush().unwrap();

    let pipeline = Pipeline::new().method("pca2");
    pipeline
        .run_and_save(input.path(), Some(metadata.path()), &out)
        .unwrap();

    let store = DocumentStore::new(&out);
    let mut doc = store.load_existing().unwrap();
    let styles = FeatureStyles::from_json(r##"{"length": {"colors": {"null": "#000000"}}}"##).unwrap();
    assert_eq!(apply_feature_styles(&mut doc, &styles).unwrap(), 1);
    store.save(&doc).unwrap();

    let rerun = pipeline
        .run_and_save(input.path(), Some(metadata.path()), &out)
        .unwrap()
        .document;
    assert_eq!(rerun.feature_colors("length")["null"], "#000000");
    assert_eq!(store.load_existing().unwrap().feature_colors("length")["null"], "#000000");
}
