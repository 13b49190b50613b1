//! Per-protein metadata handling.
//!
//! Metadata is enrichment: the geometry of a projection never depends on it.
//! A metadata file that cannot be read, or that has no `identifier` column,
//! degrades to an identifier-only table instead of failing the run.

use super::delimiter_for;
use crate::error::{ProtspaceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Name of the mandatory join column.
pub const IDENTIFIER_COLUMN: &str = "identifier";

/// Cell contents treated as missing values.
const MISSING_MARKERS: &[&str] = &[
    "", "NA", "na", "N/A", "n/a", "NaN", "nan", "-nan", "NULL", "null", "None", "#N/A",
];

/// A single feature value.
///
/// Serializes to the matching JSON scalar; `Missing` is `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Missing value.
    Missing,
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value (never NaN).
    Float(f64),
    /// Free text or category label.
    Text(String),
}

impl FeatureValue {
    /// Build a float value, mapping NaN and infinities to `Missing`.
    pub fn float(v: f64) -> Self {
        if v.is_finite() {
            Self::Float(v)
        } else {
            Self::Missing
        }
    }

    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Try to get as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as f64 (integers are widened).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Key that orders and deduplicates values of mixed types deterministically.
    pub(crate) fn sort_key(&self) -> (u8, String) {
        let rank = match self {
            Self::Missing => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) | Self::Float(_) => 2,
            Self::Text(_) => 3,
        };
        (rank, self.to_string())
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::float(v)
    }
}

/// Inferred type of a metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Integer,
    Float,
    Text,
}

/// Metadata table keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    /// Identifiers in row order.
    identifiers: Vec<String>,
    /// Feature column names (the identifier column excluded).
    columns: Vec<String>,
    /// identifier -> values aligned with `columns`.
    rows: HashMap<String, Vec<FeatureValue>>,
    /// Inferred type of each column.
    column_types: HashMap<String, ColumnType>,
    /// Rows dropped because their identifier was already seen.
    n_duplicates: usize,
    /// Numeric cells holding an infinity, stored as `Missing`.
    n_non_finite: usize,
}

impl MetadataTable {
    /// Create an empty table with no identifiers and no feature columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding only identifiers, with no feature columns.
    pub fn identifier_only(identifiers: &[String]) -> Self {
        let rows = identifiers
            .iter()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        Self {
            identifiers: identifiers.to_vec(),
            rows,
            ..Self::default()
        }
    }

    /// Load metadata from a delimited file (tab for `.tsv`, comma otherwise).
    ///
    /// Expected format:
    /// - Header row containing an `identifier` column plus feature columns
    /// - One row per protein
    ///
    /// Column types are inferred: integer if every present value parses as an
    /// integer, float if every present value parses as a number, boolean for
    /// true/false columns, text otherwise.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .flexible(true)
            .from_path(path)?;

        let header: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let id_idx = header
            .iter()
            .position(|h| h == IDENTIFIER_COLUMN)
            .ok_or_else(|| ProtspaceError::MissingColumn(IDENTIFIER_COLUMN.to_string()))?;

        let feature_idx: Vec<usize> = (0..header.len()).filter(|&i| i != id_idx).collect();
        let columns: Vec<String> = feature_idx.iter().map(|&i| header[i].clone()).collect();

        // First pass: raw cells per row, keeping the first row of each identifier
        let mut identifiers = Vec::new();
        let mut raw: HashMap<String, Vec<Option<String>>> = HashMap::new();
        let mut n_duplicates = 0;
        for record in reader.records() {
            let record = record?;
            let id = match record.get(id_idx).map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => continue,
            };
            if raw.contains_key(&id) {
                n_duplicates += 1;
                continue;
            }
            let cells = feature_idx
                .iter()
                .map(|&i| {
                    record
                        .get(i)
                        .map(str::trim)
                        .filter(|s| !is_missing_marker(s))
                        .map(String::from)
                })
                .collect();
            identifiers.push(id.clone());
            raw.insert(id, cells);
        }

        // Infer column types
        let mut column_types = HashMap::new();
        for (col_idx, name) in columns.iter().enumerate() {
            let present = raw.values().filter_map(|cells| cells[col_idx].as_deref());
            column_types.insert(name.clone(), infer_column_type(present));
        }

        let mut n_non_finite = 0;
        let rows = raw
            .into_iter()
            .map(|(id, cells)| {
                let values = cells
                    .into_iter()
                    .zip(columns.iter())
                    .map(|(cell, name)| match cell {
                        Some(s) => {
                            let value = parse_cell(&s, column_types[name]);
                            if value.is_missing() && column_types[name] == ColumnType::Float {
                                n_non_finite += 1;
                            }
                            value
                        }
                        None => FeatureValue::Missing,
                    })
                    .collect();
                (id, values)
            })
            .collect();

        debug!(
            rows = identifiers.len(),
            columns = columns.len(),
            "loaded metadata from {}",
            path.display()
        );

        Ok(Self {
            identifiers,
            columns,
            rows,
            column_types,
            n_duplicates,
            n_non_finite,
        })
    }

    /// Identifiers in row order.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Feature column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.identifiers.len()
    }

    /// Number of feature columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Rows skipped because their identifier appeared earlier in the file.
    pub fn n_duplicates(&self) -> usize {
        self.n_duplicates
    }

    /// Numeric cells that held an infinity and were stored as `Missing`.
    pub fn n_non_finite(&self) -> usize {
        self.n_non_finite
    }

    /// Inferred type of a column.
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.column_types.get(column).copied()
    }

    /// Get a value for a specific identifier and column.
    pub fn get(&self, identifier: &str, column: &str) -> Option<&FeatureValue> {
        let col_idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(identifier).and_then(|row| row.get(col_idx))
    }

    /// Check if an identifier has a row.
    pub fn has_identifier(&self, identifier: &str) -> bool {
        self.rows.contains_key(identifier)
    }

    /// All features of one identifier, with every column present.
    ///
    /// Identifiers without a row get an explicit `Missing` for each column.
    pub fn features(&self, identifier: &str) -> BTreeMap<String, FeatureValue> {
        let row = self.rows.get(identifier);
        self.columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = row
                    .and_then(|r| r.get(i))
                    .cloned()
                    .unwrap_or(FeatureValue::Missing);
                (name.clone(), value)
            })
            .collect()
    }

    /// Left-join this table onto an ordered identifier list.
    ///
    /// The result has exactly one row per identifier, in the given order.
    /// Identifiers absent from this table get `Missing` in every column;
    /// metadata rows for unknown identifiers are dropped.
    pub fn left_join(&self, identifiers: &[String]) -> Self {
        let rows = identifiers
            .iter()
            .map(|id| {
                let values = match self.rows.get(id) {
                    Some(row) => row.clone(),
                    None => vec![FeatureValue::Missing; self.columns.len()],
                };
                (id.clone(), values)
            })
            .collect();

        Self {
            identifiers: identifiers.to_vec(),
            columns: self.columns.clone(),
            rows,
            column_types: self.column_types.clone(),
            n_duplicates: 0,
            n_non_finite: 0,
        }
    }

    /// Number of identifiers in `identifiers` that have a metadata row.
    pub fn coverage(&self, identifiers: &[String]) -> usize {
        identifiers
            .iter()
            .filter(|id| self.rows.contains_key(*id))
            .count()
    }
}

/// Outcome of trying to load metadata.
///
/// Keeps "metadata absent" explicit so callers and tests can tell a real,
/// possibly empty, table from the identifier-only fallback.
#[derive(Debug, Clone)]
pub enum MetadataSource {
    /// The file was read and has an identifier column.
    Available(MetadataTable),
    /// The file could not be used.
    Unavailable { reason: String },
}

impl MetadataSource {
    /// Try to load metadata, degrading to `Unavailable` on any failure.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match MetadataTable::from_path(path) {
            Ok(table) => Self::Available(table),
            Err(e) => {
                warn!(
                    "could not load metadata from {} ({}), continuing without features",
                    path.display(),
                    e
                );
                Self::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Whether a usable table was loaded.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// The loaded table, or an empty one when unavailable.
    pub fn into_table(self) -> MetadataTable {
        match self {
            Self::Available(table) => table,
            Self::Unavailable { .. } => MetadataTable::new(),
        }
    }
}

fn is_missing_marker(s: &str) -> bool {
    MISSING_MARKERS.contains(&s)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn infer_column_type<'a>(mut values: impl Iterator<Item = &'a str> + Clone) -> ColumnType {
    if values.clone().next().is_none() {
        return ColumnType::Text;
    }
    if values.clone().all(|v| v.parse::<i64>().is_ok()) {
        ColumnType::Integer
    } else if values.clone().all(|v| v.parse::<f64>().is_ok()) {
        ColumnType::Float
    } else if values.all(|v| parse_bool(v).is_some()) {
        ColumnType::Bool
    } else {
        ColumnType::Text
    }
}

fn parse_cell(s: &str, column_type: ColumnType) -> FeatureValue {
    match column_type {
        ColumnType::Integer => s
            .parse::<i64>()
            .map(FeatureValue::Integer)
            .unwrap_or(FeatureValue::Missing),
        ColumnType::Float => s
            .parse::<f64>()
            .map(FeatureValue::float)
            .unwrap_or(FeatureValue::Missing),
        ColumnType::Bool => parse_bool(s)
            .map(FeatureValue::Bool)
            .unwrap_or(FeatureValue::Missing),
        ColumnType::Text => FeatureValue::Text(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_metadata() {
        let file = write_csv(
            "identifier,group,length,score\n\
             P1,toxin,60,0.5\n\
             P2,enzyme,72,1.25\n\
             P3,toxin,65,\n",
        );
        let meta = MetadataTable::from_path(file.path()).unwrap();

        assert_eq!(meta.n_rows(), 3);
        assert_eq!(meta.identifiers(), &["P1", "P2", "P3"]);
        assert_eq!(meta.columns(), &["group", "length", "score"]);
        assert_eq!(meta.column_type("group"), Some(ColumnType::Text));
        assert_eq!(meta.column_type("length"), Some(ColumnType::Integer));
        assert_eq!(meta.column_type("score"), Some(ColumnType::Float));

        assert_eq!(meta.get("P2", "group").unwrap().as_text(), Some("enzyme"));
        assert_eq!(meta.get("P1", "length").unwrap().as_i64(), Some(60));
        assert!(meta.get("P3", "score").unwrap().is_missing());
    }

    #[test]
    fn test_identifier_column_anywhere() {
        let file = write_csv("family,identifier\nA,x1\nB,x2\n");
        let meta = MetadataTable::from_path(file.path()).unwrap();
        assert_eq!(meta.identifiers(), &["x1", "x2"]);
        assert_eq!(meta.columns(), &["family"]);
    }

    #[test]
    fn test_tsv_delimiter() {
        let mut file = Builder::new().suffix(".tsv").tempfile().unwrap();
        writeln!(file, "identifier\tgroup").unwrap();
        writeln!(file, "P1\tA").unwrap();
        file.flush().unwrap();

        let meta = MetadataTable::from_path(file.path()).unwrap();
        assert_eq!(meta.get("P1", "group").unwrap().as_text(), Some("A"));
    }

    #[test]
    fn test_missing_markers() {
        let file = write_csv("identifier,group,value\nP1,NA,1.0\nP2,,NaN\nP3,B,2.0\n");
        let meta = MetadataTable::from_path(file.path()).unwrap();

        assert!(meta.get("P1", "group").unwrap().is_missing());
        assert!(meta.get("P2", "group").unwrap().is_missing());
        assert!(meta.get("P2", "value").unwrap().is_missing());
        assert_eq!(meta.column_type("value"), Some(ColumnType::Float));
    }

    #[test]
    fn test_duplicate_rows_first_wins() {
        let file = write_csv("identifier,group\nP1,A\nP1,B\nP2,C\n");
        let meta = MetadataTable::from_path(file.path()).unwrap();

        assert_eq!(meta.n_rows(), 2);
        assert_eq!(meta.n_duplicates(), 1);
        assert_eq!(meta.get("P1", "group").unwrap().as_text(), Some("A"));
    }

    #[test]
    fn test_infinite_values_are_counted() {
        let file = write_csv("identifier,score\nP1,0.5\nP2,inf\nP3,-inf\nP4,\n");
        let meta = MetadataTable::from_path(file.path()).unwrap();

        assert_eq!(meta.column_type("score"), Some(ColumnType::Float));
        assert!(meta.get("P2", "score").unwrap().is_missing());
        assert!(meta.get("P3", "score").unwrap().is_missing());
        // Blank cells are ordinary missing values
        assert_eq!(meta.n_non_finite(), 2);
    }

    #[test]
    fn test_missing_identifier_column_is_error() {
        let file = write_csv("name,group\nP1,A\n");
        let result = MetadataTable::from_path(file.path());
        assert!(matches!(result, Err(ProtspaceError::MissingColumn(_))));
    }

    #[test]
    fn test_source_degrades_gracefully() {
        let file = write_csv("name,group\nP1,A\n");
        let source = MetadataSource::load(file.path());
        assert!(!source.is_available());

        let source = MetadataSource::load("/definitely/not/here.csv");
        assert!(!source.is_available());

        let table = source.into_table();
        assert_eq!(table.n_rows(), 0);
        assert_eq!(table.n_columns(), 0);
    }

    #[test]
    fn test_left_join_preserves_order_and_fills_gaps() {
        let file = write_csv("identifier,group\nP2,B\nP1,A\nP9,Z\n");
        let meta = MetadataTable::from_path(file.path()).unwrap();

        let ids: Vec<String> = ["P1", "P2", "P3"].iter().map(|s| s.to_string()).collect();
        let joined = meta.left_join(&ids);

        assert_eq!(joined.identifiers(), ids.as_slice());
        assert_eq!(joined.get("P1", "group").unwrap().as_text(), Some("A"));
        assert!(joined.get("P3", "group").unwrap().is_missing());
        assert!(!joined.has_identifier("P9"));
        assert_eq!(meta.coverage(&ids), 2);
    }

    #[test]
    fn test_features_has_full_schema() {
        let file = write_csv("identifier,group,len\nP1,A,3\n");
        let meta = MetadataTable::from_path(file.path()).unwrap();

        let known = meta.features("P1");
        let unknown = meta.features("nope");
        assert_eq!(known.len(), 2);
        assert_eq!(unknown.len(), 2);
        assert!(unknown.values().all(FeatureValue::is_missing));
    }

    #[test]
    fn test_feature_value_json_shape() {
        let values = vec![
            FeatureValue::Missing,
            FeatureValue::Bool(true),
            FeatureValue::Integer(3),
            FeatureValue::Float(1.5),
            FeatureValue::Text("x".into()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[null,true,3,1.5,"x"]"#);

        let parsed: Vec<FeatureValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, values);
        assert!(FeatureValue::float(f64::NAN).is_missing());
    }
}
