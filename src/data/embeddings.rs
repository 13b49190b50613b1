//! Embedding collections: one numeric vector per identifier.

use super::delimiter_for;
use crate::error::{ProtspaceError, Result};
use nalgebra::DMatrix;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Embeddings stacked into a dense matrix (proteins × dimensions).
#[derive(Debug, Clone)]
pub struct EmbeddingSet {
    /// Row-aligned identifiers.
    identifiers: Vec<String>,
    /// One row per identifier.
    data: DMatrix<f64>,
}

impl EmbeddingSet {
    /// Stack per-identifier vectors into a matrix.
    ///
    /// Every vector must have the length of the first one; a ragged
    /// collection fails with `ShapeMismatch` naming the offending identifier.
    pub fn from_records(records: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let n = records.len();
        let first = records
            .first()
            .ok_or_else(|| ProtspaceError::EmptyData("No embeddings in input".to_string()))?;
        let dim = first.1.len();
        if dim == 0 {
            return Err(ProtspaceError::EmptyData(format!(
                "Embedding for '{}' is empty",
                first.0
            )));
        }

        for (identifier, vector) in &records {
            if vector.len() != dim {
                return Err(ProtspaceError::ShapeMismatch {
                    identifier: identifier.clone(),
                    expected: dim,
                    actual: vector.len(),
                    n_records: n,
                });
            }
        }

        let mut data = DMatrix::zeros(n, dim);
        let mut identifiers = Vec::with_capacity(n);
        for (row, (identifier, vector)) in records.into_iter().enumerate() {
            for (col, v) in vector.into_iter().enumerate() {
                data[(row, col)] = v;
            }
            identifiers.push(identifier);
        }

        Ok(Self { identifiers, data })
    }

    /// Load a keyed JSON container: `{ "<identifier>": [numbers, ...], ... }`.
    ///
    /// Each entry may be an arbitrarily nested numeric array; it is flattened
    /// row-major to one vector. Identifiers come out in lexicographic key
    /// order, so the result does not depend on how the file lists entries.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let container: BTreeMap<String, Value> = serde_json::from_reader(reader)?;

        let mut records = Vec::with_capacity(container.len());
        for (identifier, value) in container {
            let mut vector = Vec::new();
            flatten_numeric(&value, &identifier, &mut vector)?;
            records.push((identifier, vector));
        }

        let set = Self::from_records(records)?;
        debug!(
            n = set.n_samples(),
            dim = set.dim(),
            "loaded embeddings from {}",
            path.display()
        );
        Ok(set)
    }

    /// Load a delimited table: header row, then `identifier, v1, ..., vD`.
    ///
    /// Rows keep their file order.
    pub fn from_table<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .flexible(true)
            .from_path(path)?;

        let mut records = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            let mut fields = record.iter();
            let identifier = match fields.next().map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => continue,
            };
            let vector = fields
                .enumerate()
                .map(|(col_idx, s)| {
                    s.trim().parse::<f64>().map_err(|_| {
                        ProtspaceError::Numerical(format!(
                            "Invalid embedding value '{}' at row {}, column {}",
                            s,
                            row_idx + 1,
                            col_idx + 1
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            records.push((identifier, vector));
        }

        Self::from_records(records)
    }

    /// Identifiers in row order.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Number of embeddings.
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Embedding dimensionality.
    pub fn dim(&self) -> usize {
        self.data.ncols()
    }

    /// The embedding vector of one identifier.
    pub fn vector(&self, identifier: &str) -> Option<Vec<f64>> {
        let row = self.identifiers.iter().position(|id| id == identifier)?;
        Some(self.data.row(row).iter().copied().collect())
    }

    /// Get reference to the underlying matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Split into identifiers and matrix.
    pub fn into_parts(self) -> (Vec<String>, DMatrix<f64>) {
        (self.identifiers, self.data)
    }
}

fn flatten_numeric(value: &Value, identifier: &str, out: &mut Vec<f64>) -> Result<()> {
    match value {
        Value::Number(n) => {
            let v = n.as_f64().ok_or_else(|| {
                ProtspaceError::Numerical(format!("Unrepresentable number in '{}'", identifier))
            })?;
            out.push(v);
            Ok(())
        }
        Value::Array(items) => items
            .iter()
            .try_for_each(|item| flatten_numeric(item, identifier, out)),
        other => Err(ProtspaceError::Numerical(format!(
            "Embedding '{}' contains a non-numeric value: {}",
            identifier, other
        ))),
    }
}
