//! Square, labelled similarity or distance matrices.

use super::{delimiter_for, LoadWarning};
use crate::error::{ProtspaceError, Result};
use nalgebra::DMatrix;
use std::path::Path;
use tracing::warn;

/// Relative tolerance of the symmetry check.
pub const SYMMETRY_RTOL: f64 = 1e-5;
/// Absolute tolerance of the symmetry check.
pub const SYMMETRY_ATOL: f64 = 1e-8;

/// A square matrix of pairwise values with identical row and column labels.
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    /// Row (= column) identifiers.
    identifiers: Vec<String>,
    /// n × n values.
    data: DMatrix<f64>,
}

impl SimilarityMatrix {
    /// Create from a matrix and identifiers.
    pub fn new(data: DMatrix<f64>, identifiers: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != ncols {
            return Err(ProtspaceError::LabelMismatch {
                n_rows: nrows,
                n_cols: ncols,
            });
        }
        if nrows != identifiers.len() {
            return Err(ProtspaceError::DimensionMismatch {
                expected: nrows,
                actual: identifiers.len(),
            });
        }
        Ok(Self { identifiers, data })
    }

    /// Load a labelled matrix from a delimited file.
    ///
    /// Expected format:
    /// - Header row: an index header cell, then one column per identifier
    /// - Subsequent rows: identifier followed by numeric values
    ///
    /// Row labels must equal column labels, in the same order.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .flexible(true)
            .from_path(path)?;

        let header = reader.headers()?.clone();
        let col_labels: Vec<String> = header.iter().skip(1).map(|s| s.trim().to_string()).collect();
        if col_labels.is_empty() {
            return Err(ProtspaceError::EmptyData(
                "Similarity matrix has no columns".to_string(),
            ));
        }

        let mut row_labels = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            let mut fields = record.iter();
            let label = match fields.next() {
                Some(label) => label.trim().to_string(),
                None => continue,
            };
            let row: Vec<f64> = fields
                .enumerate()
                .map(|(col_idx, s)| {
                    s.trim().parse::<f64>().map_err(|_| {
                        ProtspaceError::Numerical(format!(
                            "Invalid matrix value '{}' at row {}, column {}",
                            s,
                            row_idx + 1,
                            col_idx + 1
                        ))
                    })
                })
                .collect::<Result<_>>()?;
            if row.len() != col_labels.len() {
                return Err(ProtspaceError::DimensionMismatch {
                    expected: col_labels.len(),
                    actual: row.len(),
                });
            }
            row_labels.push(label);
            values.extend(row);
        }

        if row_labels != col_labels {
            return Err(ProtspaceError::LabelMismatch {
                n_rows: row_labels.len(),
                n_cols: col_labels.len(),
            });
        }

        let n = row_labels.len();
        let data = DMatrix::from_row_slice(n, n, &values);
        Self::new(data, row_labels)
    }

    /// Write the matrix as a labelled table.
    ///
    /// Identifiers containing the delimiter or quotes are quoted.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter_for(path))
            .from_path(path)?;

        writer.write_record(
            std::iter::once("identifier").chain(self.identifiers.iter().map(String::as_str)),
        )?;
        for (row, id) in self.identifiers.iter().enumerate() {
            let mut record = Vec::with_capacity(self.n() + 1);
            record.push(id.clone());
            record.extend((0..self.n()).map(|col| self.data[(row, col)].to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Largest absolute difference between M and Mᵗ.
    pub fn max_asymmetry(&self) -> f64 {
        let n = self.n();
        let mut max_dev = 0.0f64;
        for i in 0..n {
            for j in (i + 1)..n {
                max_dev = max_dev.max((self.data[(i, j)] - self.data[(j, i)]).abs());
            }
        }
        max_dev
    }

    /// Element-wise symmetry check, `|a - b| <= atol + rtol * |b|`.
    pub fn is_symmetric(&self, rtol: f64, atol: f64) -> bool {
        let n = self.n();
        (0..n).all(|i| {
            (0..n).all(|j| {
                let a = self.data[(i, j)];
                let b = self.data[(j, i)];
                (a - b).abs() <= atol + rtol * b.abs()
            })
        })
    }

    /// Replace the matrix by (M + Mᵗ)/2 when it is not symmetric.
    ///
    /// Returns the warning describing the correction, if one was applied.
    pub fn symmetrize(&mut self) -> Option<LoadWarning> {
        if self.is_symmetric(SYMMETRY_RTOL, SYMMETRY_ATOL) {
            return None;
        }
        let max_deviation = self.max_asymmetry();
        warn!(
            max_deviation,
            "similarity matrix is not symmetric, using (M + Mᵗ)/2"
        );
        let transposed = self.data.transpose();
        self.data = (&self.data + transposed) / 2.0;
        Some(LoadWarning::AsymmetricMatrix { max_deviation })
    }

    /// Get the value at (row, col).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[(row, col)]
    }

    /// Number of identifiers.
    #[inline]
    pub fn n(&self) -> usize {
        self.data.nrows()
    }

    /// Identifiers in row order.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
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
