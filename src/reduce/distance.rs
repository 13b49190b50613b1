//! Distance helpers shared by the reducers.

use super::Metric;
use crate::error::{ProtspaceError, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;

/// Distance between two vectors under `metric`.
#[inline]
pub fn distance(a: &[f64], b: &[f64], metric: Metric) -> f64 {
    match metric {
        Metric::Euclidean => squared_euclidean(a, b).sqrt(),
        Metric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
        Metric::Cosine => {
            let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
            let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
            if na == 0.0 || nb == 0.0 {
                1.0
            } else {
                (1.0 - dot / (na * nb)).max(0.0)
            }
        }
    }
}

/// Squared Euclidean distance (no sqrt).
#[inline]
pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Rows of a matrix as owned vectors.
pub fn rows(data: &DMatrix<f64>) -> Vec<Vec<f64>> {
    data.row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

/// Full n × n distance matrix between the rows of `data`, computed in parallel.
pub fn pairwise_distances(data: &DMatrix<f64>, metric: Metric) -> DMatrix<f64> {
    let points = rows(data);
    let n = points.len();
    let dist_rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| {
                    if i == j {
                        0.0
                    } else {
                        distance(&points[i], &points[j], metric)
                    }
                })
                .collect()
        })
        .collect();

    DMatrix::from_fn(n, n, |i, j| dist_rows[i][j])
}

/// Reject empty matrices and non-finite values before any numeric work.
pub fn check_input(data: &DMatrix<f64>, method: &str) -> Result<()> {
    if data.nrows() == 0 || data.ncols() == 0 {
        return Err(ProtspaceError::EmptyData(format!(
            "{} received an empty matrix",
            method
        )));
    }
    if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
        // Column-major position
        let (row, col) = (pos % data.nrows(), pos / data.nrows());
        return Err(ProtspaceError::Numerical(format!(
            "{} input has a non-finite value at row {}, column {}",
            method, row, col
        )));
    }
    Ok(())
}
