//! Dense row-major matrix used for design matrices.

use crate::error::{ForecastError, Result};

/// Row-major matrix of `f64`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    n_rows: usize,
    n_cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            data: vec![0.0; n_rows * n_cols],
        }
    }

    /// Matrix from row vectors that must all have the same length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * n_cols);
        for row in &rows {
            if row.len() != n_cols {
                return Err(ForecastError::DimensionMismatch {
                    expected: n_cols,
                    got: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            n_rows: rows.len(),
            n_cols,
            data,
        })
    }

    /// Matrix from column vectors that must all have `n_rows` entries.
    pub fn from_columns(n_rows: usize, columns: &[Vec<f64>]) -> Result<Self> {
        let mut m = Self::zeros(n_rows, columns.len());
        for (j, col) in columns.iter().enumerate() {
            if col.len() != n_rows {
                return Err(ForecastError::DimensionMismatch {
                    expected: n_rows,
                    got: col.len(),
                });
            }
            for (i, v) in col.iter().enumerate() {
                m.data[i * m.n_cols + j] = *v;
            }
        }
        Ok(m)
    }

    /// Single-row matrix.
    pub fn row_vector(row: Vec<f64>) -> Self {
        Self {
            n_rows: 1,
            n_cols: row.len(),
            data: row,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.n_cols + col] = value;
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.n_rows).map(|i| self.get(i, j)).collect()
    }

    /// Columns in the given order.
    pub fn select_columns(&self, cols: &[usize]) -> Matrix {
        let mut out = Matrix::zeros(self.n_rows, cols.len());
        for i in 0..self.n_rows {
            for (k, &j) in cols.iter().enumerate() {
                out.set(i, k, self.get(i, j));
            }
        }
        out
    }

    /// Rows `start..end`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Matrix {
        let end = end.min(self.n_rows);
        let start = start.min(end);
        Matrix {
            n_rows: end - start,
            n_cols: self.n_cols,
            data: self.data[start * self.n_cols..end * self.n_cols].to_vec(),
        }
    }

    /// Concatenate columns of `other` to the right.
    pub fn hstack(&self, other: &Matrix) -> Result<Matrix> {
        if self.n_cols == 0 {
            return Ok(other.clone());
        }
        if other.n_cols == 0 {
            return Ok(self.clone());
        }
        if self.n_rows != other.n_rows {
            return Err(ForecastError::DimensionMismatch {
                expected: self.n_rows,
                got: other.n_rows,
            });
        }
        let mut data = Vec::with_capacity(self.n_rows * (self.n_cols + other.n_cols));
        for i in 0..self.n_rows {
            data.extend_from_slice(self.row(i));
            data.extend_from_slice(other.row(i));
        }
        Ok(Matrix {
            n_rows: self.n_rows,
            n_cols: self.n_cols + other.n_cols,
            data,
        })
    }

    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|v| v.is_nan())
    }
}
