use crate::error::LoadError;
use serde::{Deserialize, Serialize};

/// Row-aligned feature vectors in compressed sparse row layout.
///
/// Row `r` owns `indices[indptr[r]..indptr[r + 1]]` and the matching slice of
/// `values`. Column indices within a row are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    indptr: Vec<usize>,
    indices: Vec<u32>,
    values: Vec<f32>,
    n_cols: usize,
}

/// Borrowed view of one row.
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    pub indices: &'a [u32],
    pub values: &'a [f32],
}

impl<'a> SparseRow<'a> {
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Dot product of two sorted sparse rows.
    pub fn dot(&self, other: &SparseRow<'_>) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut acc = 0.0f32;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }

    pub fn nnz(&self) -> usize { self.indices.len() }
}

impl FeatureMatrix {
    /// Build from `(column indices, values)` pairs. Entries are sorted by column;
    /// duplicate or out-of-range columns are rejected. Explicit zeros are dropped.
    pub fn from_sparse_rows<I>(rows: I, n_cols: usize) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = (Vec<u32>, Vec<f32>)>,
    {
        let mut indptr = vec![0usize];
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (r, (idx, vals)) in rows.into_iter().enumerate() {
            if idx.len() != vals.len() {
                return Err(LoadError::MalformedMatrix(format!(
                    "row {r}: {} indices but {} values",
                    idx.len(),
                    vals.len()
                )));
            }
            if let Some(v) = vals.iter().find(|v| !v.is_finite()) {
                return Err(LoadError::MalformedMatrix(format!("row {r}: non-finite value {v}")));
            }
            let mut entries: Vec<(u32, f32)> = idx.into_iter().zip(vals).filter(|(_, v)| *v != 0.0).collect();
            entries.sort_by_key(|(c, _)| *c);
            for w in entries.windows(2) {
                if w[0].0 == w[1].0 {
                    return Err(LoadError::MalformedMatrix(format!("row {r}: duplicate column {}", w[0].0)));
                }
            }
            if let Some((c, _)) = entries.last() {
                if *c as usize >= n_cols {
                    return Err(LoadError::MalformedMatrix(format!("row {r}: column {c} out of range for {n_cols} columns")));
                }
            }
            for (c, v) in entries {
                indices.push(c);
                values.push(v);
            }
            indptr.push(indices.len());
        }
        Ok(Self { indptr, indices, values, n_cols })
    }

    /// Build from dense rows; every row must have the same width.
    pub fn from_dense_rows(rows: &[Vec<f32>]) -> Result<Self, LoadError> {
        let n_cols = rows.first().map_or(0, |r| r.len());
        let mut sparse = Vec::with_capacity(rows.len());
        for (r, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(LoadError::MalformedMatrix(format!(
                    "row {r} has {} columns, expected {n_cols}",
                    row.len()
                )));
            }
            let (idx, vals): (Vec<u32>, Vec<f32>) = row
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0.0)
                .map(|(c, v)| (c as u32, *v))
                .unzip();
            sparse.push((idx, vals));
        }
        Self::from_sparse_rows(sparse, n_cols)
    }

    pub fn rows(&self) -> usize { self.indptr.len().saturating_sub(1) }

    pub fn cols(&self) -> usize { self.n_cols }

    pub fn nnz(&self) -> usize { self.values.len() }

    pub fn row(&self, r: usize) -> Option<SparseRow<'_>> {
        let start = *self.indptr.get(r)?;
        let end = *self.indptr.get(r + 1)?;
        Some(SparseRow { indices: &self.indices[start..end], values: &self.values[start..end] })
    }

    /// Structural check for matrices that did not come through a constructor,
    /// e.g. ones deserialized from disk.
    pub fn validate(&self) -> Result<(), LoadError> {
        let bad = |msg: String| Err(LoadError::MalformedMatrix(msg));
        if self.indptr.first() != Some(&0) {
            return bad("indptr must start at 0".into());
        }
        if self.indices.len() != self.values.len() {
            return bad(format!("{} indices but {} values", self.indices.len(), self.values.len()));
        }
        if self.indptr.last() != Some(&self.indices.len()) {
            return bad("indptr does not cover all stored entries".into());
        }
        if let Some(r) = self.indptr.windows(2).position(|w| w[0] > w[1]) {
            return bad(format!("indptr decreases at row {r}"));
        }
        for (r, w) in self.indptr.windows(2).enumerate() {
            let cols = &self.indices[w[0]..w[1]];
            if cols.windows(2).any(|p| p[0] >= p[1]) {
                return bad(format!("row {r}: columns not strictly increasing"));
            }
            if cols.last().is_some_and(|c| *c as usize >= self.n_cols) {
                return bad(format!("row {r}: column out of range for {} columns", self.n_cols));
            }
            if self.values[w[0]..w[1]].iter().any(|v| !v.is_finite()) {
                return bad(format!("row {r}: non-finite value"));
            }
        }
        Ok(())
    }

    /// Dot product of row `r` against every row, in row order.
    ///
    /// With unit-length rows this is the cosine similarity. Returns `None` if
    /// `r` is out of range.
    pub fn similarities(&self, r: usize) -> Option<Vec<f32>> {
        let query = self.row(r)?;
        let mut dense = vec![0.0f32; self.n_cols];
        for (c, v) in query.indices.iter().zip(query.values) {
            dense[*c as usize] = *v;
        }
        let sims = self
            .indptr
            .windows(2)
            .map(|w| {
                self.indices[w[0]..w[1]]
                    .iter()
                    .zip(&self.values[w[0]..w[1]])
                    .map(|(c, v)| dense[*c as usize] * v)
                    .sum()
            })
            .collect();
        Some(sims)
    }

    /// L2-normalise every row in place. All-zero rows stay zero.
    pub fn normalize_rows(&mut self) {
        for w in self.indptr.windows(2) {
            let vals = &mut self.values[w[0]..w[1]];
            let norm = vals.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in vals.iter_mut() { *v /= norm; }
            }
        }
    }

    /// Rows that are neither unit length (within `tol`) nor all-zero.
    pub fn unnormalized_rows(&self, tol: f32) -> Vec<usize> {
        (0..self.rows())
            .filter(|r| {
                let n = self.row(*r).map_or(0.0, |row| row.norm());
                n != 0.0 && (n - 1.0).abs() > tol
            })
            .collect()
    }

    pub fn is_row_normalized(&self, tol: f32) -> bool { self.unnormalized_rows(tol).is_empty() }
}
