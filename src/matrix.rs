use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use ndarray_linalg::Solve;

/// Row-major dense matrix.
pub type Matrix = Vec<Vec<f64>>;

pub fn to_array2(matrix: &[Vec<f64>]) -> Result<Array2<f64>> {
    let n = matrix.len();
    let m = matrix.first().map(|row| row.len()).unwrap_or(0);
    let mut data = Vec::with_capacity(n * m);
    for row in matrix {
        if row.len() != m {
            return Err(anyhow::anyhow!("matrix is not rectangular"));
        }
        data.extend_from_slice(row);
    }
    Array2::from_shape_vec((n, m), data).context("matrix shape")
}

/// Rows and columns `idx` of a square matrix.
pub fn principal_submatrix(matrix: &[Vec<f64>], idx: &[usize]) -> Matrix {
    idx.iter()
        .map(|&i| idx.iter().map(|&j| matrix[i][j]).collect())
        .collect()
}

pub fn solve_linear(a: &[Vec<f64>], b: &[f64]) -> Result<Vec<f64>> {
    let a = to_array2(a)?;
    if a.nrows() != b.len() || a.ncols() != b.len() {
        return Err(anyhow::anyhow!(
            "cannot solve a {}x{} system against {} values",
            a.nrows(),
            a.ncols(),
            b.len()
        ));
    }
    let x = a
        .solve_into(Array1::from_vec(b.to_vec()))
        .context("solve linear system")?;
    Ok(x.to_vec())
}

pub fn mat_vec_mul(mat: &[Vec<f64>], vec: &[f64]) -> Vec<f64> {
    mat.iter()
        .map(|row| row.iter().zip(vec).map(|(a, b)| a * b).sum())
        .collect()
}
