use rand::prelude::*;
use std::f32::consts::PI;
use std::ops::{Add, Mul};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix{
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<Vec<f32>>
}

impl Matrix{
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix{
            rows,
            cols,
            data: vec![vec![0.0; cols]; rows]
        }
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal(rng: &mut ThreadRng) -> f32 {
        // Draw two independent uniform samples in (0, 1] to avoid log(0).
        let u1: f32 = 1.0 - rng.gen::<f32>();
        let u2: f32 = 1.0 - rng.gen::<f32>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// Standard-normal initialization, N(0, 1), as used for freshly declared
    /// variables before they are restored.
    pub fn random_normal(rows: usize, cols: usize) -> Matrix {
        let mut rng = rand::thread_rng();
        let mut res = Matrix::zeros(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                res.data[i][j] = Matrix::sample_standard_normal(&mut rng);
            }
        }
        res
    }

    pub fn transpose(&self) -> Matrix {
        let mut res = Matrix::zeros(self.cols, self.rows);

        for i in 0..res.rows {
            for j in 0..res.cols {
                res.data[i][j] = self.data[j][i];
            }
        }

        res
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f32) -> f32,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data
                .iter()
                .map(|row| row.iter().map(|&x| functor(x)).collect())
                .collect(),
        }
    }

    /// Builds a matrix from row vectors. All rows must share a length.
    pub fn from_data(data: Vec<Vec<f32>>) -> Matrix {
        let cols = data.first().map_or(0, |row| row.len());
        assert!(data.iter().all(|row| row.len() == cols), "ragged rows");
        Matrix {
            rows: data.len(),
            cols,
            data
        }
    }

    /// Builds a matrix from row-major flat storage.
    pub fn from_flat(rows: usize, cols: usize, flat: &[f32]) -> Matrix {
        assert_eq!(rows * cols, flat.len(), "flat length does not match {rows}x{cols}");
        if cols == 0 {
            return Matrix { rows, cols, data: vec![Vec::new(); rows] };
        }
        Matrix {
            rows,
            cols,
            data: flat.chunks_exact(cols).map(|row| row.to_vec()).collect(),
        }
    }

    /// Row-major flat copy of the contents.
    pub fn to_flat(&self) -> Vec<f32> {
        self.data.iter().flatten().copied().collect()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix { rows: 0, cols: 0, data: vec![] }
    }
}

/// Element-wise sum. A single-row right-hand side is broadcast over every
/// row of the left-hand side, which is how a bias vector is applied to a batch.
impl Add for &Matrix {
    type Output = Matrix;

    fn add(self, rhs: Self) -> Self::Output {
        let broadcast = rhs.rows == 1 && self.rows != 1;
        if self.cols != rhs.cols || (!broadcast && self.rows != rhs.rows) {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res = Matrix::zeros(self.rows, self.cols);

        for i in 0..self.rows {
            let r = if broadcast { 0 } else { i };
            for j in 0..self.cols {
                res.data[i][j] = self.data[i][j] + rhs.data[r][j];
            }
        }

        res
    }
}

impl Mul for &Matrix {
    type Output = Matrix;

    fn mul(self, rhs: Self) -> Self::Output {
        if self.cols != rhs.rows {
            panic!("Matrices are of incorrect sizes")
        }

        let mut res =  Matrix::zeros(self.rows, rhs.cols);

        for i in 0..res.rows {
            for j in 0..res.cols {
                let mut sum = 0.0;

                for k in 0..self.cols {
                    sum += self.data[i][k] * rhs.data[k][j];
                }

                res.data[i][j] = sum;
            }
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bias_row_broadcasts_over_batch() {
        let x = Matrix::from_data(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
        let b = Matrix::from_data(vec![vec![10.0, 20.0]]);
        let y = &x + &b;
        assert_eq!(y.data, vec![vec![11.0, 22.0], vec![13.0, 24.0], vec![15.0, 26.0]]);
    }

    #[test]
    #[should_panic(expected = "incorrect sizes")]
    fn add_rejects_mismatched_rows() {
        let a = Matrix::zeros(3, 2);
        let b = Matrix::zeros(2, 2);
        let _ = &a + &b;
    }

    #[test]
    fn flat_layout_is_row_major() {
        let m = Matrix::from_flat(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.data[1], vec![4.0, 5.0, 6.0]);
        assert_eq!(m.transpose().to_flat(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(m.to_flat(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn product_matches_hand_computation() {
        let a = Matrix::from_data(vec![vec![1.0, 2.0]]);
        let b = Matrix::from_data(vec![vec![3.0, 4.0, 5.0], vec![6.0, 7.0, 8.0]]);
        assert_eq!((&a * &b).data, vec![vec![15.0, 18.0, 21.0]]);
    }

    #[test]
    fn random_normal_has_requested_shape() {
        let m = Matrix::random_normal(4, 7);
        assert_eq!(m.shape(), (4, 7));
        assert!(m.to_flat().iter().all(|x| x.is_finite()));
    }
}
