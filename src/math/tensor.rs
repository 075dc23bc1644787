use anyhow::{bail, Result};

use crate::math::matrix::Matrix;

/// A host-side dense f32 array: a shape plus row-major data.
///
/// This is the unit exchanged between the checkpoint reader, the
/// parameter set and the frozen graph builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Tensor> {
        let expected = num_elements(&shape)?;
        if expected != data.len() {
            bail!(
                "tensor of shape {:?} needs {} values, got {}",
                shape, expected, data.len()
            );
        }
        Ok(Tensor { shape, data })
    }

    /// Standard-normal values for a tensor of rank 1 or 2.
    pub fn random_normal(shape: &[usize]) -> Tensor {
        let (rows, cols) = match *shape {
            [n] => (1, n),
            [r, c] => (r, c),
            _ => (1, shape.iter().product()),
        };
        Tensor {
            shape: shape.to_vec(),
            data: Matrix::random_normal(rows, cols).to_flat(),
        }
    }

    /// Views the tensor as a matrix. Rank 0 becomes 1×1, rank 1 a single row.
    pub fn to_matrix(&self) -> Result<Matrix> {
        let (rows, cols) = match *self.shape.as_slice() {
            [] => (1, 1),
            [n] => (1, n),
            [r, c] => (r, c),
            _ => bail!("cannot view tensor of rank {} as a matrix", self.shape.len()),
        };
        Ok(Matrix::from_flat(rows, cols, &self.data))
    }

    /// Raw little-endian bytes, the layout used by both checkpoint shards
    /// and `TensorProto.tensor_content`.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|x| x.to_le_bytes()).collect()
    }

    pub fn from_le_bytes(shape: Vec<usize>, bytes: &[u8]) -> Result<Tensor> {
        if bytes.len() % 4 != 0 {
            bail!("float buffer length {} is not a multiple of 4", bytes.len());
        }
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Tensor::new(shape, data)
    }
}

/// Element count of `shape`, or an error if it does not fit in `usize`.
pub fn num_elements(shape: &[usize]) -> Result<usize> {
    match shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)) {
        Some(n) => Ok(n),
        None => bail!("shape {shape:?} has too many elements"),
    }
}
