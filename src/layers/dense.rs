use anyhow::{bail, Result};

use crate::{math::matrix::Matrix, activation::activation::ActivationFunction};

/// Affine layer `act(x·W + b)` evaluated over a batch of row vectors.
#[derive(Debug, Clone)]
pub struct Layer{
    pub size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction
}

impl Layer {
    /// `weights` is (input_size × size); `biases` is a single row of `size`.
    pub fn new(weights: Matrix, biases: Matrix, activation: ActivationFunction) -> Result<Layer> {
        if biases.rows != 1 || biases.cols != weights.cols {
            bail!(
                "bias shape {:?} does not fit weights {:?}",
                biases.shape(), weights.shape()
            );
        }
        Ok(Layer {
            size: weights.cols,
            weights,
            biases,
            activator: activation
        })
    }

    pub fn feed_from(&self, input: &Matrix) -> Matrix {
        let z = &(input * &self.weights) + &self.biases;
        z.map(|x| self.activator.function(x))
    }
}
