use anyhow::Result;

use crate::{layers::dense::Layer, math::matrix::Matrix};
use crate::network::params::ParameterSet;
use crate::network::topology::LAYERS;

/// The Q-network's forward computation over host-side parameter values:
/// two ReLU affine layers followed by a linear output layer.
#[derive(Debug, Clone)]
pub struct Network {
    pub layers: Vec<Layer>,
}

impl Network {
    pub fn from_params(params: &ParameterSet) -> Result<Network> {
        let layers = LAYERS
            .iter()
            .map(|&(weight, bias, activation)| {
                Layer::new(
                    params.get(weight).to_matrix()?,
                    params.get(bias).to_matrix()?,
                    activation,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Network { layers })
    }

    /// Forward pass over a batch of inputs, one row per sample.
    pub fn forward(&self, input: &Matrix) -> Matrix {
        self.layers
            .iter()
            .fold(input.clone(), |current, layer| layer.feed_from(&current))
    }
}
