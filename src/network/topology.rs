use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::network::params::ParamName;

/// Layer widths of the Q-network: state features in, one value per action out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub n_inputs: usize,
    pub n_hidden_1: usize,
    pub n_hidden_2: usize,
    pub n_actions: usize,
}

/// (weight, bias, activation) for each affine layer, input to output.
pub const LAYERS: [(ParamName, ParamName, ActivationFunction); 3] = [
    (ParamName::WeightH1, ParamName::BiasH1, ActivationFunction::ReLU),
    (ParamName::WeightH2, ParamName::BiasH2, ActivationFunction::ReLU),
    (ParamName::WeightOut, ParamName::BiasOut, ActivationFunction::Identity),
];

impl Topology {
    /// The network every checkpoint handled by this tool was trained with.
    pub const QNET: Topology = Topology {
        n_inputs: 26,
        n_hidden_1: 256,
        n_hidden_2: 256,
        n_actions: 12,
    };

    pub fn shape_of(&self, param: ParamName) -> Vec<usize> {
        match param {
            ParamName::WeightH1 => vec![self.n_inputs, self.n_hidden_1],
            ParamName::WeightH2 => vec![self.n_hidden_1, self.n_hidden_2],
            ParamName::WeightOut => vec![self.n_hidden_2, self.n_actions],
            ParamName::BiasH1 => vec![self.n_hidden_1],
            ParamName::BiasH2 => vec![self.n_hidden_2],
            ParamName::BiasOut => vec![self.n_actions],
        }
    }
}
