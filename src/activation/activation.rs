use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    Identity,
}

impl ActivationFunction {
    pub fn function(&self, x: f32) -> f32 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Identity => x,
        }
    }

    /// Graph op emitted after the affine step, if any.
    pub fn op_name(&self) -> Option<&'static str> {
        match self {
            ActivationFunction::ReLU => Some("Relu"),
            ActivationFunction::Identity => None,
        }
    }
}
