use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use log::debug;

use crate::checkpoint::bundle::BundleReader;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor;
use crate::network::network::Network;
use crate::network::params::{ParamName, ParameterSet};
use crate::network::topology::Topology;
use crate::proto::DataType;

/// A named, mutable parameter of the training graph.
#[derive(Debug, Clone)]
pub struct Variable {
    pub param: ParamName,
    pub value: Tensor,
}

impl Variable {
    pub fn name(&self) -> &'static str {
        self.param.variable_name()
    }
}

/// The Q-network as it exists during training: every parameter is a
/// restorable variable holding random values until a checkpoint is loaded.
#[derive(Debug)]
pub struct VariableGraph {
    topology: Topology,
    variables: Vec<Variable>,
}

impl VariableGraph {
    pub fn new(topology: Topology) -> VariableGraph {
        let variables = ParamName::ALL
            .into_iter()
            .map(|param| Variable {
                param,
                value: Tensor::random_normal(&topology.shape_of(param)),
            })
            .collect();
        VariableGraph { topology, variables }
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Loads every variable from the checkpoint, matching by name.
    ///
    /// All tensors are read and checked before any variable is assigned,
    /// so on error the graph keeps its previous values.
    pub fn restore(&mut self, reader: &BundleReader) -> Result<()> {
        let mut restored = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            let name = var.name();
            let (dtype, shape) = reader.metadata(name).with_context(|| {
                format!("restoring {} ({})", name, var.param.label())
            })?;
            if dtype != DataType::DtFloat {
                bail!("checkpoint tensor {name:?} has dtype {dtype:?}, variable is DtFloat");
            }
            if shape != var.value.shape {
                bail!(
                    "shape mismatch restoring {name:?} ({}): checkpoint has {:?}, graph declares {:?}",
                    var.param.label(), shape, var.value.shape
                );
            }
            let value = reader
                .read_tensor(name)
                .with_context(|| format!("restoring {} ({})", name, var.param.label()))?;
            debug!("restored {} {:?} as {}", name, value.shape, var.param.label());
            restored.push(value);
        }

        for name in reader.names().filter(|n| !self.variables.iter().any(|v| v.name() == *n)) {
            debug!("checkpoint tensor {name:?} is not used by this graph");
        }

        for (var, value) in self.variables.iter_mut().zip(restored) {
            var.value = value;
        }
        Ok(())
    }

    /// Copies the current variable values out into a parameter set.
    pub fn extract(&self) -> Result<ParameterSet> {
        let tensors: BTreeMap<ParamName, Tensor> = self
            .variables
            .iter()
            .map(|v| (v.param, v.value.clone()))
            .collect();
        ParameterSet::new(self.topology, tensors)
    }

    /// Evaluates the Q-values for a batch using the current variable values.
    pub fn forward(&self, input: &Matrix) -> Result<Matrix> {
        if input.cols != self.topology.n_inputs {
            bail!(
                "input has {} features, graph expects {}",
                input.cols, self.topology.n_inputs
            );
        }
        Ok(Network::from_params(&self.extract()?)?.forward(input))
    }
}
