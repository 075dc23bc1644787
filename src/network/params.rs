use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde::{Serialize, Deserialize};

use crate::math::tensor::Tensor;
use crate::network::topology::Topology;

/// The six trainable arrays of the Q-network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParamName {
    WeightH1,
    WeightH2,
    WeightOut,
    BiasH1,
    BiasH2,
    BiasOut,
}

impl ParamName {
    /// Declaration order in the training graph, which fixes the
    /// auto-generated variable names.
    pub const ALL: [ParamName; 6] = [
        ParamName::WeightH1,
        ParamName::WeightH2,
        ParamName::WeightOut,
        ParamName::BiasH1,
        ParamName::BiasH2,
        ParamName::BiasOut,
    ];

    /// Name the variable was saved under. Unnamed variables are called
    /// `Variable`, `Variable_1`, ... in the order they were created.
    pub fn variable_name(self) -> &'static str {
        match self {
            ParamName::WeightH1 => "Variable",
            ParamName::WeightH2 => "Variable_1",
            ParamName::WeightOut => "Variable_2",
            ParamName::BiasH1 => "Variable_3",
            ParamName::BiasH2 => "Variable_4",
            ParamName::BiasOut => "Variable_5",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ParamName::WeightH1 => "weight/h1",
            ParamName::WeightH2 => "weight/h2",
            ParamName::WeightOut => "weight/out",
            ParamName::BiasH1 => "bias/h1",
            ParamName::BiasH2 => "bias/h2",
            ParamName::BiasOut => "bias/out",
        }
    }
}

/// A complete, shape-checked set of parameter values held on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    topology: Topology,
    tensors: BTreeMap<ParamName, Tensor>,
}

impl ParameterSet {
    /// Fails unless all six parameters are present with the shapes
    /// `topology` dictates.
    pub fn new(topology: Topology, tensors: BTreeMap<ParamName, Tensor>) -> Result<ParameterSet> {
        for param in ParamName::ALL {
            let expected = topology.shape_of(param);
            match tensors.get(&param) {
                None => bail!("parameter {} is missing", param.label()),
                Some(t) if t.shape != expected => bail!(
                    "parameter {} has shape {:?}, expected {:?}",
                    param.label(), t.shape, expected
                ),
                Some(_) => {}
            }
        }
        Ok(ParameterSet { topology, tensors })
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn get(&self, param: ParamName) -> &Tensor {
        &self.tensors[&param]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamName, &Tensor)> {
        self.tensors.iter().map(|(&p, t)| (p, t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeros(topology: &Topology) -> BTreeMap<ParamName, Tensor> {
        ParamName::ALL
            .into_iter()
            .map(|p| {
                let shape = topology.shape_of(p);
                let n: usize = shape.iter().product();
                (p, Tensor::new(shape, vec![0.0; n]).unwrap())
            })
            .collect()
    }

    #[test]
    fn variable_names_are_distinct() {
        let names: std::collections::BTreeSet<_> =
            ParamName::ALL.iter().map(|p| p.variable_name()).collect();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn accepts_complete_set() {
        let set = ParameterSet::new(Topology::QNET, zeros(&Topology::QNET)).unwrap();
        assert_eq!(set.get(ParamName::WeightH2).shape, vec![256, 256]);
        assert_eq!(set.iter().count(), 6);
    }

    #[test]
    fn rejects_missing_or_misshapen_parameters() {
        let mut tensors = zeros(&Topology::QNET);
        tensors.remove(&ParamName::BiasOut);
        let err = ParameterSet::new(Topology::QNET, tensors).unwrap_err();
        assert!(err.to_string().contains("bias/out"));

        let narrow = Topology { n_inputs: 10, ..Topology::QNET };
        let err = ParameterSet::new(Topology::QNET, zeros(&narrow)).unwrap_err();
        assert!(err.to_string().contains("weight/h1"));
    }
}
