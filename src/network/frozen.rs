use std::path::Path;

use anyhow::Result;
use prost::Message;

use crate::graph::builder::{const_node, op_node, placeholder_node, scoped_name};
use crate::graph::io::write_graph;
use crate::network::params::ParameterSet;
use crate::network::topology::LAYERS;
use crate::proto::{DataType, GraphDef, VersionDef};

/// GraphDef version the emitted graphs claim to be produced by.
pub const GRAPH_DEF_VERSION: i32 = 24;

pub const INPUT_NODE: &str = "Placeholder";

/// The Q-network with every parameter baked in as a constant, ready to be
/// serialized for inference-only loading.
#[derive(Debug, Clone)]
pub struct FrozenGraph {
    graph_def: GraphDef,
    output: String,
}

impl FrozenGraph {
    /// Lays out the graph with the node names the training framework gives
    /// the same expressions: `MatMul`, `MatMul/b`, `Add`, `Add/y`, `Relu`,
    /// then `_1`, `_2` suffixes for the later layers.
    pub fn build(params: &ParameterSet) -> FrozenGraph {
        let topology = params.topology();
        let mut nodes = vec![placeholder_node(
            INPUT_NODE,
            DataType::DtFloat,
            &[-1, topology.n_inputs as i64],
        )];

        let mut current = INPUT_NODE.to_owned();
        for (k, &(weight, bias, activation)) in LAYERS.iter().enumerate() {
            let matmul = scoped_name("MatMul", k);
            let add = scoped_name("Add", k);
            let weight_const = format!("{matmul}/b");
            let bias_const = format!("{add}/y");

            nodes.push(const_node(&weight_const, params.get(weight)));
            nodes.push(
                op_node(&matmul, "MatMul", &[current.as_str(), weight_const.as_str()])
                    .with_attr("transpose_a", false)
                    .with_attr("transpose_b", false),
            );
            nodes.push(const_node(&bias_const, params.get(bias)));
            nodes.push(op_node(&add, "Add", &[matmul.as_str(), bias_const.as_str()]));
            current = add;

            if let Some(op) = activation.op_name() {
                let act = scoped_name(op, k);
                nodes.push(op_node(&act, op, &[current.as_str()]));
                current = act;
            }
        }

        let graph_def = GraphDef {
            node: nodes,
            version: 0,
            versions: Some(VersionDef {
                producer: GRAPH_DEF_VERSION,
                min_consumer: 0,
                bad_consumers: Vec::new(),
            }),
        };
        FrozenGraph { graph_def, output: current }
    }

    pub fn graph_def(&self) -> &GraphDef {
        &self.graph_def
    }

    pub fn input_name(&self) -> &str {
        INPUT_NODE
    }

    /// Name of the node producing the Q-values.
    pub fn output_name(&self) -> &str {
        &self.output
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.graph_def.encode_to_vec()
    }

    pub fn write(&self, path: &Path) -> Result<u64> {
        write_graph(&self.graph_def, path)
    }
}
