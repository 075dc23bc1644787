//! Inference-only interpreter for frozen GraphDefs.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail, Context, Result};

use crate::math::matrix::Matrix;
use crate::math::tensor::{num_elements, Tensor};
use crate::proto::framework::attr_value::Value;
use crate::proto::{DataType, GraphDef, NodeDef, TensorProto};

const SUPPORTED_OPS: &[&str] = &[
    "Placeholder", "Const", "Identity", "MatMul", "Add", "AddV2", "BiasAdd", "Relu",
];

/// A validated graph that can be evaluated repeatedly.
///
/// Constants are decoded once when the session is opened. Values are at
/// most rank 2, and a rank-0 constant is held as a 1×1 matrix. The add ops
/// broadcast only a single-row right-hand operand with matching width;
/// scalars and left-hand operands are never broadcast.
pub struct Session<'g> {
    nodes: HashMap<&'g str, &'g NodeDef>,
    constants: HashMap<&'g str, Matrix>,
}

impl<'g> Session<'g> {
    /// Checks that every node uses a supported op, every input names an
    /// existing node, and every constant holds float data.
    pub fn new(graph: &'g GraphDef) -> Result<Session<'g>> {
        let mut nodes = HashMap::with_capacity(graph.node.len());
        for node in &graph.node {
            if nodes.insert(node.name.as_str(), node).is_some() {
                bail!("duplicate node name {:?}", node.name);
            }
        }

        let mut constants = HashMap::new();
        for node in &graph.node {
            if !SUPPORTED_OPS.contains(&node.op.as_str()) {
                bail!("node {:?} uses unsupported op {:?}", node.name, node.op);
            }
            for input in data_inputs(node) {
                if !nodes.contains_key(input) {
                    bail!("node {:?} reads from unknown node {:?}", node.name, input);
                }
            }
            if node.op == "Const" {
                let value = match node.attr.get("value").and_then(|a| a.value.as_ref()) {
                    Some(Value::Tensor(proto)) => decode_float_tensor(proto)
                        .with_context(|| format!("decoding constant {:?}", node.name))?,
                    _ => bail!("constant {:?} has no tensor value", node.name),
                };
                constants.insert(node.name.as_str(), value.to_matrix()?);
            }
        }

        Ok(Session { nodes, constants })
    }

    /// Evaluates `fetch` with the given placeholder values.
    pub fn run(&self, feeds: &[(&str, &Matrix)], fetch: &str) -> Result<Matrix> {
        let feeds: HashMap<&str, &Matrix> = feeds.iter().copied().collect();
        let mut cache = HashMap::new();
        let mut visiting = HashSet::new();
        self.eval(strip_output(fetch), &feeds, &mut cache, &mut visiting)
    }

    fn eval<'a>(
        &'a self,
        name: &'a str,
        feeds: &HashMap<&str, &Matrix>,
        cache: &mut HashMap<&'a str, Matrix>,
        visiting: &mut HashSet<&'a str>,
    ) -> Result<Matrix> {
        if let Some(value) = feeds.get(name) {
            return Ok((*value).clone());
        }
        if let Some(value) = cache.get(name) {
            return Ok(value.clone());
        }
        let node = *self
            .nodes
            .get(name)
            .ok_or_else(|| anyhow!("no node named {name:?}"))?;
        if !visiting.insert(name) {
            bail!("cycle through node {name:?}");
        }

        let mut args = Vec::new();
        for input in data_inputs(node) {
            args.push(self.eval(input, feeds, cache, visiting)?);
        }

        let value = match node.op.as_str() {
            "Placeholder" => bail!("placeholder {name:?} was not fed"),
            "Const" => self.constants[name].clone(),
            "Identity" => unary(node, args)?,
            "Relu" => unary(node, args)?.map(|x| x.max(0.0)),
            "MatMul" => {
                let (a, b) = binary(node, args)?;
                let a = if bool_attr(node, "transpose_a") { a.transpose() } else { a };
                let b = if bool_attr(node, "transpose_b") { b.transpose() } else { b };
                if a.cols != b.rows {
                    bail!("{name:?}: cannot multiply {:?} by {:?}", a.shape(), b.shape());
                }
                &a * &b
            }
            "Add" | "AddV2" | "BiasAdd" => {
                let (a, b) = binary(node, args)?;
                let broadcast = b.rows == 1;
                if a.cols != b.cols || (!broadcast && a.rows != b.rows) {
                    bail!("{name:?}: cannot add {:?} and {:?}", a.shape(), b.shape());
                }
                &a + &b
            }
            other => bail!("unsupported op {other:?}"),
        };

        visiting.remove(name);
        cache.insert(name, value.clone());
        Ok(value)
    }
}

fn data_inputs(node: &NodeDef) -> impl Iterator<Item = &str> {
    node.input
        .iter()
        .filter(|i| !i.starts_with('^'))
        .map(|i| strip_output(i))
}

/// `node:0` and `node` both name a node's first output.
fn strip_output(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((node, port)) if port.chars().all(|c| c.is_ascii_digit()) => node,
        _ => name,
    }
}

fn unary(node: &NodeDef, args: Vec<Matrix>) -> Result<Matrix> {
    let mut it = args.into_iter();
    match (it.next(), it.next()) {
        (Some(a), None) => Ok(a),
        _ => bail!("{:?} expects one input", node.name),
    }
}

fn binary(node: &NodeDef, args: Vec<Matrix>) -> Result<(Matrix, Matrix)> {
    let mut it = args.into_iter();
    match (it.next(), it.next(), it.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => bail!("{:?} expects two inputs", node.name),
    }
}

fn bool_attr(node: &NodeDef, key: &str) -> bool {
    matches!(
        node.attr.get(key).and_then(|a| a.value.as_ref()),
        Some(Value::B(true))
    )
}

/// Reads a float `TensorProto`, from `tensor_content` when present and
/// otherwise from `float_val`, where a single value fills the whole shape.
pub fn decode_float_tensor(proto: &TensorProto) -> Result<Tensor> {
    if proto.dtype() != DataType::DtFloat {
        bail!("expected a float tensor, got {:?}", proto.dtype());
    }
    let shape = proto
        .tensor_shape
        .as_ref()
        .map(|s| s.dims())
        .unwrap_or_default()
        .into_iter()
        .map(|d| usize::try_from(d).map_err(|_| anyhow!("bad dimension {d}")))
        .collect::<Result<Vec<_>>>()?;
    let n = num_elements(&shape)?;

    if !proto.tensor_content.is_empty() {
        return Tensor::from_le_bytes(shape, &proto.tensor_content);
    }
    let data = match proto.float_val.len() {
        len if len == n => proto.float_val.clone(),
        1 => vec![proto.float_val[0]; n],
        len => bail!("{len} float values cannot fill shape {shape:?}"),
    };
    Tensor::new(shape, data)
}
