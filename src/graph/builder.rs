use crate::math::tensor::Tensor;
use crate::proto::{AttrValue, DataType, NodeDef, TensorProto, TensorShapeProto};

impl NodeDef {
    pub fn new(name: &str, op: &str) -> NodeDef {
        NodeDef {
            name: name.to_owned(),
            op: op.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: &str) -> NodeDef {
        self.input.push(input.to_owned());
        self
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> NodeDef {
        self.attr.insert(key.to_owned(), value.into());
        self
    }
}

impl TensorProto {
    /// Float constant stored as packed little-endian `tensor_content`.
    pub fn from_tensor(tensor: &Tensor) -> TensorProto {
        let dims: Vec<i64> = tensor.shape.iter().map(|&d| d as i64).collect();
        TensorProto {
            dtype: DataType::DtFloat as i32,
            tensor_shape: Some(TensorShapeProto::from_dims(&dims)),
            tensor_content: tensor.to_le_bytes(),
            ..Default::default()
        }
    }
}

/// `base` for the first use of a name in a scope, `base_k` afterwards.
pub fn scoped_name(base: &str, k: usize) -> String {
    if k == 0 {
        base.to_owned()
    } else {
        format!("{base}_{k}")
    }
}

pub fn placeholder_node(name: &str, dtype: DataType, dims: &[i64]) -> NodeDef {
    NodeDef::new(name, "Placeholder")
        .with_attr("dtype", dtype)
        .with_attr("shape", TensorShapeProto::from_dims(dims))
}

pub fn const_node(name: &str, value: &Tensor) -> NodeDef {
    NodeDef::new(name, "Const")
        .with_attr("dtype", DataType::DtFloat)
        .with_attr("value", TensorProto::from_tensor(value))
}

/// A float op node with its `T` type attribute set.
pub fn op_node(name: &str, op: &str, inputs: &[&str]) -> NodeDef {
    inputs
        .iter()
        .fold(NodeDef::new(name, op), |node, input| node.with_input(input))
        .with_attr("T", DataType::DtFloat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::framework::attr_value::Value;

    #[test]
    fn scoped_names() {
        assert_eq!(scoped_name("MatMul", 0), "MatMul");
        assert_eq!(scoped_name("Relu", 2), "Relu_2");
    }

    #[test]
    fn const_node_carries_shape_and_content() {
        let t = Tensor::new(vec![2], vec![1.0, -2.0]).unwrap();
        let node = const_node("Add/y", &t);
        assert_eq!(node.op, "Const");
        match &node.attr["value"].value {
            Some(Value::Tensor(proto)) => {
                assert_eq!(proto.tensor_shape.as_ref().unwrap().dims(), vec![2]);
                assert_eq!(proto.tensor_content.len(), 8);
            }
            other => panic!("unexpected value attr {other:?}"),
        }
    }

    #[test]
    fn op_node_keeps_input_order() {
        let node = op_node("MatMul", "MatMul", &["Placeholder", "MatMul/b"]);
        assert_eq!(node.input, vec!["Placeholder", "MatMul/b"]);
        assert!(node.attr.contains_key("T"));
    }
}
