pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod proto;
pub mod checkpoint;
pub mod graph;
pub mod convert;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use math::tensor::Tensor;
pub use activation::activation::ActivationFunction;
pub use layers::dense::Layer;
pub use network::network::Network;
pub use network::{FrozenGraph, ParamName, ParameterSet, Topology, VariableGraph};
pub use checkpoint::{BundleReader, BundleWriter};
pub use graph::{read_graph, write_graph, Session};
pub use convert::{convert, ConversionReport};
