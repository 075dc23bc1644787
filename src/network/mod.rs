pub mod frozen;
pub mod network;
pub mod params;
pub mod topology;
pub mod variables;

pub use frozen::FrozenGraph;
pub use network::Network;
pub use params::{ParamName, ParameterSet};
pub use topology::Topology;
pub use variables::VariableGraph;
