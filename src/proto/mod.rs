pub mod bundle;
pub mod framework;

pub use bundle::{BundleEntryProto, BundleHeaderProto, Endianness};
pub use framework::{
    AttrValue, DataType, GraphDef, NodeDef, TensorProto, TensorShapeProto, VersionDef,
};
