pub mod builder;
pub mod io;
pub mod runtime;

pub use io::{read_graph, write_graph};
pub use runtime::Session;
