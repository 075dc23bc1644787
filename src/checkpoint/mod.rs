pub mod bundle;
pub mod coding;
pub mod state;
pub mod table;

pub use bundle::{BundleReader, BundleWriter};
pub use state::resolve_prefix;
