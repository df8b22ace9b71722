pub mod definition;
pub mod dsl;
pub mod error;
pub mod manifest;
pub mod paths;
pub mod registry;
pub mod settings;
pub mod storage;

pub use definition::{Definition, DefinitionKind};
pub use error::DefinitionError;
pub use registry::DefinitionRegistry;
