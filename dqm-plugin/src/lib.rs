//! Dynamic-library plugins contributing allocators and quality-test
//! factories to the process-wide registries.

pub mod error;
pub mod plugin;

pub use error::{Error, Result};
pub use plugin::{PluginManager, PLUGIN_API_VERSION};
