//! Snapshot a [`dqm_core::Storage`] tree to a container file.

pub mod archiver;
pub mod error;
pub mod naming;

pub use archiver::{Archiver, OpenMode};
pub use error::{Error, Result};
