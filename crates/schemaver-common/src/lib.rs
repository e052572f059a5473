pub mod error;

pub use error::{Error, Result};

/// Structural revision of a host-owned table set. Zero means "never installed".
pub type SchemaVersion = u32;
