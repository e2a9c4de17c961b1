//! Core traits for rotate-files.
//!
//! - `provider`: storage backends (StorageProvider)

pub mod provider;

pub use provider::*;
