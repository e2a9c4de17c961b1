//! Core types, traits, and error definitions for rotate-files.
//!
//! This crate provides the building blocks shared by the classification
//! engine, the storage backends, and the command-line front end.

pub mod config;
pub mod error;
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
