//! Core type definitions for rotate-files.
//!
//! Catalog records come in from storage providers, retention schemes come in
//! from configuration, and summaries go out to reporting and deletion.

pub mod outcome;
pub mod record;
pub mod scheme;
pub mod summary;

pub use outcome::*;
pub use record::*;
pub use scheme::*;
pub use summary::*;
