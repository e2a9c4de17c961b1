//! Retention classification and rotation orchestration.
//!
//! [`classify`] is a pure function over a catalog snapshot. The
//! [`RotationManager`] wraps it with listing and deletion against a
//! [`rotate_core::StorageProvider`].

pub mod calendar;
pub mod classifier;
pub mod manager;
mod metrics;

pub use classifier::classify;
pub use manager::{DeleteFailure, DeletionReport, RotationManager, RotationReport};
