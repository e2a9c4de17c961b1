//! Mock implementations of core traits for testing.
//!
//! Used by the engine and binary test suites to drive rotation runs without
//! touching real storage.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use crate::{traits::StorageProvider, types::CatalogRecord, Error, Result};

// =============================================================================
// Mock Storage Provider
// =============================================================================

/// In-memory provider that records every call.
#[derive(Default)]
pub struct MockProvider {
    records: Mutex<Vec<CatalogRecord>>,
    list_error: Option<String>,
    failing_deletes: HashSet<String>,
    list_calls: Mutex<Vec<String>>,
    delete_calls: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the provider with a catalog.
    pub fn with_records(records: Vec<CatalogRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Make every `list` call fail.
    pub fn failing_list(mut self, message: &str) -> Self {
        self.list_error = Some(message.to_string());
        self
    }

    /// Make `delete` fail for this identifier.
    pub fn failing_delete(mut self, identifier: &str) -> Self {
        self.failing_deletes.insert(identifier.to_string());
        self
    }

    /// Identifiers passed to `delete`, in call order.
    pub fn deleted(&self) -> Vec<String> {
        self.delete_calls.lock().unwrap().clone()
    }

    /// Locations passed to `list`.
    pub fn listed(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }

    /// Records still present after successful deletes.
    pub fn remaining(&self) -> Vec<CatalogRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list(&self, location: &str) -> Result<Vec<CatalogRecord>> {
        self.list_calls.lock().unwrap().push(location.to_string());
        if let Some(ref message) = self.list_error {
            return Err(Error::provider_list(message.clone()));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn delete(&self, identifier: &str) -> Result<()> {
        self.delete_calls.lock().unwrap().push(identifier.to_string());
        if self.failing_deletes.contains(identifier) {
            return Err(Error::provider_delete(identifier, "mock delete failure"));
        }
        self.records
            .lock()
            .unwrap()
            .retain(|r| r.identifier != identifier);
        Ok(())
    }
}
