//! Test registry.

use std::sync::Arc;

use papaya::HashMap;
use uuid::Uuid;

use crate::model::TestInfo;

/// A concurrent registry of tests, keyed by their identity.
///
/// The registry is the directory of every known test: tests stay in it until they are explicitly removed, regardless
/// of whether they are still running. Cloning the registry creates a new handle to the same underlying tests.
#[derive(Clone, Default)]
pub struct TestRegistry {
    tests: Arc<HashMap<Uuid, Arc<TestInfo>>>,
}

impl TestRegistry {
    /// Creates a new, empty `TestRegistry`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the given test to the registry, unless a test with the same identity already exists.
    ///
    /// # Errors
    ///
    /// If a test with the same identity already exists, the given test is handed back and the registry is left
    /// unchanged.
    pub fn add(&self, info: Arc<TestInfo>) -> Result<(), Arc<TestInfo>> {
        self.tests
            .pin()
            .try_insert(info.id(), info)
            .map(|_| ())
            .map_err(|e| e.not_inserted)
    }

    /// Gets the test with the given identity.
    pub fn get(&self, id: &Uuid) -> Option<Arc<TestInfo>> {
        self.tests.pin().get(id).cloned()
    }

    /// Removes the test with the given identity, returning it if it was present.
    pub fn remove(&self, id: &Uuid) -> Option<Arc<TestInfo>> {
        self.tests.pin().remove(id).cloned()
    }

    /// Returns a snapshot of every test in the registry, in no particular order.
    ///
    /// Tests added or removed while the snapshot is being taken may or may not be included.
    pub fn snapshot(&self) -> Vec<Arc<TestInfo>> {
        self.tests.pin().values().cloned().collect()
    }

    /// Returns the number of tests that have not reached a terminal status yet.
    pub fn count_active(&self) -> usize {
        self.tests
            .pin()
            .values()
            .filter(|info| !info.status().is_terminal())
            .count()
    }

    /// Returns the number of tests in the registry.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns `true` if the registry contains no tests.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
