//! Error Collector
//!
//! Append-only, thread-safe collection of [`QueryError`]s reported by
//! concurrently running query workers. Readers get a snapshot copy taken under
//! the same lock, so reading while workers are still reporting is safe.

use parking_lot::Mutex;
use tracing::warn;

use crate::error::QueryError;

/// Shared sink for query failures
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Mutex<Vec<QueryError>>,
}

impl ErrorCollector {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error
    ///
    /// Accepts either a [`QueryError`] or an `Option<QueryError>`; `None` is
    /// ignored so call sites can pass through an optional failure unchanged.
    pub fn report(&self, error: impl Into<Option<QueryError>>) {
        let Some(error) = error.into() else {
            return;
        };

        warn!(query = %error.query(), kind = %error.kind(), error = %error, "Query failed");
        self.errors.lock().push(error);
    }

    /// Snapshot of every error reported so far
    pub fn errors(&self) -> Vec<QueryError> {
        self.errors.lock().clone()
    }

    /// Number of errors reported so far
    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// Whether no error has been reported
    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }
}
