//! Datastore context providing the dependency injection root.

use std::sync::Arc;

use crate::config::GridConfig;
use crate::di::{Context as ContextDerive, FromRef};
use crate::dialect::{DatastoreProvider, GridDialect, InvocationCollectingGridDialect};
use crate::failure::{ErrorHandler, JournalRegistry, TransactionEventBridge};
use crate::options::OptionsContext;

/// Root context for one started datastore.
///
/// Uses `#[derive(Context)]` to generate `FromRef` implementations for each
/// field, so components such as [`TransactionEventBridge`] resolve from it.
#[derive(ContextDerive, Clone)]
pub struct DatastoreContext {
    /// The backend dialect, wrapped so that writes are journaled.
    pub dialect: Arc<dyn GridDialect>,
    /// Receives rollback reports.
    pub error_handler: Arc<dyn ErrorHandler>,
    /// Journals of recording transactions.
    pub journals: Arc<JournalRegistry>,
    pub config: Arc<GridConfig>,
}

impl DatastoreContext {
    /// Creates a context around `dialect`, with the error handler chosen by
    /// `config`.
    pub fn new<D: GridDialect + 'static>(dialect: D, config: GridConfig) -> Self {
        let journals = Arc::new(JournalRegistry::new());
        let dialect = InvocationCollectingGridDialect::new(dialect, journals.clone());
        let error_handler = config.error_handler.kind.build();
        tracing::debug!(kind = ?config.error_handler.kind, "Created datastore context");
        Self {
            dialect: Arc::new(dialect),
            error_handler,
            journals,
            config: Arc::new(config),
        }
    }

    /// Creates a context around the dialect of a started provider.
    pub fn from_provider<P: DatastoreProvider>(provider: &P, config: GridConfig) -> Self {
        Self::new(provider.grid_dialect(), config)
    }

    /// Replaces the configured error handler.
    pub fn with_error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = error_handler;
        self
    }

    pub fn bridge(&self) -> TransactionEventBridge {
        TransactionEventBridge::from_ref(self)
    }

    /// Options seeded with the global layer from configuration.
    pub fn options(&self) -> OptionsContext {
        OptionsContext::global(self.config.options.clone())
    }
}
