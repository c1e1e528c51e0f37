//! Hooks the host calls at transaction boundaries.

use std::sync::Arc;

use crate::context::DatastoreContext;
use crate::di::FromContext;
use crate::dialect::TransactionId;
use crate::error::GridError;
use crate::failure::handler::ErrorHandler;
use crate::failure::journal::JournalRegistry;

/// Translates host transaction events into journal transitions and
/// error handler callbacks.
///
/// The host delivers each event exactly once per transaction.
///
/// # Example
///
/// ```ignore
/// let bridge = ctx.bridge();
/// bridge.transaction(|tx| {
///     let tuple_ctx = TupleContext::new(ctx.options()).in_transaction(tx);
///     ctx.dialect.insert_or_update_tuple(&key, &tuple, &tuple_ctx)
/// })?;
/// ```
#[derive(FromContext, Clone)]
#[from_context(Context = "DatastoreContext")]
pub struct TransactionEventBridge {
    journals: Arc<JournalRegistry>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl TransactionEventBridge {
    pub fn new(journals: Arc<JournalRegistry>, error_handler: Arc<dyn ErrorHandler>) -> Self {
        Self {
            journals,
            error_handler,
        }
    }

    /// Starts a journal for `transaction`.
    pub fn begin(&self, transaction: TransactionId) {
        self.journals.begin(transaction);
    }

    /// Ends a flush cycle: notifies the handler. Recording continues.
    pub fn flush(&self, transaction: TransactionId) {
        self.journals.finish_flush_cycle(transaction);
        self.error_handler.on_flush();
    }

    /// Runs a flush cycle, ending it whether or not `flush` succeeds.
    pub fn flush_with<T>(
        &self,
        transaction: TransactionId,
        flush: impl FnOnce() -> Result<T, GridError>,
    ) -> Result<T, GridError> {
        let result = flush();
        self.flush(transaction);
        result
    }

    /// Discards the journal of a committed transaction. No report is produced.
    pub fn commit(&self, transaction: TransactionId) {
        if self.journals.commit(transaction).is_none() {
            tracing::warn!(%transaction, "Commit for a transaction that was not recording");
        }
    }

    /// Reports the operations applied by a rolled back transaction to the
    /// error handler, then discards its journal.
    pub fn rollback(&self, transaction: TransactionId) {
        match self.journals.rollback(transaction) {
            Some(context) => {
                tracing::debug!(
                    %transaction,
                    applied = context.applied_grid_dialect_operations().len(),
                    "Reporting rolled back transaction"
                );
                self.error_handler.on_rollback(&context);
            }
            None => {
                tracing::warn!(%transaction, "Rollback for a transaction that was not recording");
            }
        }
    }

    /// Runs `work` in a new transaction.
    ///
    /// Commits if `work` succeeds, rolls back and returns its error otherwise.
    pub fn transaction<T>(
        &self,
        work: impl FnOnce(TransactionId) -> Result<T, GridError>,
    ) -> Result<T, GridError> {
        let transaction = TransactionId::new();
        self.begin(transaction);
        match work(transaction) {
            Ok(value) => {
                self.commit(transaction);
                Ok(value)
            }
            Err(e) => {
                self.rollback(transaction);
                Err(e)
            }
        }
    }
}
