//! Error handlers notified when a transaction rolls back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::config::ErrorHandlerKind;
use crate::dialect::TransactionId;
use crate::failure::operation::GridDialectOperation;

/// What a transaction had applied when it rolled back.
///
/// Non-transactional backends cannot undo these writes; the report lets an
/// application compensate for them.
#[derive(Debug, Clone)]
pub struct RollbackContext {
    transaction: TransactionId,
    operations: Vec<GridDialectOperation>,
    started_at: DateTime<Utc>,
    rolled_back_at: DateTime<Utc>,
}

impl RollbackContext {
    pub fn new(transaction: TransactionId, operations: Vec<GridDialectOperation>) -> Self {
        let now = Utc::now();
        Self {
            transaction,
            operations,
            started_at: now,
            rolled_back_at: now,
        }
    }

    /// Sets when the transaction started recording.
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    /// Operations applied successfully before the rollback, in application order.
    pub fn applied_grid_dialect_operations(&self) -> &[GridDialectOperation] {
        &self.operations
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn rolled_back_at(&self) -> DateTime<Utc> {
        self.rolled_back_at
    }

    /// How long the transaction ran before rolling back.
    pub fn duration(&self) -> Duration {
        self.rolled_back_at - self.started_at
    }
}

/// Receives transaction failure reports.
pub trait ErrorHandler: Send + Sync {
    /// Called once per rolled back transaction.
    fn on_rollback(&self, context: &RollbackContext);

    /// Called at the end of every flush cycle, whether or not it succeeded.
    fn on_flush(&self) {}
}

/// Drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpErrorHandler;

impl ErrorHandler for NoOpErrorHandler {
    fn on_rollback(&self, _context: &RollbackContext) {}
}

/// Logs each rollback and its applied operations.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn on_rollback(&self, context: &RollbackContext) {
        let operations = context.applied_grid_dialect_operations();
        tracing::warn!(
            transaction = %context.transaction(),
            applied = operations.len(),
            rolled_back_at = %context.rolled_back_at().to_rfc3339(),
            duration_ms = context.duration().num_milliseconds(),
            "Transaction rolled back after applying operations to the datastore"
        );
        for (index, operation) in operations.iter().enumerate() {
            tracing::warn!(transaction = %context.transaction(), index, %operation, "Applied operation");
        }
    }
}

/// Keeps every report for later inspection.
#[derive(Debug, Default)]
pub struct InvocationTrackingHandler {
    rollbacks: Mutex<Vec<RollbackContext>>,
    flushes: AtomicUsize,
}

impl InvocationTrackingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rollback reports received so far, oldest first.
    pub fn on_rollback_invocations(&self) -> Vec<RollbackContext> {
        self.rollbacks
            .lock()
            .map(|rollbacks| rollbacks.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        match self.rollbacks.lock() {
            Ok(mut rollbacks) => rollbacks.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        self.flushes.store(0, Ordering::SeqCst);
    }
}

impl ErrorHandler for InvocationTrackingHandler {
    fn on_rollback(&self, context: &RollbackContext) {
        match self.rollbacks.lock() {
            Ok(mut rollbacks) => rollbacks.push(context.clone()),
            Err(poisoned) => poisoned.into_inner().push(context.clone()),
        }
    }

    fn on_flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

impl ErrorHandlerKind {
    /// Builds the configured handler.
    pub fn build(self) -> Arc<dyn ErrorHandler> {
        match self {
            ErrorHandlerKind::Noop => Arc::new(NoOpErrorHandler),
            ErrorHandlerKind::Log => Arc::new(LoggingErrorHandler),
        }
    }
}
