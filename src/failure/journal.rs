//! Per-transaction journals of applied operations.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::dialect::TransactionId;
use crate::failure::handler::RollbackContext;
use crate::failure::operation::GridDialectOperation;

/// Lifecycle state of a journal.
///
/// A transaction without a journal is idle. Commit and rollback are
/// terminal: the journal is removed from the registry on either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalState {
    Recording,
    Committed,
    RolledBack,
}

/// The ordered operations applied by one transaction.
#[derive(Debug, Clone)]
pub struct OperationJournal {
    transaction: TransactionId,
    started_at: DateTime<Utc>,
    state: JournalState,
    operations: Vec<GridDialectOperation>,
    flush_cycles: usize,
}

impl OperationJournal {
    pub fn new(transaction: TransactionId) -> Self {
        Self {
            transaction,
            started_at: Utc::now(),
            state: JournalState::Recording,
            operations: Vec::new(),
            flush_cycles: 0,
        }
    }

    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> JournalState {
        self.state
    }

    pub fn operations(&self) -> &[GridDialectOperation] {
        &self.operations
    }

    /// Number of completed flush cycles. Recording continues across them.
    pub fn flush_cycles(&self) -> usize {
        self.flush_cycles
    }

    fn record(&mut self, operation: GridDialectOperation) {
        self.operations.push(operation);
    }

    fn commit(mut self) -> Self {
        self.state = JournalState::Committed;
        self
    }

    fn roll_back(self) -> RollbackContext {
        RollbackContext::new(self.transaction, self.operations).with_started_at(self.started_at)
    }
}

/// All recording journals, keyed by transaction.
///
/// Shared between the dialect decorator, which appends, and the
/// transaction bridge, which starts and ends journals. Concurrent
/// transactions never see each other's entries.
#[derive(Debug, Default)]
pub struct JournalRegistry {
    journals: Mutex<HashMap<TransactionId, OperationJournal>>,
}

impl JournalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TransactionId, OperationJournal>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.journals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts recording for `transaction`.
    ///
    /// Returns false, keeping the existing journal, if it is already recording.
    pub fn begin(&self, transaction: TransactionId) -> bool {
        let mut journals = self.lock();
        if journals.contains_key(&transaction) {
            tracing::warn!(%transaction, "Transaction already recording, keeping journal");
            return false;
        }
        journals.insert(transaction, OperationJournal::new(transaction));
        tracing::debug!(%transaction, "Started operation journal");
        true
    }

    /// Appends `operation` to the journal of `transaction`.
    ///
    /// Operations outside a transaction, or for a transaction that is not
    /// recording, are dropped.
    pub fn record(&self, transaction: Option<TransactionId>, operation: GridDialectOperation) {
        let Some(transaction) = transaction else {
            tracing::trace!(%operation, "Operation outside a transaction, not journaled");
            return;
        };
        match self.lock().get_mut(&transaction) {
            Some(journal) => {
                tracing::trace!(%transaction, %operation, "Journaled operation");
                journal.record(operation);
            }
            None => {
                tracing::warn!(%transaction, %operation, "No recording journal for transaction");
            }
        }
    }

    /// Marks the end of a flush cycle. The journal keeps recording.
    pub fn finish_flush_cycle(&self, transaction: TransactionId) -> bool {
        match self.lock().get_mut(&transaction) {
            Some(journal) => {
                journal.flush_cycles += 1;
                true
            }
            None => false,
        }
    }

    /// Ends the journal of a committed transaction and returns it.
    pub fn commit(&self, transaction: TransactionId) -> Option<OperationJournal> {
        let journal = self.lock().remove(&transaction)?;
        tracing::debug!(
            %transaction,
            operations = journal.operations.len(),
            duration_ms = (Utc::now() - journal.started_at()).num_milliseconds(),
            "Discarded journal of committed transaction"
        );
        Some(journal.commit())
    }

    /// Ends the journal of a rolled back transaction, producing its rollback report.
    pub fn rollback(&self, transaction: TransactionId) -> Option<RollbackContext> {
        let journal = self.lock().remove(&transaction)?;
        Some(journal.roll_back())
    }

    pub fn is_recording(&self, transaction: TransactionId) -> bool {
        self.lock().contains_key(&transaction)
    }

    /// A copy of the operations journaled so far for `transaction`.
    pub fn operations(&self, transaction: TransactionId) -> Vec<GridDialectOperation> {
        self.lock()
            .get(&transaction)
            .map(|journal| journal.operations.clone())
            .unwrap_or_default()
    }

    /// Number of transactions currently recording.
    pub fn active_transactions(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::operation::{CreateTupleWithKey, InsertOrUpdateTuple};
    use crate::model::{EntityKey, Tuple};
    use crate::value::Value;

    fn create(id: &str) -> GridDialectOperation {
        let key = EntityKey::of("Shipment", ["id"], vec![Value::from(id)]).unwrap();
        CreateTupleWithKey::new(key).into()
    }

    fn insert(id: &str) -> GridDialectOperation {
        let key = EntityKey::of("Shipment", ["id"], vec![Value::from(id)]).unwrap();
        InsertOrUpdateTuple::new(key, Tuple::new()).into()
    }

    #[test]
    fn test_rollback_returns_operations_in_order() {
        let registry = JournalRegistry::new();
        let tx = TransactionId::new();
        assert!(registry.begin(tx));

        registry.record(Some(tx), create("s1"));
        registry.record(Some(tx), insert("s1"));

        let context = registry.rollback(tx).unwrap();
        let ops = context.applied_grid_dialect_operations();
        assert_eq!(ops.len(), 2);
        assert!(ops[0].is::<CreateTupleWithKey>());
        assert!(ops[1].is::<InsertOrUpdateTuple>());
        assert!(!registry.is_recording(tx));
        assert!(registry.rollback(tx).is_none());
    }

    #[test]
    fn test_rollback_report_keeps_journal_start() {
        let registry = JournalRegistry::new();
        let tx = TransactionId::new();
        let before = Utc::now();
        registry.begin(tx);

        let context = registry.rollback(tx).unwrap();
        assert!(context.started_at() >= before);
        assert!(context.rolled_back_at() >= context.started_at());
        assert_eq!(
            context.duration(),
            context.rolled_back_at() - context.started_at()
        );
    }

    #[test]
    fn test_journals_are_isolated() {
        let registry = JournalRegistry::new();
        let a = TransactionId::new();
        let b = TransactionId::new();
        registry.begin(a);
        registry.begin(b);

        registry.record(Some(a), create("a1"));
        registry.record(Some(b), create("b1"));
        registry.record(Some(b), insert("b1"));

        assert_eq!(registry.operations(a).len(), 1);
        assert_eq!(registry.rollback(b).unwrap().applied_grid_dialect_operations().len(), 2);
        assert_eq!(registry.active_transactions(), 1);
    }

    #[test]
    fn test_unbound_and_unknown_operations_are_dropped() {
        let registry = JournalRegistry::new();
        let tx = TransactionId::new();

        registry.record(None, create("s1"));
        registry.record(Some(tx), create("s1"));

        assert!(registry.operations(tx).is_empty());
        assert_eq!(registry.active_transactions(), 0);
    }

    #[test]
    fn test_commit_ends_journal_and_flush_keeps_it() {
        let registry = JournalRegistry::new();
        let tx = TransactionId::new();
        registry.begin(tx);
        registry.record(Some(tx), create("s1"));

        assert!(registry.finish_flush_cycle(tx));
        registry.record(Some(tx), insert("s1"));

        let journal = registry.commit(tx).unwrap();
        assert_eq!(journal.state(), JournalState::Committed);
        assert_eq!(journal.flush_cycles(), 1);
        assert_eq!(journal.operations().len(), 2);
        assert!(registry.rollback(tx).is_none());
    }

    #[test]
    fn test_begin_twice_keeps_journal() {
        let registry = JournalRegistry::new();
        let tx = TransactionId::new();
        registry.begin(tx);
        registry.record(Some(tx), create("s1"));

        assert!(!registry.begin(tx));
        assert_eq!(registry.operations(tx).len(), 1);
    }
}
