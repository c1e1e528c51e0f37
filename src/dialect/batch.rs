//! Writes queued for a batchable dialect.

use std::collections::VecDeque;

use crate::dialect::context::{AssociationContext, TransactionId};
use crate::failure::operation::{
    GridDialectOperation, InsertOrUpdateAssociation, InsertOrUpdateTuple, RemoveAssociation,
    RemoveTuple,
};
use crate::model::{Association, AssociationKey, EntityKey, Tuple};

/// An ordered queue of writes applied by
/// [`BatchableGridDialect::execute_batch`](crate::dialect::BatchableGridDialect::execute_batch).
///
/// Only the four write kinds a batch can carry are accepted. A queue
/// belongs to at most one transaction; the batch is journaled there.
#[derive(Debug, Clone, Default)]
pub struct OperationsQueue {
    transaction: Option<TransactionId>,
    operations: VecDeque<GridDialectOperation>,
}

impl OperationsQueue {
    pub fn new(transaction: Option<TransactionId>) -> Self {
        Self {
            transaction,
            operations: VecDeque::new(),
        }
    }

    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    pub fn insert_or_update_tuple(&mut self, key: EntityKey, tuple: Tuple) {
        self.operations
            .push_back(InsertOrUpdateTuple::new(key, tuple).into());
    }

    pub fn remove_tuple(&mut self, key: EntityKey) {
        self.operations.push_back(RemoveTuple::new(key).into());
    }

    pub fn insert_or_update_association(
        &mut self,
        key: AssociationKey,
        association: Association,
        context: AssociationContext,
    ) {
        self.operations
            .push_back(InsertOrUpdateAssociation::new(key, association, context).into());
    }

    pub fn remove_association(&mut self, key: AssociationKey, context: AssociationContext) {
        self.operations
            .push_back(RemoveAssociation::new(key, context).into());
    }

    /// Whether a write for `key` is queued, so a host can detect duplicates
    /// that have not reached the backend yet.
    pub fn contains_tuple(&self, key: &EntityKey) -> bool {
        self.operations.iter().any(|op| match op {
            GridDialectOperation::InsertOrUpdateTuple(insert) => insert.entity_key() == key,
            _ => false,
        })
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GridDialectOperation> {
        self.operations.iter()
    }

    pub fn poll(&mut self) -> Option<GridDialectOperation> {
        self.operations.pop_front()
    }
}

impl IntoIterator for OperationsQueue {
    type Item = GridDialectOperation;
    type IntoIter = std::collections::vec_deque::IntoIter<GridDialectOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}
