//! A dialect decorator journaling every successful write.

use std::sync::Arc;

use crate::dialect::batch::OperationsQueue;
use crate::dialect::context::{AssociationContext, AssociationTypeContext, TupleContext};
use crate::dialect::facet::FacetKind;
use crate::dialect::traits::{
    BatchableGridDialect, DuplicateInsertPreventionStrategy, GridDialect,
    OptimisticLockingAwareGridDialect,
};
use crate::error::GridError;
use crate::failure::operation::{
    CreateAssociationWithKey, CreateTupleWithKey, ExecuteBatch, InsertOrUpdateAssociation,
    InsertOrUpdateTuple, RemoveAssociation, RemoveTuple, RemoveTupleWithOptimisticLock,
    UpdateTupleWithOptimisticLock,
};
use crate::failure::JournalRegistry;
use crate::model::{
    Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, Tuple,
};

/// Wraps a dialect and journals each write that returns successfully into
/// the journal of the call's transaction.
///
/// Failed calls are never journaled. Optimistic-lock writes are journaled
/// only when they return `true`. A batch is journaled as one
/// [`ExecuteBatch`] after it applies; its queued writes are not journaled
/// individually. Reads pass through untouched.
///
/// The decorator exposes exactly the facets of the wrapped dialect.
pub struct InvocationCollectingGridDialect<D> {
    inner: D,
    journals: Arc<JournalRegistry>,
}

impl<D: GridDialect> InvocationCollectingGridDialect<D> {
    pub fn new(inner: D, journals: Arc<JournalRegistry>) -> Self {
        Self { inner, journals }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn journals(&self) -> &Arc<JournalRegistry> {
        &self.journals
    }

    fn batchable_inner(&self) -> Result<&dyn BatchableGridDialect, GridError> {
        self.inner
            .as_batchable()
            .ok_or(GridError::UnsupportedFacet(FacetKind::Batchable.name()))
    }

    fn optimistic_inner(&self) -> Result<&dyn OptimisticLockingAwareGridDialect, GridError> {
        self.inner
            .as_optimistic_locking_aware()
            .ok_or(GridError::UnsupportedFacet(FacetKind::OptimisticLockingAware.name()))
    }
}

impl<D: GridDialect> GridDialect for InvocationCollectingGridDialect<D> {
    fn get_tuple(
        &self,
        key: &EntityKey,
        context: &TupleContext,
    ) -> Result<Option<Tuple>, GridError> {
        self.inner.get_tuple(key, context)
    }

    fn create_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<Tuple, GridError> {
        let tuple = self.inner.create_tuple(key, context)?;
        self.journals.record(
            context.transaction(),
            CreateTupleWithKey::new(key.clone()).into(),
        );
        Ok(tuple)
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<(), GridError> {
        self.inner.insert_or_update_tuple(key, tuple, context)?;
        self.journals.record(
            context.transaction(),
            InsertOrUpdateTuple::new(key.clone(), tuple.clone()).into(),
        );
        Ok(())
    }

    fn remove_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<(), GridError> {
        self.inner.remove_tuple(key, context)?;
        self.journals
            .record(context.transaction(), RemoveTuple::new(key.clone()).into());
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>, GridError> {
        self.inner.get_association(key, context)
    }

    fn create_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Association, GridError> {
        let association = self.inner.create_association(key, context)?;
        self.journals.record(
            context.transaction(),
            CreateAssociationWithKey::new(key.clone()).into(),
        );
        Ok(association)
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<(), GridError> {
        self.inner
            .insert_or_update_association(key, association, context)?;
        self.journals.record(
            context.transaction(),
            InsertOrUpdateAssociation::new(key.clone(), association.clone(), context.clone())
                .into(),
        );
        Ok(())
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<(), GridError> {
        self.inner.remove_association(key, context)?;
        self.journals.record(
            context.transaction(),
            RemoveAssociation::new(key.clone(), context.clone()).into(),
        );
        Ok(())
    }

    fn is_stored_in_entity_structure(
        &self,
        metadata: &AssociationKeyMetadata,
        context: &AssociationTypeContext,
    ) -> bool {
        self.inner.is_stored_in_entity_structure(metadata, context)
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        self.inner.duplicate_insert_prevention_strategy(metadata)
    }

    fn as_batchable(&self) -> Option<&dyn BatchableGridDialect> {
        self.inner.as_batchable().map(|_| self as &dyn BatchableGridDialect)
    }

    fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        self.inner
            .as_optimistic_locking_aware()
            .map(|_| self as &dyn OptimisticLockingAwareGridDialect)
    }
}

impl<D: GridDialect> BatchableGridDialect for InvocationCollectingGridDialect<D> {
    fn execute_batch(&self, queue: OperationsQueue) -> Result<(), GridError> {
        let batchable = self.batchable_inner()?;
        let transaction = queue.transaction();
        let operations = queue.iter().cloned().collect();
        batchable.execute_batch(queue)?;
        self.journals
            .record(transaction, ExecuteBatch::new(operations).into());
        Ok(())
    }
}

impl<D: GridDialect> OptimisticLockingAwareGridDialect for InvocationCollectingGridDialect<D> {
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, GridError> {
        let applied = self.optimistic_inner()?.update_tuple_with_optimistic_lock(
            key,
            old_lock_state,
            tuple,
            context,
        )?;
        if applied {
            self.journals.record(
                context.transaction(),
                UpdateTupleWithOptimisticLock::new(key.clone(), old_lock_state.clone(), tuple.clone())
                    .into(),
            );
        }
        Ok(applied)
    }

    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, GridError> {
        let applied = self
            .optimistic_inner()?
            .remove_tuple_with_optimistic_lock(key, old_lock_state, context)?;
        if applied {
            self.journals.record(
                context.transaction(),
                RemoveTupleWithOptimisticLock::new(key.clone(), old_lock_state.clone()).into(),
            );
        }
        Ok(applied)
    }
}
