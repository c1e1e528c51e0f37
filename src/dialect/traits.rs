//! Core traits every storage backend implements.
//!
//! - [`GridDialect`] - Required for all backends
//! - [`BatchableGridDialect`] - Optional, for backends that apply queued writes in bulk
//! - [`OptimisticLockingAwareGridDialect`] - Optional, for backends with atomic
//!   compare-and-write on a version column
//!
//! Optional capabilities are discovered at runtime through
//! [`GridDialect::as_batchable`] and [`GridDialect::as_optimistic_locking_aware`];
//! see [`crate::dialect::facet`].

use std::sync::Arc;

use crate::dialect::batch::OperationsQueue;
use crate::dialect::context::{AssociationContext, AssociationTypeContext, TupleContext};
use crate::error::GridError;
use crate::model::{
    Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata, Tuple,
};

/// How a backend prevents inserting two entities with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateInsertPreventionStrategy {
    /// The backend rejects the duplicate while applying the insert, so the
    /// failing write is the insert itself.
    NativeOnInsert,
    /// The host looks the key up before inserting; a duplicate is detected
    /// without any write reaching the backend.
    LookUp,
}

/// Reads and writes tuples and associations in one storage backend.
///
/// Writes receive the full [`Tuple`] or [`Association`]; backends apply its
/// pending changes. A tuple without a snapshot was produced by
/// [`create_tuple`](GridDialect::create_tuple) and is written as an insert.
pub trait GridDialect: Send + Sync {
    /// Reads the tuple stored under `key`, if any.
    fn get_tuple(&self, key: &EntityKey, context: &TupleContext)
        -> Result<Option<Tuple>, GridError>;

    /// Creates an empty tuple for a new entity. Nothing is written yet.
    fn create_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<Tuple, GridError>;

    /// Writes `tuple` under `key`.
    ///
    /// Backends using [`DuplicateInsertPreventionStrategy::NativeOnInsert`]
    /// fail with [`GridError::DuplicateKey`] when inserting an existing key.
    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<(), GridError>;

    fn remove_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<(), GridError>;

    /// Reads the rows of the association identified by `key`.
    ///
    /// Returns `None` when the backend holds nothing for `key`.
    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>, GridError>;

    /// Creates an empty association. Nothing is written yet.
    fn create_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Association, GridError>;

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<(), GridError>;

    fn remove_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<(), GridError>;

    /// Whether rows of this association live inside the owning entity's
    /// structure, so the host must also write the entity when they change.
    fn is_stored_in_entity_structure(
        &self,
        _metadata: &AssociationKeyMetadata,
        _context: &AssociationTypeContext,
    ) -> bool {
        false
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy;

    /// Returns this dialect's batching facet, if it has one.
    fn as_batchable(&self) -> Option<&dyn BatchableGridDialect> {
        None
    }

    /// Returns this dialect's optimistic-locking facet, if it has one.
    fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        None
    }
}

/// Applies a queue of writes in one round trip.
pub trait BatchableGridDialect: GridDialect {
    /// Executes every queued operation in order, stopping at the first failure.
    fn execute_batch(&self, queue: OperationsQueue) -> Result<(), GridError>;
}

/// Atomic compare-and-write on the entity's version column.
///
/// Both operations return `false`, and change nothing, when the stored
/// version no longer matches the one in `old_lock_state`.
pub trait OptimisticLockingAwareGridDialect: GridDialect {
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, GridError>;

    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, GridError>;
}

impl<T: GridDialect + ?Sized> GridDialect for Arc<T> {
    fn get_tuple(
        &self,
        key: &EntityKey,
        context: &TupleContext,
    ) -> Result<Option<Tuple>, GridError> {
        (**self).get_tuple(key, context)
    }

    fn create_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<Tuple, GridError> {
        (**self).create_tuple(key, context)
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<(), GridError> {
        (**self).insert_or_update_tuple(key, tuple, context)
    }

    fn remove_tuple(&self, key: &EntityKey, context: &TupleContext) -> Result<(), GridError> {
        (**self).remove_tuple(key, context)
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>, GridError> {
        (**self).get_association(key, context)
    }

    fn create_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Association, GridError> {
        (**self).create_association(key, context)
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<(), GridError> {
        (**self).insert_or_update_association(key, association, context)
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<(), GridError> {
        (**self).remove_association(key, context)
    }

    fn is_stored_in_entity_structure(
        &self,
        metadata: &AssociationKeyMetadata,
        context: &AssociationTypeContext,
    ) -> bool {
        (**self).is_stored_in_entity_structure(metadata, context)
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        (**self).duplicate_insert_prevention_strategy(metadata)
    }

    fn as_batchable(&self) -> Option<&dyn BatchableGridDialect> {
        (**self).as_batchable()
    }

    fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        (**self).as_optimistic_locking_aware()
    }
}
