//! Records of grid dialect operations applied within a transaction.
//!
//! Each mutating [`GridDialect`](crate::dialect::GridDialect) call that
//! succeeds is journaled as one [`GridDialectOperation`]. Consumers inspect
//! the closed set of kinds with [`GridDialectOperation::operation_type`] and
//! reach the typed payload with [`GridDialectOperation::as_variant`].

use std::fmt;

use crate::dialect::AssociationContext;
use crate::model::{Association, AssociationKey, EntityKey, Tuple};

/// Discriminant of a [`GridDialectOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridDialectOperationType {
    CreateTupleWithKey,
    InsertOrUpdateTuple,
    UpdateTupleWithOptimisticLock,
    RemoveTuple,
    RemoveTupleWithOptimisticLock,
    CreateAssociationWithKey,
    InsertOrUpdateAssociation,
    RemoveAssociation,
    ExecuteBatch,
}

/// A typed payload of one [`GridDialectOperation`] kind.
pub trait OperationVariant: Sized {
    const TYPE: GridDialectOperationType;

    fn cast(operation: &GridDialectOperation) -> Option<&Self>;
}

/// A successfully applied dialect operation.
#[derive(Debug, Clone)]
pub enum GridDialectOperation {
    CreateTupleWithKey(CreateTupleWithKey),
    InsertOrUpdateTuple(InsertOrUpdateTuple),
    UpdateTupleWithOptimisticLock(UpdateTupleWithOptimisticLock),
    RemoveTuple(RemoveTuple),
    RemoveTupleWithOptimisticLock(RemoveTupleWithOptimisticLock),
    CreateAssociationWithKey(CreateAssociationWithKey),
    InsertOrUpdateAssociation(InsertOrUpdateAssociation),
    RemoveAssociation(RemoveAssociation),
    ExecuteBatch(ExecuteBatch),
}

macro_rules! operation_variants {
    ($($variant:ident),+ $(,)?) => {
        impl GridDialectOperation {
            pub fn operation_type(&self) -> GridDialectOperationType {
                match self {
                    $(GridDialectOperation::$variant(_) => GridDialectOperationType::$variant,)+
                }
            }
        }

        $(
            impl OperationVariant for $variant {
                const TYPE: GridDialectOperationType = GridDialectOperationType::$variant;

                fn cast(operation: &GridDialectOperation) -> Option<&Self> {
                    match operation {
                        GridDialectOperation::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$variant> for GridDialectOperation {
                fn from(inner: $variant) -> Self {
                    GridDialectOperation::$variant(inner)
                }
            }
        )+
    };
}

operation_variants!(
    CreateTupleWithKey,
    InsertOrUpdateTuple,
    UpdateTupleWithOptimisticLock,
    RemoveTuple,
    RemoveTupleWithOptimisticLock,
    CreateAssociationWithKey,
    InsertOrUpdateAssociation,
    RemoveAssociation,
    ExecuteBatch,
);

impl GridDialectOperation {
    /// Returns the payload if this operation is of kind `T`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// if let Some(insert) = operation.as_variant::<InsertOrUpdateTuple>() {
    ///     println!("inserted {}", insert.entity_key());
    /// }
    /// ```
    pub fn as_variant<T: OperationVariant>(&self) -> Option<&T> {
        T::cast(self)
    }

    pub fn is<T: OperationVariant>(&self) -> bool {
        self.operation_type() == T::TYPE
    }
}

impl fmt::Display for GridDialectOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridDialectOperation::CreateTupleWithKey(op) => {
                write!(f, "CreateTupleWithKey({})", op.entity_key)
            }
            GridDialectOperation::InsertOrUpdateTuple(op) => {
                write!(f, "InsertOrUpdateTuple({})", op.entity_key)
            }
            GridDialectOperation::UpdateTupleWithOptimisticLock(op) => {
                write!(f, "UpdateTupleWithOptimisticLock({})", op.entity_key)
            }
            GridDialectOperation::RemoveTuple(op) => write!(f, "RemoveTuple({})", op.entity_key),
            GridDialectOperation::RemoveTupleWithOptimisticLock(op) => {
                write!(f, "RemoveTupleWithOptimisticLock({})", op.entity_key)
            }
            GridDialectOperation::CreateAssociationWithKey(op) => {
                write!(f, "CreateAssociationWithKey({})", op.association_key)
            }
            GridDialectOperation::InsertOrUpdateAssociation(op) => {
                write!(f, "InsertOrUpdateAssociation({})", op.association_key)
            }
            GridDialectOperation::RemoveAssociation(op) => {
                write!(f, "RemoveAssociation({})", op.association_key)
            }
            GridDialectOperation::ExecuteBatch(op) => {
                write!(f, "ExecuteBatch[{} operations]", op.operations.len())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateTupleWithKey {
    entity_key: EntityKey,
}

impl CreateTupleWithKey {
    pub fn new(entity_key: EntityKey) -> Self {
        Self { entity_key }
    }

    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }
}

#[derive(Debug, Clone)]
pub struct InsertOrUpdateTuple {
    entity_key: EntityKey,
    tuple: Tuple,
}

impl InsertOrUpdateTuple {
    pub fn new(entity_key: EntityKey, tuple: Tuple) -> Self {
        Self { entity_key, tuple }
    }

    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }

    pub fn tuple(&self) -> &Tuple {
        &self.tuple
    }
}

#[derive(Debug, Clone)]
pub struct UpdateTupleWithOptimisticLock {
    entity_key: EntityKey,
    old_lock_state: Tuple,
    tuple: Tuple,
}

impl UpdateTupleWithOptimisticLock {
    pub fn new(entity_key: EntityKey, old_lock_state: Tuple, tuple: Tuple) -> Self {
        Self {
            entity_key,
            old_lock_state,
            tuple,
        }
    }

    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }

    pub fn old_lock_state(&self) -> &Tuple {
        &self.old_lock_state
    }

    pub fn tuple(&self) -> &Tuple {
        &self.tuple
    }
}

#[derive(Debug, Clone)]
pub struct RemoveTuple {
    entity_key: EntityKey,
}

impl RemoveTuple {
    pub fn new(entity_key: EntityKey) -> Self {
        Self { entity_key }
    }

    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }
}

#[derive(Debug, Clone)]
pub struct RemoveTupleWithOptimisticLock {
    entity_key: EntityKey,
    old_lock_state: Tuple,
}

impl RemoveTupleWithOptimisticLock {
    pub fn new(entity_key: EntityKey, old_lock_state: Tuple) -> Self {
        Self {
            entity_key,
            old_lock_state,
        }
    }

    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }

    pub fn old_lock_state(&self) -> &Tuple {
        &self.old_lock_state
    }
}

#[derive(Debug, Clone)]
pub struct CreateAssociationWithKey {
    association_key: AssociationKey,
}

impl CreateAssociationWithKey {
    pub fn new(association_key: AssociationKey) -> Self {
        Self { association_key }
    }

    pub fn association_key(&self) -> &AssociationKey {
        &self.association_key
    }
}

#[derive(Debug, Clone)]
pub struct InsertOrUpdateAssociation {
    association_key: AssociationKey,
    association: Association,
    context: AssociationContext,
}

impl InsertOrUpdateAssociation {
    pub fn new(
        association_key: AssociationKey,
        association: Association,
        context: AssociationContext,
    ) -> Self {
        Self {
            association_key,
            association,
            context,
        }
    }

    pub fn association_key(&self) -> &AssociationKey {
        &self.association_key
    }

    pub fn association(&self) -> &Association {
        &self.association
    }

    pub fn context(&self) -> &AssociationContext {
        &self.context
    }
}

#[derive(Debug, Clone)]
pub struct RemoveAssociation {
    association_key: AssociationKey,
    context: AssociationContext,
}

impl RemoveAssociation {
    pub fn new(association_key: AssociationKey, context: AssociationContext) -> Self {
        Self {
            association_key,
            context,
        }
    }

    pub fn association_key(&self) -> &AssociationKey {
        &self.association_key
    }

    pub fn context(&self) -> &AssociationContext {
        &self.context
    }
}

/// A batch applied through [`BatchableGridDialect::execute_batch`](crate::dialect::BatchableGridDialect::execute_batch).
///
/// Recorded as a single operation; the queued writes are kept in order
/// as its constituents.
#[derive(Debug, Clone)]
pub struct ExecuteBatch {
    operations: Vec<GridDialectOperation>,
}

impl ExecuteBatch {
    pub fn new(operations: Vec<GridDialectOperation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[GridDialectOperation] {
        &self.operations
    }
}
