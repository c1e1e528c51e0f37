//! Per-call context handed to dialect operations.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ulid::Ulid;

use crate::model::AssociationKeyMetadata;
use crate::options::OptionsContext;

/// Stable identity of a host transaction, used to key its operation journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(Ulid);

impl TransactionId {
    /// Generates a new, unique transaction id.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Ulid> for TransactionId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Context of a tuple operation.
#[derive(Debug, Clone, Default)]
pub struct TupleContext {
    options: OptionsContext,
    transaction: Option<TransactionId>,
}

impl TupleContext {
    pub fn new(options: OptionsContext) -> Self {
        Self {
            options,
            transaction: None,
        }
    }

    /// Binds the call to a transaction so that its effect is journaled.
    pub fn in_transaction(mut self, transaction: TransactionId) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn options(&self) -> &OptionsContext {
        &self.options
    }

    /// The transaction this call belongs to; `None` for non-transactional access.
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }
}

/// Context information available when accessing an association type,
/// independent of any particular association instance.
#[derive(Debug, Clone)]
pub struct AssociationTypeContext {
    options: OptionsContext,
    metadata: Arc<AssociationKeyMetadata>,
    role_on_main_side: String,
}

impl AssociationTypeContext {
    /// # Arguments
    ///
    /// * `options` - Options resolved for the association property
    /// * `metadata` - Shape of the accessed association
    /// * `role_on_main_side` - Role of the association on its owning side;
    ///   the association's own role for uni-directional associations
    pub fn new(
        options: OptionsContext,
        metadata: Arc<AssociationKeyMetadata>,
        role_on_main_side: impl Into<String>,
    ) -> Self {
        Self {
            options,
            metadata,
            role_on_main_side: role_on_main_side.into(),
        }
    }

    pub fn options(&self) -> &OptionsContext {
        &self.options
    }

    pub fn metadata(&self) -> &AssociationKeyMetadata {
        &self.metadata
    }

    /// Role of the association on the main side.
    ///
    /// Backends use it to find the single physical relationship shared by
    /// both directions of a bi-directional association.
    pub fn role_on_main_side(&self) -> &str {
        &self.role_on_main_side
    }
}

/// Context of an association operation.
#[derive(Debug, Clone)]
pub struct AssociationContext {
    type_context: AssociationTypeContext,
    transaction: Option<TransactionId>,
}

impl AssociationContext {
    pub fn new(type_context: AssociationTypeContext) -> Self {
        Self {
            type_context,
            transaction: None,
        }
    }

    pub fn in_transaction(mut self, transaction: TransactionId) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn type_context(&self) -> &AssociationTypeContext {
        &self.type_context
    }

    pub fn metadata(&self) -> &AssociationKeyMetadata {
        self.type_context.metadata()
    }

    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }
}
