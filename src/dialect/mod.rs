//! The contract between the persistence core and a storage backend.
//!
//! A backend supplies a [`DatastoreProvider`] that hands out a
//! [`GridDialect`]. Optional capabilities are facets:
//!
//! | Facet | Trait | Accessor |
//! |-------|-------|----------|
//! | Batching | [`BatchableGridDialect`] | [`GridDialect::as_batchable`] |
//! | Optimistic locking | [`OptimisticLockingAwareGridDialect`] | [`GridDialect::as_optimistic_locking_aware`] |
//!
//! [`InvocationCollectingGridDialect`] wraps any dialect to journal its
//! writes for error reporting.

mod batch;
mod collecting;
mod context;
pub mod facet;
mod provider;
mod traits;

pub use batch::OperationsQueue;
pub use collecting::InvocationCollectingGridDialect;
pub use context::{AssociationContext, AssociationTypeContext, TransactionId, TupleContext};
pub use facet::FacetKind;
pub use provider::DatastoreProvider;
pub use traits::{
    BatchableGridDialect, DuplicateInsertPreventionStrategy, GridDialect,
    OptimisticLockingAwareGridDialect,
};
