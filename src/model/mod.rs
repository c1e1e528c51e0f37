//! Key model and tuple abstraction.
//!
//! Keys identify rows ([`EntityKey`]), association row sets
//! ([`AssociationKey`]) and association rows ([`RowKey`]). Tuples are the
//! backend-neutral column views read and written through a
//! [`GridDialect`](crate::dialect::GridDialect).

mod association;
pub mod embedded;
mod key;
mod metadata;
mod tuple;

pub use association::{Association, AssociationOperation};
pub use key::{AssociationKey, EntityKey, EntityKeyMetadata, RowKey};
pub use metadata::{
    AssociatedEntityKeyMetadata, AssociationKeyMetadata, AssociationKeyMetadataBuilder,
    AssociationKind,
};
pub use tuple::{MapTupleSnapshot, Tuple, TupleOperation, TupleSnapshot};
