//! Property-graph backend.
//!
//! - [`store`] - An in-process graph of labeled nodes and typed relationships
//! - [`GraphAssociationSnapshot`] - Rebuilds association rows from relationships
//! - [`GraphDialect`] - Maps tuples and associations onto the graph

mod dialect;
mod snapshot;
pub mod store;

pub use dialect::{
    GraphDatastore, GraphDatastoreProvider, GraphDialect, UniqueConstraint, EMBEDDED_LABEL,
};
pub use snapshot::GraphAssociationSnapshot;
pub use store::{Direction, GraphStore, Node, NodeId, Relationship, RelationshipId};
