//! Backend implementations of the dialect contract.
//!
//! | Backend | Module | Duplicate prevention | Facets |
//! |---------|--------|----------------------|--------|
//! | Key-value maps | [`map`] | Look-up | Optimistic locking |
//! | JSON documents | [`document`] | Native on insert | Batching |
//! | Property graph | [`graph`] | Native on insert | None |
//!
//! # Implementing a Backend
//!
//! 1. Create a dialect struct (e.g., `MapDialect`) and implement
//!    [`GridDialect`](crate::dialect::GridDialect) for it
//! 2. Implement the facet traits the store supports and return `Some(self)`
//!    from the matching `as_*` accessor
//! 3. Create a provider struct implementing
//!    [`DatastoreProvider`](crate::dialect::DatastoreProvider)

pub mod document;
pub mod graph;
pub mod map;
