//! Tuplegrid - backend-agnostic persistence core
//!
//! Keys, tuples and a dialect contract for persisting relational data in
//! graph, document and key-value stores, with per-transaction journals of
//! applied writes for error reporting on rollback.

pub mod backends;
pub mod config;
pub mod context;
pub mod di;
pub mod dialect;
pub mod error;
pub mod failure;
pub mod model;
pub mod options;
pub mod value;

// Re-export FromRef at crate root for tuplegrid-macros generated code
pub use di::FromRef;

pub use config::GridConfig;
pub use context::DatastoreContext;
pub use error::GridError;
pub use failure::TransactionEventBridge;
pub use value::Value;
