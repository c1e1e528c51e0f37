//! Error reporting for non-transactional datastores.
//!
//! Most backends cannot undo writes on rollback. While a transaction is
//! recording, every successfully applied dialect operation is journaled;
//! on rollback the journal is handed to the configured [`ErrorHandler`] as a
//! [`RollbackContext`] so the application can compensate.
//!
//! - [`operation`] - The closed set of journaled operation kinds
//! - [`JournalRegistry`] - Journals keyed by transaction
//! - [`TransactionEventBridge`] - Host transaction events in, handler callbacks out
//! - [`ErrorHandler`] - Receives the reports

mod bridge;
mod handler;
mod journal;
pub mod operation;

pub use bridge::TransactionEventBridge;
pub use handler::{
    ErrorHandler, InvocationTrackingHandler, LoggingErrorHandler, NoOpErrorHandler,
    RollbackContext,
};
pub use journal::{JournalRegistry, JournalState, OperationJournal};
pub use operation::{GridDialectOperation, GridDialectOperationType, OperationVariant};
