//! Entry point of a backend.

use std::sync::Arc;

use crate::dialect::traits::GridDialect;
use crate::error::GridError;

/// A started backend: hands out its dialect and describes backend-wide
/// capabilities.
///
/// Every method except [`grid_dialect`](DatastoreProvider::grid_dialect)
/// has a default suited to stores with no query language and no schema.
pub trait DatastoreProvider: Send + Sync {
    /// Schema commands understood by [`execute_ddl_commands`](DatastoreProvider::execute_ddl_commands).
    type DdlCommand;

    fn grid_dialect(&self) -> Arc<dyn GridDialect>;

    /// Name of the service translating queries for this backend, if any.
    fn default_query_parser_service(&self) -> Option<&'static str> {
        None
    }

    /// Whether the host may emulate transactions on top of this backend.
    fn allows_transaction_emulation(&self) -> bool {
        false
    }

    /// Applies schema commands, such as unique constraints, before first use.
    fn execute_ddl_commands(&self, _commands: &[Self::DdlCommand]) -> Result<(), GridError> {
        Ok(())
    }
}
