//! A minimal persistence host driving a datastore context the way an
//! entity manager would: look-ups, queued writes, flushes and transaction
//! boundaries.

#![allow(dead_code)]

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tuplegrid::backends::document::DocumentDatastoreProvider;
use tuplegrid::backends::graph::GraphDatastoreProvider;
use tuplegrid::backends::map::MapDatastoreProvider;
use tuplegrid::config::DatastoreConfig;
use tuplegrid::dialect::{
    DatastoreProvider, DuplicateInsertPreventionStrategy, OperationsQueue, TransactionId,
    TupleContext,
};
use tuplegrid::failure::InvocationTrackingHandler;
use tuplegrid::model::{EntityKey, EntityKeyMetadata, Tuple};
use tuplegrid::{DatastoreContext, GridConfig, GridError, Value};

/// One backend under test, with its tracking error handler.
pub struct Backend {
    pub name: &'static str,
    pub ctx: DatastoreContext,
    pub handler: Arc<InvocationTrackingHandler>,
}

/// Installs a test log subscriber once; `RUST_LOG=tuplegrid=trace` shows journaling.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn backend<P: DatastoreProvider>(name: &'static str, provider: &P) -> Backend {
    init_tracing();
    let handler = Arc::new(InvocationTrackingHandler::new());
    let ctx = DatastoreContext::from_provider(provider, GridConfig::default())
        .with_error_handler(handler.clone());
    Backend { name, ctx, handler }
}

pub fn map_backend() -> Backend {
    backend("map", &MapDatastoreProvider::new())
}

pub fn document_backend() -> Backend {
    let provider =
        DocumentDatastoreProvider::start(DatastoreConfig::default()).expect("Failed to start");
    backend("document", &provider)
}

pub fn graph_backend() -> Backend {
    backend("graph", &GraphDatastoreProvider::new())
}

pub fn all_backends() -> Vec<Backend> {
    vec![map_backend(), document_backend(), graph_backend()]
}

pub fn shipment_metadata() -> Arc<EntityKeyMetadata> {
    Arc::new(EntityKeyMetadata::new("Shipment", ["id"]))
}

pub fn shipment_key(id: &str) -> EntityKey {
    EntityKey::new(shipment_metadata(), vec![Value::from(id)]).expect("valid key")
}

fn version_of(tuple: &Tuple) -> i64 {
    tuple.get("version").and_then(Value::as_i64).unwrap_or(0)
}

/// A unit of work bound to one transaction.
pub struct Session {
    ctx: DatastoreContext,
    transaction: TransactionId,
    queue: OperationsQueue,
    loaded: HashMap<String, Tuple>,
    dirty: Vec<(String, String)>,
}

impl Session {
    pub fn begin(ctx: &DatastoreContext) -> Self {
        let transaction = TransactionId::new();
        ctx.bridge().begin(transaction);
        Self {
            ctx: ctx.clone(),
            transaction,
            queue: OperationsQueue::new(Some(transaction)),
            loaded: HashMap::new(),
            dirty: Vec::new(),
        }
    }

    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    fn tuple_context(&self) -> TupleContext {
        TupleContext::new(self.ctx.options()).in_transaction(self.transaction)
    }

    pub fn persist(&mut self, id: &str, state: &str) -> Result<(), GridError> {
        let dialect = &self.ctx.dialect;
        let key = shipment_key(id);
        let tuple_ctx = self.tuple_context();

        if dialect.duplicate_insert_prevention_strategy(key.metadata())
            == DuplicateInsertPreventionStrategy::LookUp
            && (dialect.get_tuple(&key, &tuple_ctx)?.is_some() || self.queue.contains_tuple(&key))
        {
            return Err(GridError::DuplicateKey(key.to_string()));
        }

        let mut tuple = dialect.create_tuple(&key, &tuple_ctx)?;
        tuple.put("id", id);
        tuple.put("state", state);
        tuple.put("version", 0i64);

        if dialect.as_batchable().is_some() {
            self.queue.insert_or_update_tuple(key, tuple);
            Ok(())
        } else {
            dialect.insert_or_update_tuple(&key, &tuple, &tuple_ctx)
        }
    }

    pub fn load(&mut self, id: &str) -> Result<Option<String>, GridError> {
        let tuple = self.ctx.dialect.get_tuple(&shipment_key(id), &self.tuple_context())?;
        let state = tuple
            .as_ref()
            .and_then(|t| t.get("state"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(tuple) = tuple {
            self.loaded.insert(id.to_string(), tuple);
        }
        Ok(state)
    }

    pub fn set_state(&mut self, id: &str, state: &str) {
        self.dirty.push((id.to_string(), state.to_string()));
    }

    fn write_updates(&mut self) -> Result<(), GridError> {
        let dialect = self.ctx.dialect.clone();
        let tuple_ctx = self.tuple_context();

        for (id, state) in mem::take(&mut self.dirty) {
            let key = shipment_key(&id);
            let old = self
                .loaded
                .get(&id)
                .cloned()
                .ok_or_else(|| GridError::TupleNotFound(key.to_string()))?;
            let mut updated = old.clone();
            updated.put("state", state.as_str());
            updated.put("version", version_of(&old) + 1);

            if let Some(locking) = dialect.as_optimistic_locking_aware() {
                if !locking.update_tuple_with_optimistic_lock(&key, &old, &updated, &tuple_ctx)? {
                    return Err(GridError::OptimisticLock { key: key.to_string() });
                }
            } else {
                let current = dialect.get_tuple(&key, &tuple_ctx)?;
                if current.as_ref().map(version_of) != Some(version_of(&old)) {
                    return Err(GridError::OptimisticLock { key: key.to_string() });
                }
                if dialect.as_batchable().is_some() {
                    self.queue.insert_or_update_tuple(key, updated.clone());
                } else {
                    dialect.insert_or_update_tuple(&key, &updated, &tuple_ctx)?;
                }
            }
            self.loaded.insert(id, updated);
        }

        if !self.queue.is_empty() {
            let queue = mem::replace(&mut self.queue, OperationsQueue::new(Some(self.transaction)));
            if let Some(batchable) = dialect.as_batchable() {
                batchable.execute_batch(queue)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), GridError> {
        let bridge = self.ctx.bridge();
        let transaction = self.transaction;
        bridge.flush_with(transaction, || self.write_updates())
    }

    /// Clears loaded state, keeping the transaction open.
    pub fn clear(&mut self) {
        self.loaded.clear();
        self.dirty.clear();
    }

    pub fn commit(mut self) -> Result<(), GridError> {
        match self.flush() {
            Ok(()) => {
                self.ctx.bridge().commit(self.transaction);
                Ok(())
            }
            Err(e) => {
                self.ctx.bridge().rollback(self.transaction);
                Err(e)
            }
        }
    }

    pub fn rollback(self) {
        self.ctx.bridge().rollback(self.transaction);
    }
}

/// Persists shipments in their own committed transaction.
pub fn seed(ctx: &DatastoreContext, ids: &[&str]) {
    let mut session = Session::begin(ctx);
    for id in ids {
        session.persist(id, "INITIAL").expect("Failed to persist");
    }
    session.commit().expect("Failed to commit seed data");
}

/// Updates a shipment in a separate, committed transaction.
pub fn update_in_other_transaction(ctx: &DatastoreContext, id: &str, state: &str) {
    let mut session = Session::begin(ctx);
    session.load(id).expect("Failed to load");
    session.set_state(id, state);
    session.commit().expect("Failed to commit concurrent update");
}
