//! Facet discovery on the bundled dialects and through the journaling
//! decorator.

use std::sync::Arc;

use tuplegrid::backends::document::DocumentDatastoreProvider;
use tuplegrid::backends::graph::GraphDatastoreProvider;
use tuplegrid::backends::map::MapDatastoreProvider;
use tuplegrid::config::DatastoreConfig;
use tuplegrid::dialect::facet::{self, supported_facets, FacetKind};
use tuplegrid::dialect::{
    BatchableGridDialect, DatastoreProvider, GridDialect, InvocationCollectingGridDialect,
    OperationsQueue, OptimisticLockingAwareGridDialect, TransactionId, TupleContext,
};
use tuplegrid::failure::operation::ExecuteBatch;
use tuplegrid::failure::JournalRegistry;
use tuplegrid::model::{EntityKey, Tuple};
use tuplegrid::options::OptionsContext;
use tuplegrid::{DatastoreContext, GridConfig, GridError, Value};

fn document_provider() -> DocumentDatastoreProvider {
    DocumentDatastoreProvider::start(DatastoreConfig::default()).expect("Failed to start")
}

fn key(id: &str) -> EntityKey {
    EntityKey::of("Shipment", ["id"], vec![Value::from(id)]).expect("valid key")
}

fn decorated(dialect: Arc<dyn GridDialect>) -> InvocationCollectingGridDialect<Arc<dyn GridDialect>> {
    InvocationCollectingGridDialect::new(dialect, Arc::new(JournalRegistry::new()))
}

#[test]
fn test_supported_facets_per_backend() {
    let map = MapDatastoreProvider::new().grid_dialect();
    let document = document_provider().grid_dialect();
    let graph = GraphDatastoreProvider::new().grid_dialect();

    assert_eq!(supported_facets(map.as_ref()), vec![FacetKind::OptimisticLockingAware]);
    assert_eq!(supported_facets(document.as_ref()), vec![FacetKind::Batchable]);
    assert!(supported_facets(graph.as_ref()).is_empty());
}

#[test]
fn test_decorator_exposes_the_inner_facets() {
    for dialect in [
        MapDatastoreProvider::new().grid_dialect(),
        document_provider().grid_dialect(),
        GraphDatastoreProvider::new().grid_dialect(),
    ] {
        let expected = supported_facets(dialect.as_ref());
        let wrapped = decorated(dialect);
        assert_eq!(supported_facets(&wrapped), expected);
    }
}

#[test]
fn test_context_dialect_is_decorated() {
    let ctx = DatastoreContext::from_provider(&document_provider(), GridConfig::default());
    assert_eq!(supported_facets(ctx.dialect.as_ref()), vec![FacetKind::Batchable]);

    let transaction = TransactionId::new();
    ctx.bridge().begin(transaction);

    let mut queue = OperationsQueue::new(Some(transaction));
    let mut tuple = Tuple::new();
    tuple.put("state", "INITIAL");
    queue.insert_or_update_tuple(key("s1"), tuple);
    facet::batchable(ctx.dialect.as_ref())
        .expect("batchable")
        .execute_batch(queue)
        .expect("execute batch");

    let operations = ctx.journals.operations(transaction);
    assert_eq!(operations.len(), 1);
    let batch = operations[0].as_variant::<ExecuteBatch>().expect("batch");
    assert_eq!(batch.operations().len(), 1);
}

#[test]
fn test_facet_queries_are_stable() {
    let document = document_provider().grid_dialect();
    let first = document.as_batchable().expect("batchable");
    let second = document.as_batchable().expect("batchable");
    assert!(std::ptr::addr_eq(first, second));

    let map = MapDatastoreProvider::new().grid_dialect();
    let first = map.as_optimistic_locking_aware().expect("locking aware");
    let second = map.as_optimistic_locking_aware().expect("locking aware");
    assert!(std::ptr::addr_eq(first, second));
    assert!(map.as_batchable().is_none());
}

#[test]
fn test_decorator_rejects_missing_facets() {
    let wrapped = decorated(GraphDatastoreProvider::new().grid_dialect());
    let ctx = TupleContext::new(OptionsContext::default());

    let err = wrapped
        .execute_batch(OperationsQueue::new(None))
        .expect_err("graph dialect does not batch");
    assert!(matches!(err, GridError::UnsupportedFacet("batchable")));

    let err = wrapped
        .remove_tuple_with_optimistic_lock(&key("s1"), &Tuple::new(), &ctx)
        .expect_err("graph dialect has no optimistic locking");
    assert!(matches!(err, GridError::UnsupportedFacet("optimistic-locking-aware")));
}

#[test]
fn test_provider_capabilities() {
    let map = MapDatastoreProvider::new();
    assert_eq!(map.default_query_parser_service(), None);
    assert!(!map.allows_transaction_emulation());
    map.execute_ddl_commands(&[]).expect("no-op DDL");

    assert_eq!(GraphDatastoreProvider::new().default_query_parser_service(), Some("cypher"));
    assert_eq!(
        document_provider().default_query_parser_service(),
        Some("document-native-query")
    );
}

#[test]
fn test_failed_optimistic_update_is_not_journaled() {
    let journals = Arc::new(JournalRegistry::new());
    let wrapped = InvocationCollectingGridDialect::new(
        MapDatastoreProvider::new().grid_dialect(),
        journals.clone(),
    );
    let transaction = TransactionId::new();
    journals.begin(transaction);
    let ctx = TupleContext::new(OptionsContext::default()).in_transaction(transaction);

    let mut tuple = Tuple::new();
    tuple.put("version", 0i64);
    wrapped.insert_or_update_tuple(&key("s1"), &tuple, &ctx).expect("insert");

    let mut stale = Tuple::new();
    stale.put("version", 7i64);
    let mut update = Tuple::new();
    update.put("version", 8i64);
    let applied = wrapped
        .update_tuple_with_optimistic_lock(&key("s1"), &stale, &update, &ctx)
        .expect("update call");

    assert!(!applied);
    assert_eq!(journals.operations(transaction).len(), 1);
}
