//! Document backend over in-process JSON collections.
//!
//! Each entity is one document in the collection named after its table.
//! The entity key becomes the document `_id`: the bare value for
//! single-column keys, an object of columns otherwise. Dotted columns are
//! stored as nested sub-documents. Association rows are stored according
//! to [`AssociationStorage`]:
//!
//! | Storage | Location of the rows |
//! |---------|----------------------|
//! | `in_entity` | `_associations.<role>` of the owning document |
//! | `global_collection` | One document per association in the configured collection |
//! | `collection_per_association` | One document per association in `associations_<table>` |
//!
//! Inserting an existing `_id` fails, and queued writes apply in bulk.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value as JsonValue};

use crate::config::{AssociationStorage, ConfigError, DatastoreConfig};
use crate::dialect::{
    AssociationContext, AssociationTypeContext, BatchableGridDialect, DatastoreProvider,
    DuplicateInsertPreventionStrategy, GridDialect, OperationsQueue, TupleContext,
};
use crate::error::GridError;
use crate::failure::GridDialectOperation;
use crate::model::{
    embedded, Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata,
    MapTupleSnapshot, RowKey, Tuple, TupleOperation,
};
use crate::options::names;
use crate::value::Value;

const ID_FIELD: &str = "_id";
const ASSOCIATIONS_FIELD: &str = "_associations";
const ROWS_FIELD: &str = "rows";
const TABLE_FIELD: &str = "table";

pub type Document = Map<String, JsonValue>;

type Collection = BTreeMap<String, Document>;

fn poisoned<T>(_: PoisonError<T>) -> GridError {
    GridError::Backend("document store lock poisoned".to_string())
}

/// Named collections of documents.
#[derive(Debug, Default)]
pub struct DocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a document by its `_id`.
    pub fn find(&self, collection: &str, id: &JsonValue) -> Result<Option<Document>, GridError> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(&id.to_string()))
            .cloned())
    }

    pub fn count(&self, collection: &str) -> Result<usize, GridError> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections.get(collection).map_or(0, BTreeMap::len))
    }

    pub fn collection_names(&self) -> Result<Vec<String>, GridError> {
        let collections = self.collections.read().map_err(poisoned)?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

fn document_id(key: &EntityKey) -> JsonValue {
    match key.column_values() {
        [single] => single.to_json(),
        _ => JsonValue::Object(
            key.columns()
                .map(|(column, value)| (column.to_string(), value.to_json()))
                .collect(),
        ),
    }
}

/// Sets a possibly dotted column, creating intermediate sub-documents.
fn set_path(document: &mut Document, column: &str, value: JsonValue) {
    let segments = embedded::split(column);
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };
    let mut current = document;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
        if !entry.is_object() {
            *entry = JsonValue::Object(Map::new());
        }
        let JsonValue::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(leaf.to_string(), value);
}

fn remove_path(document: &mut Document, column: &str) {
    let segments = embedded::split(column);
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };
    let mut current = document;
    for segment in parents {
        match current.get_mut(*segment) {
            Some(JsonValue::Object(next)) => current = next,
            _ => return,
        }
    }
    current.remove(*leaf);
}

/// Flattens nested sub-documents back into dotted columns.
fn flatten(document: &Document, prefix: &str, out: &mut HashMap<String, Value>) {
    for (field, value) in document {
        let column = if prefix.is_empty() {
            field.clone()
        } else {
            format!("{prefix}{}{field}", embedded::SEPARATOR)
        };
        match value {
            JsonValue::Object(nested) => flatten(nested, &column, out),
            other => {
                out.insert(column, Value::from_json(other));
            }
        }
    }
}

fn entity_document(key: &EntityKey, tuple: &Tuple) -> Document {
    let mut document = Document::new();
    document.insert(ID_FIELD.to_string(), document_id(key));
    for (column, value) in tuple.to_map() {
        if !key.metadata().is_key_column(&column) {
            set_path(&mut document, &column, value.to_json());
        }
    }
    document
}

fn apply_operations(document: &mut Document, key: &EntityKey, tuple: &Tuple) {
    for operation in tuple.operations() {
        if key.metadata().is_key_column(operation.column()) {
            continue;
        }
        match operation {
            TupleOperation::Put { column, value } => set_path(document, column, value.to_json()),
            TupleOperation::PutNull { column } => set_path(document, column, JsonValue::Null),
            TupleOperation::Remove { column } => remove_path(document, column),
        }
    }
}

fn entity_tuple(key: &EntityKey, document: &Document) -> Tuple {
    let mut columns = HashMap::new();
    let fields: Document = document
        .iter()
        .filter(|(field, _)| *field != ID_FIELD && *field != ASSOCIATIONS_FIELD)
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    flatten(&fields, "", &mut columns);
    for (column, value) in key.columns() {
        columns.insert(column.to_string(), value.clone());
    }
    Tuple::from_snapshot(MapTupleSnapshot::new(columns))
}

fn row_document(row: &Tuple) -> JsonValue {
    JsonValue::Object(
        row.to_map()
            .into_iter()
            .map(|(column, value)| (column, value.to_json()))
            .collect(),
    )
}

fn row_from_document(
    metadata: &AssociationKeyMetadata,
    row: &JsonValue,
) -> Result<(RowKey, Tuple), GridError> {
    let columns: HashMap<String, Value> = match row {
        JsonValue::Object(fields) => fields
            .iter()
            .map(|(column, value)| (column.clone(), Value::from_json(value)))
            .collect(),
        other => {
            return Err(GridError::Backend(format!(
                "association row is not a document: {other}"
            )))
        }
    };
    let values = metadata
        .row_key_column_names()
        .iter()
        .map(|column| columns.get(column).cloned().unwrap_or(Value::Null))
        .collect();
    let row_key = RowKey::new(metadata.row_key_column_names().iter(), values)?;
    Ok((row_key, Tuple::from_snapshot(MapTupleSnapshot::new(columns))))
}

fn association_rows(
    metadata: &AssociationKeyMetadata,
    rows: &JsonValue,
) -> Result<Association, GridError> {
    let JsonValue::Array(rows) = rows else {
        return Err(GridError::Backend(format!(
            "association rows of {} are not an array",
            metadata.table()
        )));
    };
    let rows = rows
        .iter()
        .map(|row| row_from_document(metadata, row))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Association::from_rows(rows))
}

/// Where the rows of one association live.
enum RowLocation {
    /// Inside the owning entity's document.
    Entity { collection: String, id: JsonValue },
    /// In a dedicated association document.
    Document { collection: String, id: JsonValue },
}

pub struct DocumentDialect {
    store: Arc<DocumentStore>,
    config: DatastoreConfig,
}

impl DocumentDialect {
    pub fn new(store: Arc<DocumentStore>, config: DatastoreConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Storage for one association: a per-association option wins over configuration.
    fn association_storage(&self, context: &AssociationTypeContext) -> AssociationStorage {
        match context
            .options()
            .get::<AssociationStorage>(names::ASSOCIATION_STORAGE)
        {
            Ok(Some(storage)) => storage,
            Ok(None) => self.config.association_storage,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid association storage option");
                self.config.association_storage
            }
        }
    }

    fn row_location(&self, key: &AssociationKey, context: &AssociationContext) -> RowLocation {
        let association_id = || {
            JsonValue::Object(
                key.column_names()
                    .iter()
                    .zip(key.column_values())
                    .map(|(column, value)| (column.clone(), value.to_json()))
                    .collect(),
            )
        };
        match self.association_storage(context.type_context()) {
            AssociationStorage::InEntity => RowLocation::Entity {
                collection: key.entity_key().table().to_string(),
                id: document_id(key.entity_key()),
            },
            AssociationStorage::GlobalCollection => {
                let mut id = association_id();
                if let JsonValue::Object(fields) = &mut id {
                    fields.insert(TABLE_FIELD.to_string(), JsonValue::from(key.table()));
                }
                RowLocation::Document {
                    collection: self.config.association_collection.clone(),
                    id,
                }
            }
            AssociationStorage::CollectionPerAssociation => RowLocation::Document {
                collection: format!("associations_{}", key.table()),
                id: association_id(),
            },
        }
    }

    fn role_path(context: &AssociationContext) -> String {
        format!(
            "{ASSOCIATIONS_FIELD}{}{}",
            embedded::SEPARATOR,
            context.metadata().collection_role()
        )
    }

    fn write_rows(
        &self,
        key: &AssociationKey,
        rows: Option<JsonValue>,
        context: &AssociationContext,
    ) -> Result<(), GridError> {
        let mut collections = self.store.collections.write().map_err(poisoned)?;
        match self.row_location(key, context) {
            RowLocation::Entity { collection, id } => {
                let document = collections
                    .get_mut(&collection)
                    .and_then(|documents| documents.get_mut(&id.to_string()));
                match (document, rows) {
                    (Some(document), Some(rows)) => {
                        set_path(document, &Self::role_path(context), rows)
                    }
                    (Some(document), None) => remove_path(document, &Self::role_path(context)),
                    (None, Some(_)) => {
                        return Err(GridError::TupleNotFound(key.entity_key().to_string()));
                    }
                    (None, None) => {
                        tracing::trace!(%key, "Owner document is gone, nothing to remove");
                    }
                }
            }
            RowLocation::Document { collection, id } => {
                let documents = collections.entry(collection).or_default();
                match rows {
                    Some(rows) => {
                        let mut document = Document::new();
                        document.insert(ID_FIELD.to_string(), id.clone());
                        document.insert(ROWS_FIELD.to_string(), rows);
                        documents.insert(id.to_string(), document);
                    }
                    None => {
                        documents.remove(&id.to_string());
                    }
                }
            }
        }
        Ok(())
    }
}

impl GridDialect for DocumentDialect {
    fn get_tuple(
        &self,
        key: &EntityKey,
        _context: &TupleContext,
    ) -> Result<Option<Tuple>, GridError> {
        Ok(self
            .store
            .find(key.table(), &document_id(key))?
            .map(|document| entity_tuple(key, &document)))
    }

    fn create_tuple(&self, _key: &EntityKey, _context: &TupleContext) -> Result<Tuple, GridError> {
        Ok(Tuple::new())
    }

    fn insert_or_update_tuple(
        &self,
        key: &EntityKey,
        tuple: &Tuple,
        _context: &TupleContext,
    ) -> Result<(), GridError> {
        let id = document_id(key).to_string();
        let mut collections = self.store.collections.write().map_err(poisoned)?;
        let documents = collections.entry(key.table().to_string()).or_default();

        if tuple.snapshot().is_none() {
            if documents.contains_key(&id) {
                return Err(GridError::DuplicateKey(key.to_string()));
            }
            tracing::trace!(%key, "Inserting document");
            documents.insert(id, entity_document(key, tuple));
            return Ok(());
        }

        match documents.get_mut(&id) {
            Some(document) => apply_operations(document, key, tuple),
            None => {
                documents.insert(id, entity_document(key, tuple));
            }
        }
        Ok(())
    }

    fn remove_tuple(&self, key: &EntityKey, _context: &TupleContext) -> Result<(), GridError> {
        let mut collections = self.store.collections.write().map_err(poisoned)?;
        if let Some(documents) = collections.get_mut(key.table()) {
            documents.remove(&document_id(key).to_string());
        }
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>, GridError> {
        let metadata = context.metadata();
        let rows = match self.row_location(key, context) {
            RowLocation::Entity { collection, id } => {
                let Some(document) = self.store.find(&collection, &id)? else {
                    return Ok(None);
                };
                let mut current = document.get(ASSOCIATIONS_FIELD);
                for segment in embedded::split(metadata.collection_role()) {
                    current = current.and_then(|v| v.get(segment));
                }
                current.cloned()
            }
            RowLocation::Document { collection, id } => self
                .store
                .find(&collection, &id)?
                .and_then(|mut document| document.remove(ROWS_FIELD)),
        };
        rows.map(|rows| association_rows(metadata, &rows)).transpose()
    }

    fn create_association(
        &self,
        _key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<Association, GridError> {
        Ok(Association::new())
    }

    fn insert_or_update_association(
        &self,
        key: &AssociationKey,
        association: &Association,
        context: &AssociationContext,
    ) -> Result<(), GridError> {
        let rows = JsonValue::Array(association.rows().into_values().map(row_document).collect());
        self.write_rows(key, Some(rows), context)
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<(), GridError> {
        self.write_rows(key, None, context)
    }

    fn is_stored_in_entity_structure(
        &self,
        _metadata: &AssociationKeyMetadata,
        context: &AssociationTypeContext,
    ) -> bool {
        self.association_storage(context) == AssociationStorage::InEntity
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        _metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        DuplicateInsertPreventionStrategy::NativeOnInsert
    }

    fn as_batchable(&self) -> Option<&dyn BatchableGridDialect> {
        Some(self)
    }
}

impl BatchableGridDialect for DocumentDialect {
    fn execute_batch(&self, queue: OperationsQueue) -> Result<(), GridError> {
        tracing::debug!(operations = queue.len(), "Executing document batch");
        let tuple_context = TupleContext::default();
        for operation in queue {
            match &operation {
                GridDialectOperation::InsertOrUpdateTuple(op) => {
                    self.insert_or_update_tuple(op.entity_key(), op.tuple(), &tuple_context)?
                }
                GridDialectOperation::RemoveTuple(op) => {
                    self.remove_tuple(op.entity_key(), &tuple_context)?
                }
                GridDialectOperation::InsertOrUpdateAssociation(op) => self
                    .insert_or_update_association(
                        op.association_key(),
                        op.association(),
                        op.context(),
                    )?,
                GridDialectOperation::RemoveAssociation(op) => {
                    self.remove_association(op.association_key(), op.context())?
                }
                other => {
                    return Err(GridError::Backend(format!("{other} cannot be batched")));
                }
            }
        }
        Ok(())
    }
}

/// Starts a [`DocumentStore`] with connection settings from configuration.
#[derive(Debug, Clone)]
pub struct DocumentDatastoreProvider {
    store: Arc<DocumentStore>,
    config: DatastoreConfig,
}

impl DocumentDatastoreProvider {
    /// Default port reported when none is configured.
    pub const DEFAULT_PORT: u16 = 27017;

    /// # Errors
    ///
    /// Returns a configuration error for a negative timeout.
    pub fn start(config: DatastoreConfig) -> Result<Self, GridError> {
        if config.timeout_ms < 0 {
            return Err(GridError::Config(ConfigError::from(figment::Error::from(
                format!(
                    "datastore.timeout_ms must not be negative, got {}",
                    config.timeout_ms
                ),
            ))));
        }
        tracing::info!(
            host = %config.host,
            port = config.port_or(Self::DEFAULT_PORT),
            timeout_ms = config.timeout_ms,
            storage = ?config.association_storage,
            "Started document datastore"
        );
        Ok(Self {
            store: Arc::new(DocumentStore::new()),
            config,
        })
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }
}

impl DatastoreProvider for DocumentDatastoreProvider {
    type DdlCommand = ();

    fn grid_dialect(&self) -> Arc<dyn GridDialect> {
        Arc::new(DocumentDialect::new(
            self.store.clone(),
            self.config.clone(),
        ))
    }

    fn default_query_parser_service(&self) -> Option<&'static str> {
        Some("document-native-query")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssociatedEntityKeyMetadata, AssociationKind};
    use crate::options::OptionsContext;
    use serde_json::json;

    fn key(id: &str) -> EntityKey {
        EntityKey::of("Order", ["id"], vec![Value::from(id)]).unwrap()
    }

    fn dialect(storage: AssociationStorage) -> DocumentDialect {
        let config = DatastoreConfig {
            association_storage: storage,
            ..DatastoreConfig::default()
        };
        DocumentDialect::new(Arc::new(DocumentStore::new()), config)
    }

    fn items_context() -> AssociationContext {
        let metadata = AssociationKeyMetadata::builder()
            .table("Order_LineItem")
            .column_names(["order_id"])
            .row_key_column_names(["order_id", "item_id"])
            .associated_entity_key_metadata(AssociatedEntityKeyMetadata::new(
                ["item_id"],
                EntityKeyMetadata::new("LineItem", ["id"]),
            ))
            .collection_role("items")
            .kind(AssociationKind::OneToMany)
            .build()
            .unwrap();
        AssociationContext::new(AssociationTypeContext::new(
            OptionsContext::default(),
            metadata,
            "items",
        ))
    }

    fn items(order: &str) -> (AssociationKey, Association) {
        let context = items_context();
        let association_key = context.metadata().key_for(key(order)).unwrap();
        let mut association = Association::new();
        for item in ["i1", "i2"] {
            let mut row = Tuple::new();
            row.put("order_id", order);
            row.put("item_id", item);
            let row_key = RowKey::new(
                ["order_id", "item_id"],
                vec![Value::from(order), Value::from(item)],
            )
            .unwrap();
            association.put(row_key, row);
        }
        (association_key, association)
    }

    #[test]
    fn test_nested_columns_round_trip() {
        let dialect = dialect(AssociationStorage::GlobalCollection);
        let ctx = TupleContext::default();
        let mut tuple = Tuple::new();
        tuple.put("status", "OPEN");
        tuple.put("address.city", "Lyon");
        dialect.insert_or_update_tuple(&key("o1"), &tuple, &ctx).unwrap();

        let document = dialect.store().find("Order", &json!("o1")).unwrap().unwrap();
        assert_eq!(document.get("address"), Some(&json!({ "city": "Lyon" })));

        let read = dialect.get_tuple(&key("o1"), &ctx).unwrap().unwrap();
        assert_eq!(read.get("address.city"), Some(&Value::from("Lyon")));
        assert_eq!(read.get("id"), Some(&Value::from("o1")));
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let dialect = dialect(AssociationStorage::GlobalCollection);
        let ctx = TupleContext::default();
        dialect.insert_or_update_tuple(&key("o1"), &Tuple::new(), &ctx).unwrap();

        let err = dialect
            .insert_or_update_tuple(&key("o1"), &Tuple::new(), &ctx)
            .unwrap_err();
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn test_update_applies_changes() {
        let dialect = dialect(AssociationStorage::GlobalCollection);
        let ctx = TupleContext::default();
        let mut tuple = Tuple::new();
        tuple.put("status", "OPEN");
        tuple.put("note", "x");
        dialect.insert_or_update_tuple(&key("o1"), &tuple, &ctx).unwrap();

        let mut read = dialect.get_tuple(&key("o1"), &ctx).unwrap().unwrap();
        read.put("status", "SHIPPED");
        read.remove("note");
        dialect.insert_or_update_tuple(&key("o1"), &read, &ctx).unwrap();

        let read = dialect.get_tuple(&key("o1"), &ctx).unwrap().unwrap();
        assert_eq!(read.get("status"), Some(&Value::from("SHIPPED")));
        assert_eq!(read.get("note"), None);
    }

    #[test]
    fn test_association_in_entity() {
        let dialect = dialect(AssociationStorage::InEntity);
        let context = items_context();
        let (association_key, association) = items("o1");
        dialect
            .insert_or_update_tuple(&key("o1"), &Tuple::new(), &TupleContext::default())
            .unwrap();
        dialect
            .insert_or_update_association(&association_key, &association, &context)
            .unwrap();

        assert!(dialect.is_stored_in_entity_structure(context.metadata(), context.type_context()));
        let read = dialect.get_association(&association_key, &context).unwrap().unwrap();
        assert_eq!(read.len(), 2);

        let owner = dialect
            .get_tuple(&key("o1"), &TupleContext::default())
            .unwrap()
            .unwrap();
        assert_eq!(owner.get("items"), None);
    }

    #[test]
    fn test_association_in_entity_requires_owner() {
        let dialect = dialect(AssociationStorage::InEntity);
        let context = items_context();
        let (association_key, association) = items("o1");
        let ctx = TupleContext::default();
        dialect.insert_or_update_tuple(&key("o1"), &Tuple::new(), &ctx).unwrap();
        dialect
            .insert_or_update_association(&association_key, &association, &context)
            .unwrap();

        // removing the rows of a deleted owner leaves no document behind
        dialect.remove_tuple(&key("o1"), &ctx).unwrap();
        dialect.remove_association(&association_key, &context).unwrap();
        assert!(dialect.get_tuple(&key("o1"), &ctx).unwrap().is_none());
        dialect.insert_or_update_tuple(&key("o1"), &Tuple::new(), &ctx).unwrap();
        dialect.remove_tuple(&key("o1"), &ctx).unwrap();

        let err = dialect
            .insert_or_update_association(&association_key, &association, &context)
            .unwrap_err();
        assert!(matches!(err, GridError::TupleNotFound(_)));
        assert!(dialect.get_tuple(&key("o1"), &ctx).unwrap().is_none());
    }

    #[test]
    fn test_association_collections() {
        let dialect = dialect(AssociationStorage::GlobalCollection);
        let context = items_context();
        let (association_key, association) = items("o1");
        dialect
            .insert_or_update_association(&association_key, &association, &context)
            .unwrap();
        assert_eq!(dialect.store().count("Associations").unwrap(), 1);

        let per_association = AssociationContext::new(AssociationTypeContext::new(
            OptionsContext::default()
                .with_option(names::ASSOCIATION_STORAGE, "collection_per_association")
                .unwrap(),
            Arc::new(context.metadata().clone()),
            "items",
        ));
        dialect
            .insert_or_update_association(&association_key, &association, &per_association)
            .unwrap();
        assert_eq!(dialect.store().count("associations_Order_LineItem").unwrap(), 1);

        dialect.remove_association(&association_key, &context).unwrap();
        assert!(dialect.get_association(&association_key, &context).unwrap().is_none());
        assert!(dialect
            .get_association(&association_key, &per_association)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_batch_stops_at_duplicate() {
        let dialect = dialect(AssociationStorage::GlobalCollection);
        let mut queue = OperationsQueue::new(None);
        queue.insert_or_update_tuple(key("o1"), Tuple::new());
        queue.insert_or_update_tuple(key("o1"), Tuple::new());
        queue.insert_or_update_tuple(key("o2"), Tuple::new());

        assert!(dialect.execute_batch(queue).unwrap_err().is_duplicate_key());
        assert_eq!(dialect.store().count("Order").unwrap(), 1);
    }

    #[test]
    fn test_provider_rejects_negative_timeout() {
        let config = DatastoreConfig {
            timeout_ms: -1,
            ..DatastoreConfig::default()
        };
        assert!(matches!(
            DocumentDatastoreProvider::start(config),
            Err(GridError::Config(_))
        ));
    }
}
