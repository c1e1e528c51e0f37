//! Key-value backend over in-process maps.
//!
//! Entities and associations live in two maps keyed by [`EntityKey`] and
//! [`AssociationKey`]. The store has no uniqueness enforcement of its own,
//! so hosts look keys up before inserting. Updates can be guarded by the
//! version column for optimistic locking.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::dialect::{
    AssociationContext, DatastoreProvider, DuplicateInsertPreventionStrategy, GridDialect,
    OptimisticLockingAwareGridDialect, TupleContext,
};
use crate::error::GridError;
use crate::model::{
    Association, AssociationKey, EntityKey, EntityKeyMetadata, MapTupleSnapshot, RowKey, Tuple,
};
use crate::options::names;
use crate::value::Value;

/// Version column used when no option names one.
pub const DEFAULT_VERSION_COLUMN: &str = "version";

type Row = HashMap<String, Value>;

fn poisoned<T>(_: PoisonError<T>) -> GridError {
    GridError::Backend("map datastore lock poisoned".to_string())
}

/// The shared maps behind every [`MapDialect`] of one datastore.
#[derive(Debug, Default)]
pub struct MapDatastore {
    entities: RwLock<HashMap<EntityKey, Row>>,
    associations: RwLock<HashMap<AssociationKey, HashMap<RowKey, Row>>>,
}

impl MapDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_count(&self) -> Result<usize, GridError> {
        Ok(self.entities.read().map_err(poisoned)?.len())
    }

    /// Raw stored columns of one entity.
    pub fn entity(&self, key: &EntityKey) -> Result<Option<Row>, GridError> {
        Ok(self.entities.read().map_err(poisoned)?.get(key).cloned())
    }
}

/// Stored row for `tuple`, with the key columns always present.
fn to_row(key: &EntityKey, tuple: &Tuple) -> Row {
    let mut row = tuple.to_map();
    for (column, value) in key.columns() {
        row.insert(column.to_string(), value.clone());
    }
    row
}

pub struct MapDialect {
    store: Arc<MapDatastore>,
}

impl MapDialect {
    pub fn new(store: Arc<MapDatastore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MapDatastore> {
        &self.store
    }

    fn version_column(context: &TupleContext) -> Result<String, GridError> {
        context
            .options()
            .get_or(names::VERSION_COLUMN, DEFAULT_VERSION_COLUMN.to_string())
    }
}

impl GridDialect for MapDialect {
    fn get_tuple(
        &self,
        key: &EntityKey,
        _context: &TupleContext,
    ) -> Result<Option<Tuple>, GridError> {
        Ok(self
            .store
            .entity(key)?
            .map(|row| Tuple::from_snapshot(MapTupleSnapshot::new(row))))
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
        tracing::trace!(%key, "Writing tuple");
        self.store
            .entities
            .write()
            .map_err(poisoned)?
            .insert(key.clone(), to_row(key, tuple));
        Ok(())
    }

    fn remove_tuple(&self, key: &EntityKey, _context: &TupleContext) -> Result<(), GridError> {
        self.store.entities.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<Option<Association>, GridError> {
        let associations = self.store.associations.read().map_err(poisoned)?;
        Ok(associations.get(key).map(|rows| {
            Association::from_rows(rows.iter().map(|(row_key, row)| {
                (
                    row_key.clone(),
                    Tuple::from_snapshot(MapTupleSnapshot::new(row.clone())),
                )
            }))
        }))
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
        _context: &AssociationContext,
    ) -> Result<(), GridError> {
        let rows = association
            .rows()
            .into_iter()
            .map(|(row_key, row)| (row_key.clone(), row.to_map()))
            .collect();
        self.store
            .associations
            .write()
            .map_err(poisoned)?
            .insert(key.clone(), rows);
        Ok(())
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        _context: &AssociationContext,
    ) -> Result<(), GridError> {
        self.store
            .associations
            .write()
            .map_err(poisoned)?
            .remove(key);
        Ok(())
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        _metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        DuplicateInsertPreventionStrategy::LookUp
    }

    fn as_optimistic_locking_aware(&self) -> Option<&dyn OptimisticLockingAwareGridDialect> {
        Some(self)
    }
}

impl OptimisticLockingAwareGridDialect for MapDialect {
    fn update_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        tuple: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, GridError> {
        let column = Self::version_column(context)?;
        let mut entities = self.store.entities.write().map_err(poisoned)?;
        let matches = entities
            .get(key)
            .is_some_and(|current| current.get(&column) == old_lock_state.get(&column));
        if !matches {
            tracing::debug!(%key, %column, "Optimistic lock check failed on update");
            return Ok(false);
        }
        entities.insert(key.clone(), to_row(key, tuple));
        Ok(true)
    }

    fn remove_tuple_with_optimistic_lock(
        &self,
        key: &EntityKey,
        old_lock_state: &Tuple,
        context: &TupleContext,
    ) -> Result<bool, GridError> {
        let column = Self::version_column(context)?;
        let mut entities = self.store.entities.write().map_err(poisoned)?;
        let matches = entities
            .get(key)
            .is_some_and(|current| current.get(&column) == old_lock_state.get(&column));
        if !matches {
            tracing::debug!(%key, %column, "Optimistic lock check failed on remove");
            return Ok(false);
        }
        entities.remove(key);
        Ok(true)
    }
}

/// Starts a [`MapDatastore`] and hands out dialects over it.
#[derive(Debug, Default, Clone)]
pub struct MapDatastoreProvider {
    store: Arc<MapDatastore>,
}

impl MapDatastoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &Arc<MapDatastore> {
        &self.store
    }
}

impl DatastoreProvider for MapDatastoreProvider {
    type DdlCommand = ();

    fn grid_dialect(&self) -> Arc<dyn GridDialect> {
        Arc::new(MapDialect::new(self.store.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionsContext;

    fn key(id: &str) -> EntityKey {
        EntityKey::of("Shipment", ["id"], vec![Value::from(id)]).unwrap()
    }

    fn dialect() -> MapDialect {
        MapDialect::new(Arc::new(MapDatastore::new()))
    }

    fn stored(dialect: &MapDialect, id: &str, version: i64) -> Tuple {
        let ctx = TupleContext::default();
        let mut tuple = dialect.create_tuple(&key(id), &ctx).unwrap();
        tuple.put("state", "INITIAL");
        tuple.put("version", version);
        dialect.insert_or_update_tuple(&key(id), &tuple, &ctx).unwrap();
        dialect.get_tuple(&key(id), &ctx).unwrap().unwrap()
    }

    #[test]
    fn test_tuple_round_trip_includes_key_columns() {
        let dialect = dialect();
        let tuple = stored(&dialect, "s1", 0);

        assert_eq!(tuple.get("id"), Some(&Value::from("s1")));
        assert_eq!(tuple.get("state"), Some(&Value::from("INITIAL")));
        assert_eq!(
            dialect.duplicate_insert_prevention_strategy(key("s1").metadata()),
            DuplicateInsertPreventionStrategy::LookUp
        );
    }

    #[test]
    fn test_optimistic_update_checks_version() {
        let dialect = dialect();
        let ctx = TupleContext::default();
        let old = stored(&dialect, "s1", 0);

        let mut first = old.clone();
        first.put("version", 1);
        assert!(dialect
            .update_tuple_with_optimistic_lock(&key("s1"), &old, &first, &ctx)
            .unwrap());

        let mut stale = old.clone();
        stale.put("state", "LOST");
        assert!(!dialect
            .update_tuple_with_optimistic_lock(&key("s1"), &old, &stale, &ctx)
            .unwrap());
        assert_eq!(
            dialect.store().entity(&key("s1")).unwrap().unwrap().get("version"),
            Some(&Value::Int(1))
        );
    }

    #[test]
    fn test_version_column_from_options() {
        let dialect = dialect();
        let ctx = TupleContext::new(
            OptionsContext::default()
                .with_option(names::VERSION_COLUMN, "rev")
                .unwrap(),
        );
        let mut tuple = Tuple::new();
        tuple.put("rev", 3);
        dialect.insert_or_update_tuple(&key("s1"), &tuple, &ctx).unwrap();

        let mut old = Tuple::new();
        old.put("rev", 2);
        assert!(!dialect
            .remove_tuple_with_optimistic_lock(&key("s1"), &old, &ctx)
            .unwrap());

        old.put("rev", 3);
        assert!(dialect
            .remove_tuple_with_optimistic_lock(&key("s1"), &old, &ctx)
            .unwrap());
        assert_eq!(dialect.store().entity_count().unwrap(), 0);
    }
}
