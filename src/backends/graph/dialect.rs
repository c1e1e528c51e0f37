//! Dialect mapping tuples and associations onto a property graph.
//!
//! - An entity is a node labeled with its table, holding every column
//!   (dotted columns included) as a property.
//! - An association row between entities is a relationship from the owner
//!   to the target, typed with the role on the main side. Index columns
//!   are relationship properties. The inverse side of a bi-directional
//!   association reads the same relationships in the incoming direction
//!   and never writes them.
//! - An embedded collection element is a node labeled [`EMBEDDED_LABEL`]
//!   and its table, reached from the owner through one relationship per
//!   segment of the collection role. Dotted element columns add one hop
//!   per nested segment.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backends::graph::snapshot::GraphAssociationSnapshot;
use crate::backends::graph::store::{Direction, GraphStore, NodeId, RelationshipId};
use crate::dialect::{
    AssociationContext, DatastoreProvider, DuplicateInsertPreventionStrategy, GridDialect,
    TupleContext,
};
use crate::error::GridError;
use crate::model::{
    embedded, Association, AssociationKey, AssociationKeyMetadata, EntityKey, EntityKeyMetadata,
    MapTupleSnapshot, RowKey, Tuple, TupleOperation, TupleSnapshot,
};
use crate::value::Value;

/// Label of nodes holding embedded values.
pub const EMBEDDED_LABEL: &str = "EMBEDDED";

/// A uniqueness constraint on one property of one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub label: String,
    pub property: String,
}

impl UniqueConstraint {
    pub fn new(label: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            property: property.into(),
        }
    }
}

fn poisoned<T>(_: PoisonError<T>) -> GridError {
    GridError::Backend("graph store lock poisoned".to_string())
}

/// A graph shared by every dialect of one datastore, with its schema.
#[derive(Debug, Default)]
pub struct GraphDatastore {
    graph: RwLock<GraphStore>,
    constraints: RwLock<Vec<UniqueConstraint>>,
}

impl GraphDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, GraphStore>, GridError> {
        self.graph.read().map_err(poisoned)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, GraphStore>, GridError> {
        self.graph.write().map_err(poisoned)
    }

    pub fn add_constraint(&self, constraint: UniqueConstraint) -> Result<(), GridError> {
        let mut constraints = self.constraints.write().map_err(poisoned)?;
        if !constraints.contains(&constraint) {
            tracing::debug!(label = %constraint.label, property = %constraint.property, "Added unique constraint");
            constraints.push(constraint);
        }
        Ok(())
    }

    fn constraints_for(&self, label: &str) -> Result<Vec<UniqueConstraint>, GridError> {
        let constraints = self.constraints.read().map_err(poisoned)?;
        Ok(constraints
            .iter()
            .filter(|c| c.label == label)
            .cloned()
            .collect())
    }
}

fn entity_node(graph: &GraphStore, key: &EntityKey) -> Option<NodeId> {
    let properties: Vec<(&str, &Value)> = key.columns().collect();
    graph.find_node(key.table(), &properties)
}

/// Columns stored on the relationship: row-key columns that belong to
/// neither the owner nor the target side.
fn is_index_column(metadata: &AssociationKeyMetadata, column: &str) -> bool {
    !metadata.is_key_column(column)
        && !metadata
            .associated_entity_key_metadata()
            .association_key_columns()
            .iter()
            .any(|c| c == column)
}

/// Follows, or creates, one outgoing hop typed `segment`.
fn child_node(graph: &mut GraphStore, parent: NodeId, segment: &str) -> Option<NodeId> {
    if let Some(existing) = graph.single_relationship(parent, Direction::Outgoing, segment) {
        return Some(existing.end_node());
    }
    let child = graph.create_node([EMBEDDED_LABEL]);
    graph.create_relationship(parent, child, segment)?;
    Some(child)
}

/// Deletes an embedded node and every embedded node reachable from it.
fn delete_embedded_subtree(graph: &mut GraphStore, root: NodeId) {
    let mut pending = vec![root];
    while let Some(node) = pending.pop() {
        pending.extend(
            graph
                .relationships(node, Direction::Outgoing, None)
                .iter()
                .map(|r| r.end_node())
                .filter(|n| {
                    graph
                        .node(*n)
                        .is_some_and(|node| node.has_label(EMBEDDED_LABEL))
                }),
        );
        graph.detach_delete_node(node);
    }
}

pub struct GraphDialect {
    datastore: Arc<GraphDatastore>,
}

impl GraphDialect {
    pub fn new(datastore: Arc<GraphDatastore>) -> Self {
        Self { datastore }
    }

    pub fn datastore(&self) -> &Arc<GraphDatastore> {
        &self.datastore
    }

    fn check_constraints(
        &self,
        graph: &GraphStore,
        key: &EntityKey,
        node: Option<NodeId>,
        tuple: &Tuple,
    ) -> Result<(), GridError> {
        for constraint in self.datastore.constraints_for(key.table())? {
            let Some(value) = tuple.get(&constraint.property).filter(|v| !v.is_null()) else {
                continue;
            };
            let existing = graph.find_node(key.table(), &[(constraint.property.as_str(), value)]);
            if existing.is_some() && existing != node {
                return Err(GridError::DuplicateKey(format!(
                    "{key}: {}.{} = {value}",
                    constraint.label, constraint.property
                )));
            }
        }
        Ok(())
    }

    /// Relationships holding the rows of one association, starting at its owner.
    fn association_relationships(
        graph: &GraphStore,
        owner: NodeId,
        context: &AssociationContext,
    ) -> Vec<RelationshipId> {
        let metadata = context.metadata();
        if metadata.is_embedded_collection() {
            let segments = embedded::split(metadata.collection_role());
            let Some((leaf, parents)) = segments.split_last() else {
                return Vec::new();
            };
            let mut parent = owner;
            for segment in parents {
                match graph.single_relationship(parent, Direction::Outgoing, segment) {
                    Some(hop) => parent = hop.end_node(),
                    None => return Vec::new(),
                }
            }
            return graph
                .relationships(parent, Direction::Outgoing, Some(*leaf))
                .iter()
                .map(|r| r.id())
                .collect();
        }

        let direction = if metadata.is_inverse() {
            Direction::Incoming
        } else {
            Direction::Outgoing
        };
        graph
            .relationships(owner, direction, Some(context.type_context().role_on_main_side()))
            .iter()
            .map(|r| r.id())
            .collect()
    }

    fn clear_association(graph: &mut GraphStore, owner: NodeId, context: &AssociationContext) {
        let embedded = context.metadata().is_embedded_collection();
        for id in Self::association_relationships(graph, owner, context) {
            if let Some(relationship) = graph.delete_relationship(id) {
                if embedded {
                    delete_embedded_subtree(graph, relationship.end_node());
                }
            }
        }
    }

    fn create_entity_row(
        graph: &mut GraphStore,
        owner: NodeId,
        row: &Tuple,
        context: &AssociationContext,
    ) -> Result<(), GridError> {
        let metadata = context.metadata();
        let target_key = metadata
            .associated_entity_key_metadata()
            .entity_key_from_row(|column| row.get(column).cloned())?
            .ok_or_else(|| {
                GridError::Backend(format!(
                    "row of {} does not reference its target entity",
                    metadata.table()
                ))
            })?;
        let target = entity_node(graph, &target_key)
            .ok_or_else(|| GridError::TupleNotFound(target_key.to_string()))?;

        let relationship = graph
            .create_relationship(owner, target, context.type_context().role_on_main_side())
            .ok_or_else(|| GridError::Backend("relationship endpoint vanished".to_string()))?;
        Self::set_index_columns(graph, relationship, row, metadata);
        Ok(())
    }

    fn create_embedded_row(
        graph: &mut GraphStore,
        owner: NodeId,
        row: &Tuple,
        metadata: &AssociationKeyMetadata,
    ) -> Result<(), GridError> {
        let role = metadata.collection_role();
        let segments = embedded::split(role);
        let Some((leaf, parents)) = segments.split_last() else {
            return Ok(());
        };

        let mut parent = owner;
        for segment in parents {
            parent = child_node(graph, parent, segment)
                .ok_or_else(|| GridError::Backend(format!("cannot create embedded node {segment}")))?;
        }
        let element = graph.create_node([EMBEDDED_LABEL, metadata.table()]);
        let relationship = graph
            .create_relationship(parent, element, *leaf)
            .ok_or_else(|| GridError::Backend("relationship endpoint vanished".to_string()))?;
        Self::set_index_columns(graph, relationship, row, metadata);

        let associated = metadata.associated_entity_key_metadata();
        for association_column in associated.association_key_columns() {
            let (Some(target_column), Some(value)) = (
                associated.corresponding_entity_key_column(association_column),
                row.get(association_column),
            ) else {
                continue;
            };
            if !embedded::is_part_of_embedded(target_column) {
                graph.set_node_property(element, target_column, value.clone());
            } else if target_column == role {
                graph.set_node_property(element, embedded::leaf(target_column), value.clone());
            } else {
                let path = embedded::strip_prefix(target_column, role);
                let path_segments = embedded::split(path);
                let Some((property, hops)) = path_segments.split_last() else {
                    continue;
                };
                let mut node = element;
                for hop in hops {
                    node = child_node(graph, node, hop)
                        .ok_or_else(|| GridError::Backend(format!("cannot create embedded node {hop}")))?;
                }
                graph.set_node_property(node, *property, value.clone());
            }
        }
        Ok(())
    }

    fn set_index_columns(
        graph: &mut GraphStore,
        relationship: RelationshipId,
        row: &Tuple,
        metadata: &AssociationKeyMetadata,
    ) {
        for column in metadata.row_key_column_names() {
            if !is_index_column(metadata, column) {
                continue;
            }
            if let Some(value) = row.get(column) {
                graph.set_relationship_property(relationship, column.clone(), value.clone());
            }
        }
    }
}

impl GridDialect for GraphDialect {
    fn get_tuple(
        &self,
        key: &EntityKey,
        _context: &TupleContext,
    ) -> Result<Option<Tuple>, GridError> {
        let graph = self.datastore.read()?;
        Ok(entity_node(&graph, key)
            .and_then(|id| graph.node(id))
            .map(|node| Tuple::from_snapshot(MapTupleSnapshot::new(node.properties().clone()))))
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
        let mut graph = self.datastore.write()?;
        let existing = entity_node(&graph, key);

        if tuple.snapshot().is_none() && existing.is_some() {
            return Err(GridError::DuplicateKey(key.to_string()));
        }
        self.check_constraints(&graph, key, existing, tuple)?;

        let Some(node) = existing else {
            tracing::trace!(%key, "Creating entity node");
            let node = graph.create_node([key.table()]);
            for (column, value) in key.columns() {
                graph.set_node_property(node, column, value.clone());
            }
            for (column, value) in tuple.to_map() {
                graph.set_node_property(node, column, value);
            }
            return Ok(());
        };

        for operation in tuple.operations() {
            match operation {
                TupleOperation::Put { column, value } => {
                    graph.set_node_property(node, column.clone(), value.clone());
                }
                TupleOperation::PutNull { column } | TupleOperation::Remove { column } => {
                    graph.remove_node_property(node, column);
                }
            }
        }
        Ok(())
    }

    fn remove_tuple(&self, key: &EntityKey, _context: &TupleContext) -> Result<(), GridError> {
        let mut graph = self.datastore.write()?;
        if let Some(node) = entity_node(&graph, key) {
            let embedded: Vec<NodeId> = graph
                .relationships(node, Direction::Outgoing, None)
                .iter()
                .map(|r| r.end_node())
                .filter(|n| graph.node(*n).is_some_and(|n| n.has_label(EMBEDDED_LABEL)))
                .collect();
            for child in embedded {
                delete_embedded_subtree(&mut graph, child);
            }
            graph.detach_delete_node(node);
        }
        Ok(())
    }

    fn get_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<Option<Association>, GridError> {
        let graph = self.datastore.read()?;
        let Some(owner) = entity_node(&graph, key.entity_key()) else {
            return Ok(None);
        };
        let metadata = context.metadata();

        let mut rows = Vec::new();
        for id in Self::association_relationships(&graph, owner, context) {
            let Some(relationship) = graph.relationship(id) else {
                continue;
            };
            let snapshot = GraphAssociationSnapshot::new(&graph, relationship, key, metadata);
            let values = metadata
                .row_key_column_names()
                .iter()
                .map(|column| snapshot.get(column).cloned().unwrap_or(Value::Null))
                .collect();
            let row_key = RowKey::new(metadata.row_key_column_names().iter(), values)?;
            rows.push((row_key, Tuple::from_snapshot(snapshot)));
        }
        Ok(Some(Association::from_rows(rows)))
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
        let metadata = context.metadata();
        if metadata.is_inverse() {
            tracing::trace!(%key, "Inverse side, relationships are written by the main side");
            return Ok(());
        }

        let mut graph = self.datastore.write()?;
        let owner = entity_node(&graph, key.entity_key())
            .ok_or_else(|| GridError::TupleNotFound(key.entity_key().to_string()))?;

        Self::clear_association(&mut graph, owner, context);
        for row in association.rows().into_values() {
            if metadata.is_embedded_collection() {
                Self::create_embedded_row(&mut graph, owner, row, metadata)?;
            } else {
                Self::create_entity_row(&mut graph, owner, row, context)?;
            }
        }
        Ok(())
    }

    fn remove_association(
        &self,
        key: &AssociationKey,
        context: &AssociationContext,
    ) -> Result<(), GridError> {
        if context.metadata().is_inverse() {
            return Ok(());
        }
        let mut graph = self.datastore.write()?;
        if let Some(owner) = entity_node(&graph, key.entity_key()) {
            Self::clear_association(&mut graph, owner, context);
        }
        Ok(())
    }

    fn duplicate_insert_prevention_strategy(
        &self,
        _metadata: &EntityKeyMetadata,
    ) -> DuplicateInsertPreventionStrategy {
        DuplicateInsertPreventionStrategy::NativeOnInsert
    }
}

/// Starts a [`GraphDatastore`] and applies its schema.
#[derive(Debug, Default, Clone)]
pub struct GraphDatastoreProvider {
    datastore: Arc<GraphDatastore>,
}

impl GraphDatastoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datastore(&self) -> &Arc<GraphDatastore> {
        &self.datastore
    }
}

impl DatastoreProvider for GraphDatastoreProvider {
    type DdlCommand = UniqueConstraint;

    fn grid_dialect(&self) -> Arc<dyn GridDialect> {
        Arc::new(GraphDialect::new(self.datastore.clone()))
    }

    fn default_query_parser_service(&self) -> Option<&'static str> {
        Some("cypher")
    }

    fn execute_ddl_commands(&self, commands: &[UniqueConstraint]) -> Result<(), GridError> {
        for constraint in commands {
            self.datastore.add_constraint(constraint.clone())?;
        }
        Ok(())
    }
}
