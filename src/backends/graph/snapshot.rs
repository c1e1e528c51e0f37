//! Reconstructs association rows from graph relationships.
//!
//! A graph has no foreign-key rows. One row of an association is rebuilt
//! from three places:
//!
//! - the relationship's own properties (row-key index columns)
//! - the target node, possibly several hops deep for embedded values
//! - the owner node (the association's key columns)
//!
//! Missing properties and missing embedded hops leave the column absent.

use std::collections::HashMap;

use crate::backends::graph::store::{Direction, GraphStore, Node, NodeId, Relationship};
use crate::model::{embedded, AssociationKey, AssociationKeyMetadata, TupleSnapshot};
use crate::value::Value;

/// One association row read off a relationship.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphAssociationSnapshot {
    properties: HashMap<String, Value>,
}

impl GraphAssociationSnapshot {
    pub fn new(
        graph: &GraphStore,
        relationship: &Relationship,
        key: &AssociationKey,
        metadata: &AssociationKeyMetadata,
    ) -> Self {
        let mut properties = HashMap::new();

        let owner = find_owner_node(graph, relationship, key, metadata);
        let target = find_target_node(relationship, metadata, owner).and_then(|id| graph.node(id));

        for column in metadata.row_key_column_names() {
            if let Some(value) = relationship.property(column) {
                properties.insert(column.clone(), value.clone());
            }
        }

        if let Some(target) = target {
            let associated = metadata.associated_entity_key_metadata();
            for association_column in associated.association_key_columns() {
                let Some(target_column) = associated.corresponding_entity_key_column(association_column)
                else {
                    continue;
                };
                if let Some(value) = target_value(graph, target, target_column, metadata.collection_role()) {
                    properties.insert(association_column.clone(), value.clone());
                }
            }
        }

        if let Some(owner) = owner.and_then(|id| graph.node(id)) {
            let entity_columns = key.entity_key().column_names();
            for (column, entity_column) in key.column_names().iter().zip(entity_columns) {
                if let Some(value) = owner.property(entity_column) {
                    properties.insert(column.clone(), value.clone());
                }
            }
        }

        Self { properties }
    }
}

impl TupleSnapshot for GraphAssociationSnapshot {
    fn get(&self, column: &str) -> Option<&Value> {
        self.properties.get(column)
    }

    fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    fn column_names(&self) -> Vec<&str> {
        self.properties.keys().map(String::as_str).collect()
    }
}

/// Reads a target-side column, following embedded hops when the column is dotted.
fn target_value<'g>(
    graph: &'g GraphStore,
    target: &'g Node,
    column: &str,
    collection_role: &str,
) -> Option<&'g Value> {
    if !embedded::is_part_of_embedded(column) {
        return target.property(column);
    }
    if column == collection_role {
        // Scalar element of an embedded collection.
        return target.property(embedded::leaf(column));
    }
    if let Some(value) = target.property(column) {
        // Embedded id stored flat.
        return Some(value);
    }

    let path = embedded::strip_prefix(column, collection_role);
    let segments = embedded::split(path);
    let (leaf, hops) = segments.split_last()?;
    let mut node = target;
    for hop in hops {
        let next = graph.single_relationship(node.id(), Direction::Outgoing, hop)?;
        node = graph.node(next.end_node())?;
    }
    node.property(leaf)
}

fn find_owner_node(
    graph: &GraphStore,
    relationship: &Relationship,
    key: &AssociationKey,
    metadata: &AssociationKeyMetadata,
) -> Option<NodeId> {
    if metadata.is_embedded_collection() {
        embedded_association_owner(graph, relationship, metadata.collection_role())
    } else {
        Some(owner_node_from_association(graph, relationship, key))
    }
}

fn find_target_node(
    relationship: &Relationship,
    metadata: &AssociationKeyMetadata,
    owner: Option<NodeId>,
) -> Option<NodeId> {
    if metadata.is_embedded_collection() {
        Some(relationship.end_node())
    } else {
        owner.and_then(|owner| relationship.other_node(owner))
    }
}

/// Walks incoming relationships from the relationship's start node, one
/// role segment at a time from the innermost parent outwards.
///
/// The walk ends when the segments are exhausted. A missing hop means the
/// owner is not found.
fn embedded_association_owner(
    graph: &GraphStore,
    relationship: &Relationship,
    collection_role: &str,
) -> Option<NodeId> {
    let segments = embedded::split(collection_role);
    let parents = segments.split_last().map_or(&[][..], |(_, parents)| parents);

    let mut owner = relationship.start_node();
    for segment in parents.iter().rev() {
        let incoming = graph.single_relationship(owner, Direction::Incoming, segment)?;
        owner = incoming.start_node();
    }
    Some(owner)
}

/// Picks the owning endpoint of a non-embedded relationship.
///
/// An endpoint owns the relationship when it carries the owning table's
/// label and the owning key values. Otherwise the first endpoint carrying
/// the label wins, and the start node is preferred when both or neither
/// qualify, so a self-referencing relationship keeps its direction.
fn owner_node_from_association(
    graph: &GraphStore,
    relationship: &Relationship,
    key: &AssociationKey,
) -> NodeId {
    let entity_key = key.entity_key();
    let has_label = |id: NodeId| graph.node(id).is_some_and(|n| n.has_label(entity_key.table()));
    let is_owner = |id: NodeId| {
        graph.node(id).is_some_and(|node| {
            node.has_label(entity_key.table())
                && entity_key
                    .columns()
                    .all(|(column, value)| node.property(column) == Some(value))
        })
    };

    let start = relationship.start_node();
    let end = relationship.end_node();
    if is_owner(start) {
        start
    } else if is_owner(end) {
        end
    } else if has_label(start) || !has_label(end) {
        start
    } else {
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssociatedEntityKeyMetadata, AssociationKind, EntityKey, EntityKeyMetadata};

    #[test]
    fn test_owner_walk_stops_at_missing_segment() {
        let mut graph = GraphStore::new();
        let parent = graph.create_node(["EMBEDDED"]);
        let element = graph.create_node(["EMBEDDED"]);
        let rel = graph.create_relationship(parent, element, "addresses").unwrap();
        let rel = graph.relationship(rel).unwrap();

        assert_eq!(embedded_association_owner(&graph, rel, "addresses"), Some(parent));
        assert_eq!(embedded_association_owner(&graph, rel, "details.addresses"), None);
    }

    #[test]
    fn test_self_reference_keeps_owner_by_key() {
        let mut graph = GraphStore::new();
        let alice = graph.create_node(["Person"]);
        graph.set_node_property(alice, "id", Value::from("alice"));
        let bob = graph.create_node(["Person"]);
        graph.set_node_property(bob, "id", Value::from("bob"));
        let rel = graph.create_relationship(bob, alice, "mentor").unwrap();
        let rel = graph.relationship(rel).unwrap();

        let metadata = AssociationKeyMetadata::builder()
            .table("Person_mentor")
            .column_names(["person_id"])
            .row_key_column_names(["person_id", "mentor_id"])
            .associated_entity_key_metadata(AssociatedEntityKeyMetadata::new(
                ["mentor_id"],
                EntityKeyMetadata::new("Person", ["id"]),
            ))
            .kind(AssociationKind::ManyToMany)
            .build()
            .unwrap();
        let owner = EntityKey::of("Person", ["id"], vec![Value::from("alice")]).unwrap();
        let key = metadata.key_for(owner).unwrap();

        assert_eq!(owner_node_from_association(&graph, rel, &key), alice);

        let snapshot = GraphAssociationSnapshot::new(&graph, rel, &key, &metadata);
        assert_eq!(snapshot.get("person_id"), Some(&Value::from("alice")));
        assert_eq!(snapshot.get("mentor_id"), Some(&Value::from("bob")));
    }
}
