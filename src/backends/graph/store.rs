//! An in-process property graph.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Traversal direction relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    labels: BTreeSet<String>,
    properties: HashMap<String, Value>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }
}

#[derive(Debug, Clone)]
pub struct Relationship {
    id: RelationshipId,
    rel_type: String,
    start: NodeId,
    end: NodeId,
    properties: HashMap<String, Value>,
}

impl Relationship {
    pub fn id(&self) -> RelationshipId {
        self.id
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn start_node(&self) -> NodeId {
        self.start
    }

    pub fn end_node(&self) -> NodeId {
        self.end
    }

    /// The endpoint opposite `node`, or `None` if `node` is not an endpoint.
    pub fn other_node(&self, node: NodeId) -> Option<NodeId> {
        if node == self.start {
            Some(self.end)
        } else if node == self.end {
            Some(self.start)
        } else {
            None
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }
}

/// Nodes and typed, directed relationships with properties.
///
/// Relationships of a node are returned in creation order. Null values are
/// never stored: setting a property to null removes it.
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: HashMap<NodeId, Node>,
    relationships: HashMap<RelationshipId, Relationship>,
    outgoing: HashMap<NodeId, Vec<RelationshipId>>,
    incoming: HashMap<NodeId, Vec<RelationshipId>>,
    next_id: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn create_node<I, S>(&mut self, labels: I) -> NodeId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = NodeId(self.next_id());
        self.nodes.insert(
            id,
            Node {
                id,
                labels: labels.into_iter().map(Into::into).collect(),
                properties: HashMap::new(),
            },
        );
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Sets a node property; a null value removes it. Returns false for an unknown node.
    pub fn set_node_property(&mut self, id: NodeId, name: impl Into<String>, value: Value) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        let name = name.into();
        if value.is_null() {
            node.properties.remove(&name);
        } else {
            node.properties.insert(name, value);
        }
        true
    }

    pub fn remove_node_property(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.properties.remove(name);
        }
    }

    /// Creates a relationship. Returns `None` if either endpoint is unknown.
    pub fn create_relationship(
        &mut self,
        start: NodeId,
        end: NodeId,
        rel_type: impl Into<String>,
    ) -> Option<RelationshipId> {
        if !self.nodes.contains_key(&start) || !self.nodes.contains_key(&end) {
            return None;
        }
        let id = RelationshipId(self.next_id());
        self.relationships.insert(
            id,
            Relationship {
                id,
                rel_type: rel_type.into(),
                start,
                end,
                properties: HashMap::new(),
            },
        );
        self.outgoing.entry(start).or_default().push(id);
        self.incoming.entry(end).or_default().push(id);
        Some(id)
    }

    pub fn relationship(&self, id: RelationshipId) -> Option<&Relationship> {
        self.relationships.get(&id)
    }

    pub fn set_relationship_property(
        &mut self,
        id: RelationshipId,
        name: impl Into<String>,
        value: Value,
    ) -> bool {
        let Some(relationship) = self.relationships.get_mut(&id) else {
            return false;
        };
        let name = name.into();
        if value.is_null() {
            relationship.properties.remove(&name);
        } else {
            relationship.properties.insert(name, value);
        }
        true
    }

    /// Relationships of `node` in `direction`, optionally restricted to one type.
    pub fn relationships(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> Vec<&Relationship> {
        let outgoing = matches!(direction, Direction::Outgoing | Direction::Both)
            .then(|| self.outgoing.get(&node))
            .flatten();
        let incoming = matches!(direction, Direction::Incoming | Direction::Both)
            .then(|| self.incoming.get(&node))
            .flatten();

        let mut seen = BTreeSet::new();
        outgoing
            .into_iter()
            .chain(incoming)
            .flatten()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.relationships.get(id))
            .filter(|r| rel_type.map_or(true, |t| r.rel_type == t))
            .collect()
    }

    /// The first relationship of one type, in creation order.
    pub fn single_relationship(
        &self,
        node: NodeId,
        direction: Direction,
        rel_type: &str,
    ) -> Option<&Relationship> {
        self.relationships(node, direction, Some(rel_type))
            .into_iter()
            .next()
    }

    /// Finds the node with `label` whose properties match all of `properties`.
    pub fn find_node(&self, label: &str, properties: &[(&str, &Value)]) -> Option<NodeId> {
        let mut matches: Vec<&Node> = self
            .nodes
            .values()
            .filter(|node| node.has_label(label))
            .filter(|node| {
                properties
                    .iter()
                    .all(|(name, value)| node.property(name) == Some(*value))
            })
            .collect();
        matches.sort_by_key(|node| node.id);
        matches.first().map(|node| node.id)
    }

    pub fn delete_relationship(&mut self, id: RelationshipId) -> Option<Relationship> {
        let relationship = self.relationships.remove(&id)?;
        if let Some(ids) = self.outgoing.get_mut(&relationship.start) {
            ids.retain(|r| *r != id);
        }
        if let Some(ids) = self.incoming.get_mut(&relationship.end) {
            ids.retain(|r| *r != id);
        }
        Some(relationship)
    }

    /// Deletes a node together with all of its relationships.
    pub fn detach_delete_node(&mut self, id: NodeId) -> bool {
        let attached: Vec<RelationshipId> = self
            .relationships(id, Direction::Both, None)
            .iter()
            .map(|r| r.id)
            .collect();
        for relationship in attached {
            self.delete_relationship(relationship);
        }
        self.outgoing.remove(&id);
        self.incoming.remove(&id);
        self.nodes.remove(&id).is_some()
    }
}
