//! Backend-agnostic row views.
//!
//! A [`TupleSnapshot`] is the read-only column view each backend supplies;
//! a [`Tuple`] layers pending changes on top of one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::GridError;
use crate::value::Value;

static NULL: Value = Value::Null;

/// Read view over column name → value for one row.
///
/// Each backend implements this over its native structures. Column order
/// carries no meaning. A column that is absent is distinct from a column
/// holding [`Value::Null`] only if the backend itself distinguishes them.
pub trait TupleSnapshot: fmt::Debug + Send + Sync {
    /// Returns the value of `column`, if present.
    fn get(&self, column: &str) -> Option<&Value>;

    /// Returns true if no column is present.
    fn is_empty(&self) -> bool;

    /// Returns the names of all present columns.
    fn column_names(&self) -> Vec<&str>;
}

/// A snapshot backed by a plain map.
///
/// Used by backends whose native row is already a map, and as the
/// materialised form of other snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapTupleSnapshot {
    data: HashMap<String, Value>,
}

impl MapTupleSnapshot {
    /// Creates a new snapshot from a map of column names to values.
    pub fn new(data: HashMap<String, Value>) -> Self {
        Self { data }
    }

    /// Gets a column value, deserializing to the requested type.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is absent or does not deserialize.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let id: String = snapshot.get_as("id")?;
    /// let version: i64 = snapshot.get_as("version")?;
    /// ```
    pub fn get_as<T: DeserializeOwned>(&self, column: &str) -> Result<T, GridError> {
        let value = self
            .data
            .get(column)
            .ok_or_else(|| GridError::Backend(format!("column not found: {column}")))?;
        Ok(serde_json::from_value(value.to_json())?)
    }

    /// Like [`get_as`](Self::get_as), but absent and null columns yield `None`.
    pub fn get_opt<T: DeserializeOwned>(&self, column: &str) -> Result<Option<T>, GridError> {
        match self.data.get(column) {
            Some(v) if v.is_null() => Ok(None),
            Some(v) => Ok(Some(serde_json::from_value(v.to_json())?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Consumes the snapshot and returns the underlying map.
    pub fn into_inner(self) -> HashMap<String, Value> {
        self.data
    }

    /// Copies any snapshot into map form.
    pub fn copy_of(snapshot: &dyn TupleSnapshot) -> Self {
        let data = snapshot
            .column_names()
            .into_iter()
            .filter_map(|c| snapshot.get(c).map(|v| (c.to_string(), v.clone())))
            .collect();
        Self { data }
    }
}

impl TupleSnapshot for MapTupleSnapshot {
    fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn column_names(&self) -> Vec<&str> {
        self.data.keys().map(String::as_str).collect()
    }
}

impl From<HashMap<String, Value>> for MapTupleSnapshot {
    fn from(data: HashMap<String, Value>) -> Self {
        Self::new(data)
    }
}

impl<const N: usize> From<[(&str, Value); N]> for MapTupleSnapshot {
    fn from(entries: [(&str, Value); N]) -> Self {
        Self::new(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

/// A pending change to one column of a [`Tuple`].
#[derive(Debug, Clone, PartialEq)]
pub enum TupleOperation {
    Put { column: String, value: Value },
    PutNull { column: String },
    Remove { column: String },
}

impl TupleOperation {
    pub fn column(&self) -> &str {
        match self {
            TupleOperation::Put { column, .. }
            | TupleOperation::PutNull { column }
            | TupleOperation::Remove { column } => column,
        }
    }
}

/// A row: an optional backend snapshot plus pending column changes.
///
/// Reads see pending changes first. At most one pending change is kept per
/// column; a later change to the same column replaces the earlier one.
#[derive(Debug, Clone, Default)]
pub struct Tuple {
    snapshot: Option<Arc<dyn TupleSnapshot>>,
    operations: Vec<TupleOperation>,
}

impl Tuple {
    /// Creates a tuple with no backing snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: impl TupleSnapshot + 'static) -> Self {
        Self {
            snapshot: Some(Arc::new(snapshot)),
            operations: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Option<&dyn TupleSnapshot> {
        self.snapshot.as_deref()
    }

    /// Pending changes in first-touched column order.
    pub fn operations(&self) -> &[TupleOperation] {
        &self.operations
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        match self.operations.iter().find(|op| op.column() == column) {
            Some(TupleOperation::Put { value, .. }) => Some(value),
            Some(TupleOperation::PutNull { .. }) => Some(&NULL),
            Some(TupleOperation::Remove { .. }) => None,
            None => self.snapshot.as_ref().and_then(|s| s.get(column)),
        }
    }

    /// Sets a column; a null value is recorded as [`TupleOperation::PutNull`].
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        let operation = if value.is_null() {
            TupleOperation::PutNull { column }
        } else {
            TupleOperation::Put { column, value }
        };
        self.record(operation);
    }

    pub fn remove(&mut self, column: impl Into<String>) {
        self.record(TupleOperation::Remove {
            column: column.into(),
        });
    }

    fn record(&mut self, operation: TupleOperation) {
        match self
            .operations
            .iter_mut()
            .find(|op| op.column() == operation.column())
        {
            Some(existing) => *existing = operation,
            None => self.operations.push(operation),
        }
    }

    /// Current column names: snapshot columns not removed, plus columns put.
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .snapshot
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default()
            .into_iter()
            .filter(|c| !self.operations.iter().any(|op| op.column() == *c))
            .collect();
        names.extend(
            self.operations
                .iter()
                .filter(|op| !matches!(op, TupleOperation::Remove { .. }))
                .map(TupleOperation::column),
        );
        names
    }

    pub fn is_empty(&self) -> bool {
        self.column_names().is_empty()
    }

    /// Materialises the current state as a map.
    pub fn to_map(&self) -> HashMap<String, Value> {
        self.column_names()
            .into_iter()
            .filter_map(|c| self.get(c).map(|v| (c.to_string(), v.clone())))
            .collect()
    }
}

impl TupleSnapshot for Tuple {
    fn get(&self, column: &str) -> Option<&Value> {
        Tuple::get(self, column)
    }

    fn is_empty(&self) -> bool {
        Tuple::is_empty(self)
    }

    fn column_names(&self) -> Vec<&str> {
        Tuple::column_names(self)
    }
}

impl From<MapTupleSnapshot> for Tuple {
    fn from(snapshot: MapTupleSnapshot) -> Self {
        Tuple::from_snapshot(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_get_as() {
        let snapshot = MapTupleSnapshot::from([("name", Value::from("test")), ("count", Value::Int(42))]);

        let name: String = snapshot.get_as("name").unwrap();
        let count: i64 = snapshot.get_as("count").unwrap();
        assert_eq!(name, "test");
        assert_eq!(count, 42);
        assert!(snapshot.get_as::<String>("missing").is_err());
    }

    #[test]
    fn test_snapshot_get_opt_null() {
        let snapshot = MapTupleSnapshot::from([("name", Value::Null)]);
        let name: Option<String> = snapshot.get_opt("name").unwrap();
        assert_eq!(name, None);
        let missing: Option<String> = snapshot.get_opt("missing").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_snapshot_columns() {
        let snapshot = MapTupleSnapshot::from([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let mut columns = snapshot.column_names();
        columns.sort();
        assert_eq!(columns, vec!["a", "b"]);
        assert!(!TupleSnapshot::is_empty(&snapshot));
        assert!(TupleSnapshot::is_empty(&MapTupleSnapshot::default()));
    }

    #[test]
    fn test_tuple_changes_override_snapshot() {
        let mut tuple = Tuple::from(MapTupleSnapshot::from([
            ("id", Value::from("s1")),
            ("state", Value::from("INITIAL")),
            ("note", Value::from("x")),
        ]));
        tuple.put("state", "PROCESSING");
        tuple.remove("note");
        tuple.put("carrier", Value::Null);

        assert_eq!(tuple.get("state"), Some(&Value::from("PROCESSING")));
        assert_eq!(tuple.get("note"), None);
        assert_eq!(tuple.get("carrier"), Some(&Value::Null));
        assert_eq!(tuple.get("id"), Some(&Value::from("s1")));

        let mut names = tuple.column_names();
        names.sort();
        assert_eq!(names, vec!["carrier", "id", "state"]);
    }

    #[test]
    fn test_tuple_keeps_last_change_per_column() {
        let mut tuple = Tuple::new();
        tuple.put("state", "A");
        tuple.put("state", "B");
        assert_eq!(tuple.operations().len(), 1);
        assert_eq!(
            tuple.operations()[0],
            TupleOperation::Put {
                column: "state".into(),
                value: Value::from("B")
            }
        );
    }

    #[test]
    fn test_tuple_to_map() {
        let mut tuple = Tuple::new();
        tuple.put("id", "s1");
        let map = tuple.to_map();
        assert_eq!(map.get("id"), Some(&Value::from("s1")));
        assert_eq!(map.len(), 1);
    }
}
