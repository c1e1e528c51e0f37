//! Keys identifying rows and association row sets.
//!
//! Identity of every key type is `(table, column values)`. Column names are
//! excluded so that renaming metadata never breaks key equality, and an
//! association key's owning entity key is excluded so that an association is
//! indexed the same way from both navigation directions.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::GridError;
use crate::value::Value;

fn check_lengths(table: &str, names: usize, values: usize) -> Result<(), GridError> {
    if names != values {
        return Err(GridError::KeyConstruction {
            table: table.to_string(),
            names,
            values,
        });
    }
    Ok(())
}

fn write_columns(f: &mut fmt::Formatter<'_>, names: &[String], values: &[Value]) -> fmt::Result {
    f.write_str("[")?;
    for (i, (name, value)) in names.iter().zip(values).enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{name}={value}")?;
    }
    f.write_str("]")
}

fn position(names: &[String], column: &str) -> Option<usize> {
    names.iter().position(|name| name == column)
}

/// Static description of an entity's key: table and ordered key columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKeyMetadata {
    table: String,
    column_names: Vec<String>,
}

impl EntityKeyMetadata {
    pub fn new<I, S>(table: impl Into<String>, column_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            column_names: column_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Whether `column` is one of the key columns.
    pub fn is_key_column(&self, column: &str) -> bool {
        position(&self.column_names, column).is_some()
    }
}

/// Identifies one logical row.
#[derive(Debug, Clone)]
pub struct EntityKey {
    metadata: Arc<EntityKeyMetadata>,
    column_values: Vec<Value>,
}

impl EntityKey {
    /// Creates a key for the row of `metadata`'s table holding `column_values`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::KeyConstruction`] when the number of values does
    /// not match the number of key columns.
    pub fn new(
        metadata: impl Into<Arc<EntityKeyMetadata>>,
        column_values: Vec<Value>,
    ) -> Result<Self, GridError> {
        let metadata = metadata.into();
        check_lengths(
            metadata.table(),
            metadata.column_names().len(),
            column_values.len(),
        )?;
        Ok(Self {
            metadata,
            column_values,
        })
    }

    /// Shorthand building the metadata in place.
    pub fn of<I, S>(
        table: impl Into<String>,
        column_names: I,
        column_values: Vec<Value>,
    ) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(EntityKeyMetadata::new(table, column_names), column_values)
    }

    pub fn metadata(&self) -> &Arc<EntityKeyMetadata> {
        &self.metadata
    }

    pub fn table(&self) -> &str {
        self.metadata.table()
    }

    pub fn column_names(&self) -> &[String] {
        self.metadata.column_names()
    }

    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    /// Iterates `(column, value)` pairs in key column order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names()
            .iter()
            .map(String::as_str)
            .zip(self.column_values.iter())
    }

    /// Returns the value of a key column, if `column` is one.
    pub fn column_value(&self, column: &str) -> Option<&Value> {
        position(self.column_names(), column).map(|i| &self.column_values[i])
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        self.table() == other.table() && self.column_values == other.column_values
    }
}

impl Eq for EntityKey {}

impl Hash for EntityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table().hash(state);
        self.column_values.hash(state);
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({}) ", self.table())?;
        write_columns(f, self.column_names(), &self.column_values)
    }
}

/// Identifies the set of rows belonging to one association instance.
///
/// For a many-to-many association stored in `AccountOwner_BankAccount`, the
/// key holds `[owners_id]` while each row is identified by a [`RowKey`] over
/// `[owners_id, bankAccounts_id]`.
#[derive(Debug, Clone)]
pub struct AssociationKey {
    table: String,
    column_names: Vec<String>,
    column_values: Vec<Value>,
    entity_key: EntityKey,
}

impl AssociationKey {
    /// # Errors
    ///
    /// Returns [`GridError::KeyConstruction`] when names and values differ in length.
    pub fn new<I, S>(
        table: impl Into<String>,
        column_names: I,
        column_values: Vec<Value>,
        entity_key: EntityKey,
    ) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = table.into();
        let column_names: Vec<String> = column_names.into_iter().map(Into::into).collect();
        check_lengths(&table, column_names.len(), column_values.len())?;
        Ok(Self {
            table,
            column_names,
            column_values,
            entity_key,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    /// The key of the entity owning this association.
    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }

    /// Returns the value of the given key column.
    ///
    /// Check membership with
    /// [`AssociationKeyMetadata::is_key_column`](crate::model::AssociationKeyMetadata::is_key_column)
    /// first; asking for any other column is a mapping bug.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::KeyColumnLookup`] if `column` is not part of this key.
    pub fn column_value(&self, column: &str) -> Result<&Value, GridError> {
        position(&self.column_names, column)
            .map(|i| &self.column_values[i])
            .ok_or_else(|| GridError::KeyColumnLookup {
                column: column.to_string(),
                key: self.to_string(),
            })
    }
}

impl PartialEq for AssociationKey {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.column_values == other.column_values
    }
}

impl Eq for AssociationKey {}

impl Hash for AssociationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.column_values.hash(state);
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssociationKey({}) ", self.table)?;
        write_columns(f, &self.column_names, &self.column_values)
    }
}

/// Identifies one row within an association.
#[derive(Debug, Clone)]
pub struct RowKey {
    column_names: Vec<String>,
    column_values: Vec<Value>,
}

impl RowKey {
    /// # Errors
    ///
    /// Returns [`GridError::KeyConstruction`] when names and values differ in length.
    pub fn new<I, S>(column_names: I, column_values: Vec<Value>) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let column_names: Vec<String> = column_names.into_iter().map(Into::into).collect();
        check_lengths("<row>", column_names.len(), column_values.len())?;
        Ok(Self {
            column_names,
            column_values,
        })
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    pub fn column_value(&self, column: &str) -> Option<&Value> {
        position(&self.column_names, column).map(|i| &self.column_values[i])
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.column_values == other.column_values
    }
}

impl Eq for RowKey {}

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.column_values.hash(state);
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowKey ")?;
        write_columns(f, &self.column_names, &self.column_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn order_key(id: &str) -> EntityKey {
        EntityKey::of("Order", ["id"], vec![Value::from(id)]).unwrap()
    }

    #[test]
    fn test_entity_key_length_mismatch() {
        let result = EntityKey::of("Order", ["id", "tenant"], vec![Value::from("o1")]);
        assert!(matches!(
            result,
            Err(GridError::KeyConstruction { names: 2, values: 1, .. })
        ));
    }

    #[test]
    fn test_entity_key_identity_ignores_column_names() {
        let a = EntityKey::of("Order", ["id"], vec![Value::from("o1")]).unwrap();
        let b = EntityKey::of("Order", ["order_id"], vec![Value::from("o1")]).unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, order_key("o2"));
    }

    #[test]
    fn test_association_key_length_mismatch() {
        let result = AssociationKey::new(
            "Order_LineItem",
            ["order_id"],
            vec![Value::from("o1"), Value::from("o2")],
            order_key("o1"),
        );
        assert!(matches!(result, Err(GridError::KeyConstruction { .. })));
    }

    #[test]
    fn test_association_key_identity() {
        let a = AssociationKey::new(
            "Order_LineItem",
            ["order_id"],
            vec![Value::from("o1")],
            order_key("o1"),
        )
        .unwrap();
        let b = AssociationKey::new(
            "Order_LineItem",
            ["items_order"],
            vec![Value::from("o1")],
            order_key("other"),
        )
        .unwrap();
        let c = AssociationKey::new(
            "Other_Table",
            ["order_id"],
            vec![Value::from("o1")],
            order_key("o1"),
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, c);
    }

    #[test]
    fn test_association_key_column_value() {
        let key = AssociationKey::new(
            "Order_LineItem",
            ["order_id", "tenant"],
            vec![Value::from("o1"), Value::Int(7)],
            order_key("o1"),
        )
        .unwrap();
        assert_eq!(key.column_value("order_id").unwrap(), &Value::from("o1"));
        assert_eq!(key.column_value("tenant").unwrap(), &Value::Int(7));

        let err = key.column_value("missing").unwrap_err();
        assert!(matches!(err, GridError::KeyColumnLookup { ref column, .. } if column == "missing"));
    }

    #[test]
    fn test_display() {
        let key = order_key("o1");
        assert_eq!(key.to_string(), "EntityKey(Order) [id=o1]");
    }

    #[test]
    fn test_row_key_identity() {
        let a = RowKey::new(["order_id", "idx"], vec![Value::from("o1"), Value::Int(0)]).unwrap();
        let b = RowKey::new(["o", "i"], vec![Value::from("o1"), Value::Int(0)]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.column_value("idx"), Some(&Value::Int(0)));
        assert!(RowKey::new(["a"], vec![]).is_err());
    }
}
