//! Static, backend-independent association metadata.

use std::sync::Arc;

use crate::error::GridError;
use crate::model::key::{AssociationKey, EntityKey, EntityKeyMetadata};
use crate::value::Value;

/// The shape of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    OneToOne,
    OneToMany,
    ManyToMany,
    /// A collection of embeddable values or basic types.
    EmbeddedCollection,
}

/// Describes the entity at the other end of an association and how its key
/// columns are projected into association rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedEntityKeyMetadata {
    association_key_columns: Vec<String>,
    entity_key_metadata: EntityKeyMetadata,
}

impl AssociatedEntityKeyMetadata {
    /// `association_key_columns[i]` corresponds to the `i`-th key column of
    /// `entity_key_metadata`.
    pub fn new<I, S>(association_key_columns: I, entity_key_metadata: EntityKeyMetadata) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            association_key_columns: association_key_columns.into_iter().map(Into::into).collect(),
            entity_key_metadata,
        }
    }

    /// Association row columns holding the target entity's key.
    pub fn association_key_columns(&self) -> &[String] {
        &self.association_key_columns
    }

    pub fn entity_key_metadata(&self) -> &EntityKeyMetadata {
        &self.entity_key_metadata
    }

    /// Maps an association column to the target entity column it mirrors.
    pub fn corresponding_entity_key_column(&self, association_column: &str) -> Option<&str> {
        self.association_key_columns
            .iter()
            .position(|c| c == association_column)
            .and_then(|i| self.entity_key_metadata.column_names().get(i))
            .map(String::as_str)
    }

    /// Builds the target entity key from an association row.
    ///
    /// Returns `Ok(None)` when any key column is missing from the row.
    pub fn entity_key_from_row<F>(&self, mut column: F) -> Result<Option<EntityKey>, GridError>
    where
        F: FnMut(&str) -> Option<Value>,
    {
        let mut values = Vec::with_capacity(self.association_key_columns.len());
        for association_column in &self.association_key_columns {
            match column(association_column) {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }
        EntityKey::new(self.entity_key_metadata.clone(), values).map(Some)
    }
}

/// Shape of one association: key and row-key columns, kind, target mapping
/// and the embedded collection role.
///
/// Created once while building mapping metadata and shared by every access
/// to the association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationKeyMetadata {
    table: String,
    column_names: Vec<String>,
    row_key_column_names: Vec<String>,
    row_key_index_columns: Vec<String>,
    associated_entity_key_metadata: AssociatedEntityKeyMetadata,
    collection_role: String,
    kind: AssociationKind,
    inverse: bool,
}

impl AssociationKeyMetadata {
    pub fn builder() -> AssociationKeyMetadataBuilder {
        AssociationKeyMetadataBuilder::default()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns of the association key (the owner side "foreign key").
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Columns identifying one row of the association.
    pub fn row_key_column_names(&self) -> &[String] {
        &self.row_key_column_names
    }

    /// Ordering columns of indexed collections (lists, maps).
    pub fn row_key_index_columns(&self) -> &[String] {
        &self.row_key_index_columns
    }

    pub fn associated_entity_key_metadata(&self) -> &AssociatedEntityKeyMetadata {
        &self.associated_entity_key_metadata
    }

    /// Embedded path under which the association is nested, e.g.
    /// `addresses` or `details.addresses`.
    pub fn collection_role(&self) -> &str {
        &self.collection_role
    }

    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// Whether this metadata describes the inverse side of a bi-directional association.
    pub fn is_inverse(&self) -> bool {
        self.inverse
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    pub fn is_embedded_collection(&self) -> bool {
        self.kind == AssociationKind::EmbeddedCollection
    }

    /// Builds the key of this association for the given owner.
    ///
    /// The owner's key values populate the association key columns in order.
    pub fn key_for(&self, owner: EntityKey) -> Result<AssociationKey, GridError> {
        let values = owner.column_values().to_vec();
        AssociationKey::new(&self.table, self.column_names.iter().cloned(), values, owner)
    }
}

#[derive(Debug, Default)]
pub struct AssociationKeyMetadataBuilder {
    table: Option<String>,
    column_names: Vec<String>,
    row_key_column_names: Vec<String>,
    row_key_index_columns: Vec<String>,
    associated_entity_key_metadata: Option<AssociatedEntityKeyMetadata>,
    collection_role: Option<String>,
    kind: Option<AssociationKind>,
    inverse: bool,
}

impl AssociationKeyMetadataBuilder {
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn row_key_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.row_key_column_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn row_key_index_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.row_key_index_columns = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn associated_entity_key_metadata(mut self, metadata: AssociatedEntityKeyMetadata) -> Self {
        self.associated_entity_key_metadata = Some(metadata);
        self
    }

    pub fn collection_role(mut self, role: impl Into<String>) -> Self {
        self.collection_role = Some(role.into());
        self
    }

    pub fn kind(mut self, kind: AssociationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }

    /// Finishes the metadata.
    ///
    /// # Errors
    ///
    /// Fails when the table, associated entity metadata or kind is missing.
    pub fn build(self) -> Result<Arc<AssociationKeyMetadata>, GridError> {
        let table = self
            .table
            .ok_or_else(|| GridError::InvalidMetadata("association metadata requires a table".into()))?;
        let associated_entity_key_metadata = self.associated_entity_key_metadata.ok_or_else(|| {
            GridError::InvalidMetadata(format!(
                "association metadata for {table} requires associated entity key metadata"
            ))
        })?;
        let kind = self.kind.ok_or_else(|| {
            GridError::InvalidMetadata(format!("association metadata for {table} requires a kind"))
        })?;
        let collection_role = self.collection_role.unwrap_or_else(|| table.clone());

        Ok(Arc::new(AssociationKeyMetadata {
            table,
            column_names: self.column_names,
            row_key_column_names: self.row_key_column_names,
            row_key_index_columns: self.row_key_index_columns,
            associated_entity_key_metadata,
            collection_role,
            kind,
            inverse: self.inverse,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_items() -> Arc<AssociationKeyMetadata> {
        AssociationKeyMetadata::builder()
            .table("Order_LineItem")
            .column_names(["order_id"])
            .row_key_column_names(["order_id", "order", "items_sku"])
            .row_key_index_columns(["order"])
            .associated_entity_key_metadata(AssociatedEntityKeyMetadata::new(
                ["items_sku"],
                EntityKeyMetadata::new("LineItem", ["sku"]),
            ))
            .collection_role("items")
            .kind(AssociationKind::OneToMany)
            .build()
            .unwrap()
    }

    #[test]
    fn test_corresponding_column() {
        let metadata = line_items();
        let target = metadata.associated_entity_key_metadata();
        assert_eq!(target.corresponding_entity_key_column("items_sku"), Some("sku"));
        assert_eq!(target.corresponding_entity_key_column("order_id"), None);
    }

    #[test]
    fn test_is_key_column() {
        let metadata = line_items();
        assert!(metadata.is_key_column("order_id"));
        assert!(!metadata.is_key_column("items_sku"));
        assert!(!metadata.is_embedded_collection());
    }

    #[test]
    fn test_key_for_owner() {
        let metadata = line_items();
        let owner = EntityKey::of("Order", ["id"], vec![Value::from("o1")]).unwrap();
        let key = metadata.key_for(owner.clone()).unwrap();
        assert_eq!(key.table(), "Order_LineItem");
        assert_eq!(key.column_value("order_id").unwrap(), &Value::from("o1"));
        assert_eq!(key.entity_key(), &owner);
    }

    #[test]
    fn test_entity_key_from_row() {
        let metadata = line_items();
        let target = metadata.associated_entity_key_metadata();
        let key = target
            .entity_key_from_row(|c| (c == "items_sku").then(|| Value::from("X1")))
            .unwrap()
            .unwrap();
        assert_eq!(key.table(), "LineItem");
        assert!(target.entity_key_from_row(|_| None).unwrap().is_none());
    }

    #[test]
    fn test_builder_requires_kind() {
        let result = AssociationKeyMetadata::builder()
            .table("T")
            .associated_entity_key_metadata(AssociatedEntityKeyMetadata::new(
                Vec::<String>::new(),
                EntityKeyMetadata::new("E", Vec::<String>::new()),
            ))
            .build();
        assert!(result.is_err());
    }
}
