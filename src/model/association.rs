//! The rows of one association instance.

use std::collections::HashMap;

use crate::model::key::RowKey;
use crate::model::tuple::Tuple;

/// A pending change to an [`Association`].
#[derive(Debug, Clone)]
pub enum AssociationOperation {
    Put { key: RowKey, row: Tuple },
    Remove { key: RowKey },
    Clear,
}

/// Rows of one association keyed by [`RowKey`], with pending changes.
///
/// The loaded rows are never mutated; reads replay pending changes over them.
#[derive(Debug, Clone, Default)]
pub struct Association {
    loaded: HashMap<RowKey, Tuple>,
    operations: Vec<AssociationOperation>,
}

impl Association {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an association over rows read from a backend.
    pub fn from_rows(rows: impl IntoIterator<Item = (RowKey, Tuple)>) -> Self {
        Self {
            loaded: rows.into_iter().collect(),
            operations: Vec::new(),
        }
    }

    pub fn put(&mut self, key: RowKey, row: Tuple) {
        self.operations.push(AssociationOperation::Put { key, row });
    }

    pub fn remove(&mut self, key: RowKey) {
        self.operations.push(AssociationOperation::Remove { key });
    }

    pub fn clear(&mut self) {
        self.operations.push(AssociationOperation::Clear);
    }

    pub fn operations(&self) -> &[AssociationOperation] {
        &self.operations
    }

    /// Whether pending changes start with a clear, i.e. the stored rows must
    /// be dropped before the remaining changes are applied.
    pub fn is_cleared(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, AssociationOperation::Clear))
    }

    /// Current rows after replaying pending changes.
    pub fn rows(&self) -> HashMap<&RowKey, &Tuple> {
        let mut rows: HashMap<&RowKey, &Tuple> = self.loaded.iter().collect();
        for operation in &self.operations {
            match operation {
                AssociationOperation::Put { key, row } => {
                    rows.insert(key, row);
                }
                AssociationOperation::Remove { key } => {
                    rows.remove(key);
                }
                AssociationOperation::Clear => rows.clear(),
            }
        }
        rows
    }

    pub fn get(&self, key: &RowKey) -> Option<&Tuple> {
        self.rows().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn row_key(idx: i64) -> RowKey {
        RowKey::new(["order_id", "order"], vec![Value::from("o1"), Value::Int(idx)]).unwrap()
    }

    fn row(sku: &str) -> Tuple {
        let mut tuple = Tuple::new();
        tuple.put("sku", sku);
        tuple
    }

    #[test]
    fn test_replay_over_loaded_rows() {
        let mut association = Association::from_rows([(row_key(0), row("A")), (row_key(1), row("B"))]);
        association.remove(row_key(0));
        association.put(row_key(2), row("C"));

        assert_eq!(association.len(), 2);
        assert!(association.get(&row_key(0)).is_none());
        assert_eq!(
            association.get(&row_key(2)).and_then(|t| t.get("sku")),
            Some(&Value::from("C"))
        );
    }

    #[test]
    fn test_clear_then_put() {
        let mut association = Association::from_rows([(row_key(0), row("A"))]);
        association.clear();
        association.put(row_key(5), row("Z"));

        assert!(association.is_cleared());
        assert_eq!(association.len(), 1);
        assert!(association.get(&row_key(5)).is_some());
    }
}
