//! Pure lookup from object class ids to target table names.

use std::collections::HashMap;

use crate::ObjectClassId;

/// Maps an object class to the table its rows are stored in.
///
/// Implementations must be pure: the same id always yields the same table.
pub trait SchemaMapping: Send + Sync {
    /// Table holding objects of `object_class_id`, if the class is known.
    fn table_name(&self, object_class_id: ObjectClassId) -> Option<&str>;
}

/// `HashMap`-backed [`SchemaMapping`].
///
/// # Examples
///
/// ```
/// use citylink_core::{SchemaMapping, StaticSchemaMapping};
///
/// let mapping = StaticSchemaMapping::from_pairs([(26, "building"), (21, "city_furniture")]);
/// assert_eq!(mapping.table_name(26), Some("building"));
/// assert_eq!(mapping.table_name(99), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSchemaMapping {
    tables: HashMap<ObjectClassId, String>,
}

impl StaticSchemaMapping {
    /// Build a mapping from `(class id, table)` pairs. Later pairs win.
    #[must_use]
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (ObjectClassId, S)>,
        S: Into<String>,
    {
        Self {
            tables: pairs
                .into_iter()
                .map(|(class_id, table)| (class_id, table.into()))
                .collect(),
        }
    }

    /// Register or replace the table for a class.
    pub fn insert(&mut self, object_class_id: ObjectClassId, table: impl Into<String>) {
        self.tables.insert(object_class_id, table.into());
    }

    /// Number of known classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no class is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl SchemaMapping for StaticSchemaMapping {
    fn table_name(&self, object_class_id: ObjectClassId) -> Option<&str> {
        self.tables.get(&object_class_id).map(String::as_str)
    }
}
