//! Identity mappings held by the identity caches.

/// Numeric schema identifier of an object's concrete type.
pub type ObjectClassId = i32;

/// The two cache flavours kept for a single import run.
///
/// Objects (features, surface data, groups) and geometries are registered in
/// separate caches because they are looked up by different reference kinds
/// and persist different columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CacheFlavor {
    /// Feature and object identities, including their object class.
    Object,
    /// Geometry identities.
    Geometry,
}

impl CacheFlavor {
    /// Name of the template table backing this flavour on disk.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Object => "object_id_cache",
            Self::Geometry => "geometry_id_cache",
        }
    }

    /// Whether entries of this flavour carry an object class id.
    #[must_use]
    pub const fn stores_object_class(self) -> bool {
        matches!(self, Self::Object)
    }
}

/// A known mapping from an external identifier to a surrogate key.
///
/// Entries are immutable. A second registration of the same external id is
/// ignored, so the first registered entry is the one every lookup returns.
///
/// # Examples
///
/// ```
/// use citylink_core::CacheEntry;
///
/// let entry = CacheEntry::new("bldg-42", 1001, "building").with_object_class(26);
/// assert_eq!(entry.surrogate_key, 1001);
/// assert_eq!(entry.root_or_self(), 1001);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheEntry {
    /// Identifier declared by the source format.
    pub external_id: String,
    /// Database-assigned primary key.
    pub surrogate_key: i64,
    /// Key of the aggregate root owning this entry, when it is a nested part.
    #[cfg_attr(feature = "serde", serde(default))]
    pub root_key: Option<i64>,
    /// Whether the stored orientation is inverted relative to the reference.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_reverse: bool,
    /// Schema tag naming the table the surrogate key lives in.
    #[cfg_attr(feature = "serde", serde(default))]
    pub mapping: String,
    /// Concrete object class, populated for the object flavour only.
    #[cfg_attr(feature = "serde", serde(default))]
    pub object_class_id: Option<ObjectClassId>,
}

impl CacheEntry {
    /// Build an entry without root key, orientation flag or object class.
    #[must_use]
    pub fn new(
        external_id: impl Into<String>,
        surrogate_key: i64,
        mapping: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            surrogate_key,
            root_key: None,
            is_reverse: false,
            mapping: mapping.into(),
            object_class_id: None,
        }
    }

    /// Attach the aggregate root key.
    #[must_use]
    pub const fn with_root(mut self, root_key: i64) -> Self {
        self.root_key = Some(root_key);
        self
    }

    /// Flag the entry as reverse oriented.
    #[must_use]
    pub const fn reversed(mut self, is_reverse: bool) -> Self {
        self.is_reverse = is_reverse;
        self
    }

    /// Attach the object class id.
    #[must_use]
    pub const fn with_object_class(mut self, object_class_id: ObjectClassId) -> Self {
        self.object_class_id = Some(object_class_id);
        self
    }

    /// The root key when present, otherwise the entry's own surrogate key.
    #[must_use]
    pub fn root_or_self(&self) -> i64 {
        self.root_key.unwrap_or(self.surrogate_key)
    }
}
