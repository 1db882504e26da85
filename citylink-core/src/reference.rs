//! Deferred cross-reference work items.
//!
//! A work item is emitted by the import pipeline whenever a property points
//! at an external id that is not yet known. Each variant carries the row to
//! patch and whatever payload the patch needs. Constructors validate the
//! payload so that malformed items are rejected by the producer and never
//! reach the resolver.

use thiserror::Error;

use crate::CacheFlavor;

/// Number of values in a world-to-texture transformation (a 3x4 matrix).
const WORLD_TO_TEXTURE_VALUES: usize = 12;

/// Errors raised when a work item payload is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkItemError {
    /// A required identifier was empty or whitespace.
    #[error("{field} must not be blank")]
    BlankIdentifier {
        /// Name of the offending field.
        field: &'static str,
    },
    /// A table or column name is not a plain SQL identifier.
    #[error("{value:?} is not a valid SQL identifier")]
    InvalidSqlIdentifier {
        /// Rejected identifier.
        value: String,
    },
    /// The world-to-texture matrix did not hold twelve finite numbers.
    #[error("world-to-texture matrix must hold {WORLD_TO_TEXTURE_VALUES} finite numbers, found {found:?}")]
    MalformedMatrix {
        /// Raw matrix text.
        found: String,
    },
    /// The texture coordinate list was empty, odd or non-numeric.
    #[error("texture coordinates must be a non-empty list of finite (s, t) pairs, found {found:?}")]
    MalformedCoordinates {
        /// Raw coordinate text.
        found: String,
    },
    /// A file URI was empty or whitespace.
    #[error("file URI must not be blank")]
    BlankUri,
}

/// Closed set of cross-reference kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ReferenceKind {
    /// Reuse of a previously imported surface geometry.
    SurfaceGeometry,
    /// Reuse of a previously imported solid.
    SolidGeometry,
    /// Texture coordinates addressed to a ring or polygon.
    TextureCoordList,
    /// Texture parameterisation bound to a surface.
    TextureAssociation,
    /// Texture image addressed by file URI.
    TextureFile,
    /// Implicit geometry library object addressed by file URI.
    LibraryObject,
    /// Legacy material link to surface data.
    DeprecatedMaterial,
    /// Membership of an object in a group, or the group's parent.
    GroupMember,
    /// Generic row patch.
    Basic,
}

impl ReferenceKind {
    /// Every kind, in a stable order.
    pub const ALL: [Self; 9] = [
        Self::SurfaceGeometry,
        Self::SolidGeometry,
        Self::TextureCoordList,
        Self::TextureAssociation,
        Self::TextureFile,
        Self::LibraryObject,
        Self::DeprecatedMaterial,
        Self::GroupMember,
        Self::Basic,
    ];

    /// Position of the kind within [`ReferenceKind::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Stable snake-case label used in logs and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SurfaceGeometry => "surface_geometry",
            Self::SolidGeometry => "solid_geometry",
            Self::TextureCoordList => "texture_coord_list",
            Self::TextureAssociation => "texture_association",
            Self::TextureFile => "texture_file",
            Self::LibraryObject => "library_object",
            Self::DeprecatedMaterial => "deprecated_material",
            Self::GroupMember => "group_member",
            Self::Basic => "basic",
        }
    }
}

/// Where the resolver has to look to find a reference's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceTarget<'a> {
    /// An external id registered in one of the identity caches.
    Cached {
        /// Cache holding the target.
        flavor: CacheFlavor,
        /// External id of the target.
        external_id: &'a str,
    },
    /// A file addressed by URI, bypassing the identity caches.
    File {
        /// URI of the file.
        uri: &'a str,
    },
}

/// Placeholder surface geometry row that reuses another geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct SurfaceGeometryRef {
    /// `surface_geometry` row standing in for the referenced geometry.
    pub placeholder_id: i64,
    /// External id of the reused geometry.
    pub target_id: String,
    /// Whether the reuse flips the orientation.
    pub reverse: bool,
}

/// Solid row that reuses another solid.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct SolidGeometryRef {
    /// `surface_geometry` row of the referencing solid.
    pub solid_id: i64,
    /// External id of the reused solid (or a part of it).
    pub target_id: String,
}

/// Texture coordinates targeting a ring or polygon.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TextureCoordListRef {
    /// `surface_data` row owning the coordinates.
    pub surface_data_id: i64,
    /// External id of the textured geometry.
    pub target_id: String,
    /// Whitespace-separated `s t` pairs.
    pub coordinates: String,
}

/// Texture parameterisation targeting a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TextureAssociationRef {
    /// `surface_data` row being associated.
    pub surface_data_id: i64,
    /// External id of the target surface geometry.
    pub target_id: String,
    /// Optional 3x4 world-to-texture matrix in row-major order.
    pub world_to_texture: Option<String>,
}

/// Texture image whose bytes live in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TextureFileRef {
    /// `tex_image` row to fill.
    pub tex_image_id: i64,
    /// File URI, relative to the import base directory or `file://`.
    pub uri: String,
}

/// Implicit geometry whose library object lives in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct LibraryObjectRef {
    /// `implicit_geometry` row to fill.
    pub implicit_geometry_id: i64,
    /// File URI, relative to the import base directory or `file://`.
    pub uri: String,
}

/// Legacy material reference from a surface to surface data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DeprecatedMaterialRef {
    /// `surface_geometry` row carrying the material.
    pub surface_geometry_id: i64,
    /// External id of the surface data (material).
    pub target_id: String,
}

/// Group membership, or the group's parent link when `is_parent` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct GroupMemberRef {
    /// `cityobjectgroup` row.
    pub group_id: i64,
    /// External id of the member (or parent) object.
    pub member_id: String,
    /// Optional role of the member within the group.
    pub role: Option<String>,
    /// Whether the reference names the group's parent instead of a member.
    pub is_parent: bool,
}

/// Direction of a generic row patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasicDirection {
    /// Write the target's key into `column` of the referencing row.
    Forward {
        /// Column holding the foreign key.
        column: String,
    },
    /// Write the referencing row's key into `column` of the target row.
    Reverse {
        /// Column on the target row.
        column: String,
    },
    /// Insert `(referencing, target)` into an association table.
    Association {
        /// Column receiving the referencing key.
        from_column: String,
        /// Column receiving the target key.
        to_column: String,
    },
}

/// Generic row patch against an arbitrary table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct BasicRef {
    /// Key of the referencing row.
    pub referencing_id: i64,
    /// External id of the target object.
    pub target_id: String,
    /// Table the patch is applied to.
    pub table: String,
    /// How the keys are written.
    pub direction: BasicDirection,
}

/// A cross-reference whose target was unknown when the referencing row was
/// written.
///
/// # Examples
///
/// ```
/// use citylink_core::{DeferredReference, ReferenceKind};
///
/// let item = DeferredReference::group_member(7, "#bldg-42", None, false)?;
/// assert_eq!(item.kind(), ReferenceKind::GroupMember);
/// # Ok::<(), citylink_core::WorkItemError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredReference {
    /// See [`SurfaceGeometryRef`].
    SurfaceGeometry(SurfaceGeometryRef),
    /// See [`SolidGeometryRef`].
    SolidGeometry(SolidGeometryRef),
    /// See [`TextureCoordListRef`].
    TextureCoordList(TextureCoordListRef),
    /// See [`TextureAssociationRef`].
    TextureAssociation(TextureAssociationRef),
    /// See [`TextureFileRef`].
    TextureFile(TextureFileRef),
    /// See [`LibraryObjectRef`].
    LibraryObject(LibraryObjectRef),
    /// See [`DeprecatedMaterialRef`].
    DeprecatedMaterial(DeprecatedMaterialRef),
    /// See [`GroupMemberRef`].
    GroupMember(GroupMemberRef),
    /// See [`BasicRef`].
    Basic(BasicRef),
}

impl DeferredReference {
    /// Surface geometry reuse.
    ///
    /// # Errors
    /// Returns [`WorkItemError::BlankIdentifier`] for a blank target id.
    pub fn surface_geometry(
        placeholder_id: i64,
        target_id: &str,
        reverse: bool,
    ) -> Result<Self, WorkItemError> {
        Ok(Self::SurfaceGeometry(SurfaceGeometryRef {
            placeholder_id,
            target_id: external_id(target_id, "target_id")?,
            reverse,
        }))
    }

    /// Solid geometry reuse.
    ///
    /// # Errors
    /// Returns [`WorkItemError::BlankIdentifier`] for a blank target id.
    pub fn solid_geometry(solid_id: i64, target_id: &str) -> Result<Self, WorkItemError> {
        Ok(Self::SolidGeometry(SolidGeometryRef {
            solid_id,
            target_id: external_id(target_id, "target_id")?,
        }))
    }

    /// Texture coordinate list.
    ///
    /// # Errors
    /// Returns [`WorkItemError`] for a blank target id or malformed
    /// coordinates.
    pub fn texture_coord_list(
        surface_data_id: i64,
        target_id: &str,
        coordinates: &str,
    ) -> Result<Self, WorkItemError> {
        Ok(Self::TextureCoordList(TextureCoordListRef {
            surface_data_id,
            target_id: external_id(target_id, "target_id")?,
            coordinates: texture_coordinates(coordinates)?,
        }))
    }

    /// Texture-to-surface association.
    ///
    /// # Errors
    /// Returns [`WorkItemError`] for a blank target id or a malformed matrix.
    pub fn texture_association(
        surface_data_id: i64,
        target_id: &str,
        world_to_texture: Option<&str>,
    ) -> Result<Self, WorkItemError> {
        Ok(Self::TextureAssociation(TextureAssociationRef {
            surface_data_id,
            target_id: external_id(target_id, "target_id")?,
            world_to_texture: world_to_texture.map(matrix).transpose()?,
        }))
    }

    /// Texture image file.
    ///
    /// # Errors
    /// Returns [`WorkItemError::BlankUri`] for a blank URI.
    pub fn texture_file(tex_image_id: i64, uri: &str) -> Result<Self, WorkItemError> {
        Ok(Self::TextureFile(TextureFileRef {
            tex_image_id,
            uri: file_uri(uri)?,
        }))
    }

    /// Library object file.
    ///
    /// # Errors
    /// Returns [`WorkItemError::BlankUri`] for a blank URI.
    pub fn library_object(implicit_geometry_id: i64, uri: &str) -> Result<Self, WorkItemError> {
        Ok(Self::LibraryObject(LibraryObjectRef {
            implicit_geometry_id,
            uri: file_uri(uri)?,
        }))
    }

    /// Legacy material link.
    ///
    /// # Errors
    /// Returns [`WorkItemError::BlankIdentifier`] for a blank target id.
    pub fn deprecated_material(
        surface_geometry_id: i64,
        target_id: &str,
    ) -> Result<Self, WorkItemError> {
        Ok(Self::DeprecatedMaterial(DeprecatedMaterialRef {
            surface_geometry_id,
            target_id: external_id(target_id, "target_id")?,
        }))
    }

    /// Group membership or parent link.
    ///
    /// # Errors
    /// Returns [`WorkItemError::BlankIdentifier`] for a blank member id.
    pub fn group_member(
        group_id: i64,
        member_id: &str,
        role: Option<&str>,
        is_parent: bool,
    ) -> Result<Self, WorkItemError> {
        Ok(Self::GroupMember(GroupMemberRef {
            group_id,
            member_id: external_id(member_id, "member_id")?,
            role: role
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_owned),
            is_parent,
        }))
    }

    /// Generic row patch.
    ///
    /// # Errors
    /// Returns [`WorkItemError`] for a blank target id or when the table or
    /// any column is not a plain SQL identifier.
    pub fn basic(
        referencing_id: i64,
        target_id: &str,
        table: &str,
        direction: BasicDirection,
    ) -> Result<Self, WorkItemError> {
        match &direction {
            BasicDirection::Forward { column } | BasicDirection::Reverse { column } => {
                sql_identifier(column)?;
            }
            BasicDirection::Association {
                from_column,
                to_column,
            } => {
                sql_identifier(from_column)?;
                sql_identifier(to_column)?;
            }
        }
        Ok(Self::Basic(BasicRef {
            referencing_id,
            target_id: external_id(target_id, "target_id")?,
            table: sql_identifier(table)?,
            direction,
        }))
    }

    /// Kind of the reference.
    #[must_use]
    pub const fn kind(&self) -> ReferenceKind {
        match self {
            Self::SurfaceGeometry(_) => ReferenceKind::SurfaceGeometry,
            Self::SolidGeometry(_) => ReferenceKind::SolidGeometry,
            Self::TextureCoordList(_) => ReferenceKind::TextureCoordList,
            Self::TextureAssociation(_) => ReferenceKind::TextureAssociation,
            Self::TextureFile(_) => ReferenceKind::TextureFile,
            Self::LibraryObject(_) => ReferenceKind::LibraryObject,
            Self::DeprecatedMaterial(_) => ReferenceKind::DeprecatedMaterial,
            Self::GroupMember(_) => ReferenceKind::GroupMember,
            Self::Basic(_) => ReferenceKind::Basic,
        }
    }

    /// Where the target of this reference is looked up.
    #[must_use]
    pub fn target(&self) -> ReferenceTarget<'_> {
        let geometry = |external_id| ReferenceTarget::Cached {
            flavor: CacheFlavor::Geometry,
            external_id,
        };
        let object = |external_id| ReferenceTarget::Cached {
            flavor: CacheFlavor::Object,
            external_id,
        };
        match self {
            Self::SurfaceGeometry(item) => geometry(item.target_id.as_str()),
            Self::SolidGeometry(item) => geometry(item.target_id.as_str()),
            Self::TextureCoordList(item) => geometry(item.target_id.as_str()),
            Self::TextureAssociation(item) => geometry(item.target_id.as_str()),
            Self::TextureFile(item) => ReferenceTarget::File {
                uri: item.uri.as_str(),
            },
            Self::LibraryObject(item) => ReferenceTarget::File {
                uri: item.uri.as_str(),
            },
            Self::DeprecatedMaterial(item) => object(item.target_id.as_str()),
            Self::GroupMember(item) => object(item.member_id.as_str()),
            Self::Basic(item) => object(item.target_id.as_str()),
        }
    }
}

/// Strip an optional leading `#` (local xlink form) and reject blanks.
fn external_id(raw: &str, field: &'static str) -> Result<String, WorkItemError> {
    let trimmed = raw.trim();
    non_blank(trimmed.strip_prefix('#').unwrap_or(trimmed), field)
}

fn non_blank(raw: &str, field: &'static str) -> Result<String, WorkItemError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(WorkItemError::BlankIdentifier { field })
    } else {
        Ok(trimmed.to_owned())
    }
}

fn file_uri(raw: &str) -> Result<String, WorkItemError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(WorkItemError::BlankUri)
    } else {
        Ok(trimmed.to_owned())
    }
}

fn sql_identifier(raw: &str) -> Result<String, WorkItemError> {
    let mut chars = raw.chars();
    let valid_head = chars
        .next()
        .is_some_and(|head| head.is_ascii_alphabetic() || head == '_');
    if valid_head && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        Ok(raw.to_owned())
    } else {
        Err(WorkItemError::InvalidSqlIdentifier {
            value: raw.to_owned(),
        })
    }
}

fn finite_values(raw: &str) -> Option<usize> {
    raw.split_whitespace().try_fold(0_usize, |count, token| {
        token
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(|_| count + 1)
    })
}

fn matrix(raw: &str) -> Result<String, WorkItemError> {
    match finite_values(raw) {
        Some(WORLD_TO_TEXTURE_VALUES) => Ok(normalise_whitespace(raw)),
        _ => Err(WorkItemError::MalformedMatrix {
            found: raw.to_owned(),
        }),
    }
}

fn texture_coordinates(raw: &str) -> Result<String, WorkItemError> {
    match finite_values(raw) {
        Some(count) if count > 0 && count.is_multiple_of(2) => Ok(normalise_whitespace(raw)),
        _ => Err(WorkItemError::MalformedCoordinates {
            found: raw.to_owned(),
        }),
    }
}

fn normalise_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("#bldg-1", "bldg-1")]
    #[case("  bldg-1 ", "bldg-1")]
    #[case("bldg#1", "bldg#1")]
    fn external_ids_drop_local_xlink_prefix(#[case] raw: &str, #[case] expected: &str) {
        let item = DeferredReference::deprecated_material(1, raw).expect("valid item");
        assert_eq!(
            item.target(),
            ReferenceTarget::Cached {
                flavor: CacheFlavor::Object,
                external_id: expected,
            }
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("#")]
    fn blank_targets_are_rejected(#[case] raw: &str) {
        let err = DeferredReference::surface_geometry(1, raw, false).expect_err("blank target");
        assert_eq!(err, WorkItemError::BlankIdentifier { field: "target_id" });
    }

    #[rstest]
    fn blank_uris_are_rejected() {
        assert_eq!(
            DeferredReference::texture_file(1, " "),
            Err(WorkItemError::BlankUri)
        );
        assert_eq!(
            DeferredReference::library_object(1, ""),
            Err(WorkItemError::BlankUri)
        );
    }

    #[rstest]
    #[case("building")]
    #[case("_private")]
    #[case("group_to_cityobject2")]
    fn plain_sql_identifiers_are_accepted(#[case] table: &str) {
        let direction = BasicDirection::Forward {
            column: "lod1_id".to_owned(),
        };
        assert!(DeferredReference::basic(1, "x", table, direction).is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("1building")]
    #[case("building; DROP TABLE cityobject")]
    #[case("bâtiment")]
    fn unsafe_sql_identifiers_are_rejected(#[case] table: &str) {
        let direction = BasicDirection::Forward {
            column: "lod1_id".to_owned(),
        };
        let err = DeferredReference::basic(1, "x", table, direction).expect_err("bad table");
        assert!(matches!(err, WorkItemError::InvalidSqlIdentifier { .. }));
    }

    #[rstest]
    fn association_columns_are_validated() {
        let direction = BasicDirection::Association {
            from_column: "cityobject_id".to_owned(),
            to_column: "address id".to_owned(),
        };
        let err = DeferredReference::basic(1, "x", "address_to_building", direction)
            .expect_err("bad column");
        assert_eq!(
            err,
            WorkItemError::InvalidSqlIdentifier {
                value: "address id".to_owned()
            }
        );
    }

    #[rstest]
    #[case("1 0 0 0  0 1 0 0\n0 0 1 0", true)]
    #[case("1 0 0 0 0 1 0 0 0 0 1", false)]
    #[case("1 0 0 0 0 1 0 0 0 0 1 0 0", false)]
    #[case("1 0 0 0 0 1 0 0 0 0 1 NaN", false)]
    #[case("1 0 0 0 0 1 0 0 0 0 1 x", false)]
    fn world_to_texture_needs_twelve_finite_values(#[case] raw: &str, #[case] valid: bool) {
        let result = DeferredReference::texture_association(1, "poly", Some(raw));
        assert_eq!(result.is_ok(), valid, "{raw:?}");
    }

    #[rstest]
    fn world_to_texture_is_normalised() {
        let item = DeferredReference::texture_association(1, "poly", Some(" 1 0 0 0\n0 1 0 0 0 0 1 0 "))
            .expect("valid matrix");
        let DeferredReference::TextureAssociation(association) = item else {
            panic!("unexpected variant");
        };
        assert_eq!(
            association.world_to_texture.as_deref(),
            Some("1 0 0 0 0 1 0 0 0 0 1 0")
        );
    }

    #[rstest]
    #[case("0 0 1 0 1 1 0 0", true)]
    #[case("0.5 0.25", true)]
    #[case("", false)]
    #[case("0 0 1", false)]
    #[case("0 inf", false)]
    fn texture_coordinates_need_finite_pairs(#[case] raw: &str, #[case] valid: bool) {
        let result = DeferredReference::texture_coord_list(1, "ring", raw);
        assert_eq!(result.is_ok(), valid, "{raw:?}");
    }

    #[rstest]
    fn blank_roles_are_dropped() {
        let item = DeferredReference::group_member(3, "member", Some("  "), false)
            .expect("valid member");
        let DeferredReference::GroupMember(member) = item else {
            panic!("unexpected variant");
        };
        assert_eq!(member.role, None);
    }

    #[rstest]
    fn file_references_bypass_the_caches() {
        let item = DeferredReference::texture_file(4, "textures/roof.png").expect("valid item");
        assert_eq!(
            item.target(),
            ReferenceTarget::File {
                uri: "textures/roof.png"
            }
        );
    }

    #[rstest]
    fn kind_indices_follow_declaration_order() {
        for (position, kind) in ReferenceKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), position, "{}", kind.label());
        }
    }
}
