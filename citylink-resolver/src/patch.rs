//! Pure translation of resolved references into patch statements.
//!
//! Every function here takes a work item and what its target resolved to
//! and returns the statement that writes the link into the city database.
//! Nothing touches a connection; the resolver batches the statements.
#![forbid(unsafe_code)]

use std::borrow::Cow;

use citylink_core::{
    BasicDirection, BasicRef, CacheEntry, DeprecatedMaterialRef, GroupMemberRef,
    LibraryObjectRef, ReferenceKind, SolidGeometryRef, SurfaceGeometryRef, TextureAssociationRef,
    TextureCoordListRef, TextureFileRef,
};
use rusqlite::types::Value;

const SURFACE_GEOMETRY_SQL: &str = "UPDATE surface_geometry SET \
     geometry = (SELECT geometry FROM surface_geometry WHERE id = ?1), \
     is_xlink = 1, is_reverse = ?2 WHERE id = ?3";
const SOLID_GEOMETRY_SQL: &str = "UPDATE surface_geometry SET \
     solid_geometry = (SELECT solid_geometry FROM surface_geometry WHERE id = ?1), \
     is_xlink = 1 WHERE id = ?2";
const TEXTURE_PARAM_SQL: &str = "INSERT INTO textureparam (\
     surface_geometry_id, is_texture_parametrization, world_to_texture, \
     texture_coordinates, surface_data_id) VALUES (?1, ?2, ?3, ?4, ?5)";
const GROUP_PARENT_SQL: &str = "UPDATE cityobjectgroup SET parent_cityobject_id = ?1 WHERE id = ?2";
const GROUP_MEMBER_SQL: &str =
    "INSERT INTO group_to_cityobject (cityobject_id, cityobjectgroup_id, role) VALUES (?1, ?2, ?3)";
const TEXTURE_FILE_SQL: &str =
    "UPDATE tex_image SET tex_image_data = ?1, tex_mime_type = ?2 WHERE id = ?3";
const LIBRARY_OBJECT_SQL: &str = "UPDATE implicit_geometry SET library_object = ?1 WHERE id = ?2";

/// A single parameterised statement produced for one resolved reference.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchStatement {
    /// Kind of reference the statement resolves.
    pub kind: ReferenceKind,
    /// SQL with positional parameters.
    pub sql: Cow<'static, str>,
    /// Values bound to `?1`, `?2`, ...
    pub params: Vec<Value>,
}

impl PatchStatement {
    fn fixed(kind: ReferenceKind, sql: &'static str, params: Vec<Value>) -> Self {
        Self {
            kind,
            sql: Cow::Borrowed(sql),
            params,
        }
    }
}

/// Contents of a texture image or library object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// Media type inferred from the file extension.
    pub mime_type: &'static str,
}

fn flag(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_owned()))
}

/// Point a placeholder surface at the reused geometry.
///
/// The placeholder is reversed when exactly one of the reference and the
/// registered geometry is reversed.
#[must_use]
pub fn surface_geometry(item: &SurfaceGeometryRef, target: &CacheEntry) -> PatchStatement {
    PatchStatement::fixed(
        ReferenceKind::SurfaceGeometry,
        SURFACE_GEOMETRY_SQL,
        vec![
            Value::Integer(target.surrogate_key),
            flag(item.reverse ^ target.is_reverse),
            Value::Integer(item.placeholder_id),
        ],
    )
}

/// Point a solid at the root of the reused solid.
#[must_use]
pub fn solid_geometry(item: &SolidGeometryRef, target: &CacheEntry) -> PatchStatement {
    PatchStatement::fixed(
        ReferenceKind::SolidGeometry,
        SOLID_GEOMETRY_SQL,
        vec![
            Value::Integer(target.root_or_self()),
            Value::Integer(item.solid_id),
        ],
    )
}

/// Texture coordinates for the target ring.
#[must_use]
pub fn texture_coord_list(item: &TextureCoordListRef, target: &CacheEntry) -> PatchStatement {
    PatchStatement::fixed(
        ReferenceKind::TextureCoordList,
        TEXTURE_PARAM_SQL,
        vec![
            Value::Integer(target.surrogate_key),
            flag(true),
            Value::Null,
            Value::Text(item.coordinates.clone()),
            Value::Integer(item.surface_data_id),
        ],
    )
}

/// Bind surface data to the target surface, with an optional matrix.
#[must_use]
pub fn texture_association(item: &TextureAssociationRef, target: &CacheEntry) -> PatchStatement {
    PatchStatement::fixed(
        ReferenceKind::TextureAssociation,
        TEXTURE_PARAM_SQL,
        vec![
            Value::Integer(target.surrogate_key),
            flag(item.world_to_texture.is_some()),
            optional_text(item.world_to_texture.as_deref()),
            Value::Null,
            Value::Integer(item.surface_data_id),
        ],
    )
}

/// Legacy material: the surface is the referencing row, the surface data is
/// the target.
#[must_use]
pub fn deprecated_material(item: &DeprecatedMaterialRef, target: &CacheEntry) -> PatchStatement {
    PatchStatement::fixed(
        ReferenceKind::DeprecatedMaterial,
        TEXTURE_PARAM_SQL,
        vec![
            Value::Integer(item.surface_geometry_id),
            flag(false),
            Value::Null,
            Value::Null,
            Value::Integer(target.surrogate_key),
        ],
    )
}

/// Group parent update or membership row.
#[must_use]
pub fn group_member(item: &GroupMemberRef, target: &CacheEntry) -> PatchStatement {
    if item.is_parent {
        PatchStatement::fixed(
            ReferenceKind::GroupMember,
            GROUP_PARENT_SQL,
            vec![
                Value::Integer(target.surrogate_key),
                Value::Integer(item.group_id),
            ],
        )
    } else {
        PatchStatement::fixed(
            ReferenceKind::GroupMember,
            GROUP_MEMBER_SQL,
            vec![
                Value::Integer(target.surrogate_key),
                Value::Integer(item.group_id),
                optional_text(item.role.as_deref()),
            ],
        )
    }
}

/// Generic row patch. Table and column names were validated when the work
/// item was built.
#[must_use]
pub fn basic(item: &BasicRef, target: &CacheEntry) -> PatchStatement {
    let table = &item.table;
    let referencing = Value::Integer(item.referencing_id);
    let resolved = Value::Integer(target.surrogate_key);
    let (sql, params) = match &item.direction {
        BasicDirection::Forward { column } => (
            format!("UPDATE {table} SET {column} = ?1 WHERE id = ?2"),
            vec![resolved, referencing],
        ),
        BasicDirection::Reverse { column } => (
            format!("UPDATE {table} SET {column} = ?1 WHERE id = ?2"),
            vec![referencing, resolved],
        ),
        BasicDirection::Association {
            from_column,
            to_column,
        } => (
            format!("INSERT INTO {table} ({from_column}, {to_column}) VALUES (?1, ?2)"),
            vec![referencing, resolved],
        ),
    };
    PatchStatement {
        kind: ReferenceKind::Basic,
        sql: Cow::Owned(sql),
        params,
    }
}

/// Store texture image bytes and their media type.
#[must_use]
pub fn texture_file(item: &TextureFileRef, file: FileContents) -> PatchStatement {
    PatchStatement::fixed(
        ReferenceKind::TextureFile,
        TEXTURE_FILE_SQL,
        vec![
            Value::Blob(file.bytes),
            Value::Text(file.mime_type.to_owned()),
            Value::Integer(item.tex_image_id),
        ],
    )
}

/// Store library object bytes.
#[must_use]
pub fn library_object(item: &LibraryObjectRef, file: FileContents) -> PatchStatement {
    PatchStatement::fixed(
        ReferenceKind::LibraryObject,
        LIBRARY_OBJECT_SQL,
        vec![
            Value::Blob(file.bytes),
            Value::Integer(item.implicit_geometry_id),
        ],
    )
}
