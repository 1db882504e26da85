//! JSON lines event format read by the `replay` command.
//!
//! Each line holds one externally tagged object:
//!
//! ```json
//! {"object_class": {"id": 26, "table": "building"}}
//! {"register": {"flavor": "object", "external_id": "bldg-1", "surrogate_key": 10, "mapping": "building", "object_class_id": 26}}
//! {"reference": {"kind": "group_member", "group_id": 7, "member_id": "bldg-1"}}
//! ```
//!
//! Blank lines are skipped.

use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use citylink_core::{
    BasicDirection, CacheEntry, CacheFlavor, DeferredReference, ObjectClassId, WorkItemError,
};
use citylink_fs::open_utf8_file;
use serde::Deserialize;

use crate::CliError;

/// One line of a replay file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ReplayEvent {
    /// Declare the table an object class lives in.
    ObjectClass {
        id: ObjectClassId,
        table: String,
    },
    /// Register an identity with one of the caches.
    Register(RegisterEvent),
    /// Queue a deferred reference for the resolution pass.
    Reference(ReferenceEvent),
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RegisterEvent {
    pub(crate) flavor: CacheFlavor,
    #[serde(flatten)]
    pub(crate) entry: CacheEntry,
}

/// Wire form of a [`DeferredReference`], validated on conversion.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum ReferenceEvent {
    SurfaceGeometry {
        placeholder_id: i64,
        target_id: String,
        #[serde(default)]
        reverse: bool,
    },
    SolidGeometry {
        solid_id: i64,
        target_id: String,
    },
    TextureCoordList {
        surface_data_id: i64,
        target_id: String,
        coordinates: String,
    },
    TextureAssociation {
        surface_data_id: i64,
        target_id: String,
        #[serde(default)]
        world_to_texture: Option<String>,
    },
    TextureFile {
        tex_image_id: i64,
        uri: String,
    },
    LibraryObject {
        implicit_geometry_id: i64,
        uri: String,
    },
    DeprecatedMaterial {
        surface_geometry_id: i64,
        target_id: String,
    },
    GroupMember {
        group_id: i64,
        member_id: String,
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        is_parent: bool,
    },
    Basic {
        referencing_id: i64,
        target_id: String,
        table: String,
        #[serde(flatten)]
        direction: DirectionEvent,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "direction", rename_all = "snake_case")]
pub(crate) enum DirectionEvent {
    Forward { column: String },
    Reverse { column: String },
    Association { from_column: String, to_column: String },
}

impl From<DirectionEvent> for BasicDirection {
    fn from(event: DirectionEvent) -> Self {
        match event {
            DirectionEvent::Forward { column } => Self::Forward { column },
            DirectionEvent::Reverse { column } => Self::Reverse { column },
            DirectionEvent::Association {
                from_column,
                to_column,
            } => Self::Association {
                from_column,
                to_column,
            },
        }
    }
}

impl ReferenceEvent {
    pub(crate) fn into_work_item(self) -> Result<DeferredReference, WorkItemError> {
        match self {
            Self::SurfaceGeometry {
                placeholder_id,
                target_id,
                reverse,
            } => DeferredReference::surface_geometry(placeholder_id, &target_id, reverse),
            Self::SolidGeometry {
                solid_id,
                target_id,
            } => DeferredReference::solid_geometry(solid_id, &target_id),
            Self::TextureCoordList {
                surface_data_id,
                target_id,
                coordinates,
            } => DeferredReference::texture_coord_list(surface_data_id, &target_id, &coordinates),
            Self::TextureAssociation {
                surface_data_id,
                target_id,
                world_to_texture,
            } => DeferredReference::texture_association(
                surface_data_id,
                &target_id,
                world_to_texture.as_deref(),
            ),
            Self::TextureFile { tex_image_id, uri } => {
                DeferredReference::texture_file(tex_image_id, &uri)
            }
            Self::LibraryObject {
                implicit_geometry_id,
                uri,
            } => DeferredReference::library_object(implicit_geometry_id, &uri),
            Self::DeprecatedMaterial {
                surface_geometry_id,
                target_id,
            } => DeferredReference::deprecated_material(surface_geometry_id, &target_id),
            Self::GroupMember {
                group_id,
                member_id,
                role,
                is_parent,
            } => DeferredReference::group_member(group_id, &member_id, role.as_deref(), is_parent),
            Self::Basic {
                referencing_id,
                target_id,
                table,
                direction,
            } => DeferredReference::basic(referencing_id, &target_id, &table, direction.into()),
        }
    }
}

/// Events from one replay file, split into the two passes.
#[derive(Debug, Default)]
pub(crate) struct ReplayPlan {
    pub(crate) object_classes: Vec<(ObjectClassId, String)>,
    pub(crate) registrations: Vec<RegisterEvent>,
    pub(crate) references: Vec<DeferredReference>,
}

/// Read and validate every event in `path`.
pub(crate) fn load_events(path: &Utf8Path) -> Result<ReplayPlan, CliError> {
    let file = open_utf8_file(path).map_err(|source| CliError::OpenEvents {
        path: path.to_path_buf(),
        source,
    })?;
    let mut plan = ReplayPlan::default();
    for (index, read) in BufReader::new(file).lines().enumerate() {
        let line = index + 1;
        let text = read.map_err(|source| CliError::ReadEvents {
            path: path.to_path_buf(),
            line,
            source,
        })?;
        if text.trim().is_empty() {
            continue;
        }
        let event: ReplayEvent =
            serde_json::from_str(&text).map_err(|source| CliError::ParseEvent {
                path: path.to_path_buf(),
                line,
                source,
            })?;
        match event {
            ReplayEvent::ObjectClass { id, table } => plan.object_classes.push((id, table)),
            ReplayEvent::Register(register) => plan.registrations.push(register),
            ReplayEvent::Reference(reference) => {
                let item =
                    reference
                        .into_work_item()
                        .map_err(|source| CliError::InvalidReference {
                            path: path.to_path_buf(),
                            line,
                            source,
                        })?;
                plan.references.push(item);
            }
        }
    }
    Ok(plan)
}
