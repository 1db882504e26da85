//! End-of-run accounting for resolved and unresolved references.
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use citylink_core::ReferenceKind;

/// One value per reference kind.
#[derive(Debug, Default)]
pub(crate) struct PerKind<T> {
    surface_geometry: T,
    solid_geometry: T,
    texture_coord_list: T,
    texture_association: T,
    texture_file: T,
    library_object: T,
    deprecated_material: T,
    group_member: T,
    basic: T,
}

impl<T> PerKind<T> {
    pub(crate) const fn get(&self, kind: ReferenceKind) -> &T {
        match kind {
            ReferenceKind::SurfaceGeometry => &self.surface_geometry,
            ReferenceKind::SolidGeometry => &self.solid_geometry,
            ReferenceKind::TextureCoordList => &self.texture_coord_list,
            ReferenceKind::TextureAssociation => &self.texture_association,
            ReferenceKind::TextureFile => &self.texture_file,
            ReferenceKind::LibraryObject => &self.library_object,
            ReferenceKind::DeprecatedMaterial => &self.deprecated_material,
            ReferenceKind::GroupMember => &self.group_member,
            ReferenceKind::Basic => &self.basic,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ReferenceKind, &T)> {
        ReferenceKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.get(kind)))
    }
}

impl PerKind<AtomicUsize> {
    pub(crate) fn increment(&self, kind: ReferenceKind) {
        self.add(kind, 1);
    }

    pub(crate) fn add(&self, kind: ReferenceKind, count: usize) {
        self.get(kind).fetch_add(count, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BTreeMap<ReferenceKind, usize> {
        self.iter()
            .map(|(kind, count)| (kind, count.load(Ordering::SeqCst)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

/// Whether a run finished cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every reference was resolved.
    Succeeded,
    /// The run completed but some references stayed unresolved.
    SucceededWithWarnings {
        /// Number of unresolved references across all kinds.
        unresolved: usize,
    },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::SucceededWithWarnings { unresolved } => {
                write!(f, "succeeded with warnings ({unresolved} unresolved)")
            }
        }
    }
}

/// Per-kind counts returned when a resolver closes.
///
/// Kinds that never occurred are absent from both maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    resolved: BTreeMap<ReferenceKind, usize>,
    unresolved: BTreeMap<ReferenceKind, usize>,
}

impl ResolutionReport {
    pub(crate) fn from_counts(
        resolved: &PerKind<AtomicUsize>,
        unresolved: &PerKind<AtomicUsize>,
    ) -> Self {
        Self {
            resolved: resolved.snapshot(),
            unresolved: unresolved.snapshot(),
        }
    }

    /// References of `kind` whose patch was written.
    #[must_use]
    pub fn resolved(&self, kind: ReferenceKind) -> usize {
        self.resolved.get(&kind).copied().unwrap_or(0)
    }

    /// References of `kind` whose target was never found.
    #[must_use]
    pub fn unresolved(&self, kind: ReferenceKind) -> usize {
        self.unresolved.get(&kind).copied().unwrap_or(0)
    }

    /// Unresolved counts for every kind that had misses.
    pub fn unresolved_by_kind(&self) -> impl Iterator<Item = (ReferenceKind, usize)> + '_ {
        self.unresolved.iter().map(|(kind, count)| (*kind, *count))
    }

    /// Total patched references.
    #[must_use]
    pub fn total_resolved(&self) -> usize {
        self.resolved.values().sum()
    }

    /// Total unresolved references.
    #[must_use]
    pub fn total_unresolved(&self) -> usize {
        self.unresolved.values().sum()
    }

    /// Outcome of the run.
    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        match self.total_unresolved() {
            0 => RunOutcome::Succeeded,
            unresolved => RunOutcome::SucceededWithWarnings { unresolved },
        }
    }
}
