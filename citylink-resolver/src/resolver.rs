//! Resolution of deferred cross-references into batched patches.
#![forbid(unsafe_code)]

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use citylink_core::{
    BasicDirection, BasicRef, CacheEntry, CacheFlavor, DeferredReference, ReferenceKind,
    ReferenceTarget,
};
use citylink_fs::{FileUri, mime_type_for};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::patch::{self, FileContents, PatchStatement};
use crate::report::PerKind;
use crate::{ResolutionReport, ResolveError, RunContext};

type PatchBatch = Mutex<Vec<PatchStatement>>;

/// Looks up the targets of deferred references and patches the referencing
/// rows in batches.
///
/// One batch per reference kind is created on first use and written to the
/// city database whenever it reaches the configured batch size, on
/// [`Self::execute_batch`] and on [`Self::close`].
#[derive(Debug)]
pub struct CrossReferenceResolver {
    context: RunContext,
    batches: PerKind<OnceLock<PatchBatch>>,
    resolved: PerKind<AtomicUsize>,
    unresolved: PerKind<AtomicUsize>,
    closed: AtomicBool,
}

impl CrossReferenceResolver {
    /// Create a resolver for the run described by `context`.
    ///
    /// # Errors
    /// Returns [`ResolveError::Config`] for an invalid resolver configuration.
    pub fn new(context: RunContext) -> Result<Self, ResolveError> {
        context.config().validate()?;
        Ok(Self {
            context,
            batches: PerKind::default(),
            resolved: PerKind::default(),
            unresolved: PerKind::default(),
            closed: AtomicBool::new(false),
        })
    }

    /// Resolve one work item.
    ///
    /// Returns `Ok(true)` when a patch was queued and `Ok(false)` when the
    /// target is unknown; a miss is terminal and counted in the report.
    ///
    /// # Errors
    /// Returns [`ResolveError`] when a cache lookup, a file read or a batch
    /// flush fails, or when the resolver is closed.
    pub fn resolve(&self, item: &DeferredReference) -> Result<bool, ResolveError> {
        self.ensure_open()?;
        let statement = match item {
            DeferredReference::SurfaceGeometry(reference) => self
                .target(CacheFlavor::Geometry, &reference.target_id)?
                .map(|entry| patch::surface_geometry(reference, &entry)),
            DeferredReference::SolidGeometry(reference) => self
                .target(CacheFlavor::Geometry, &reference.target_id)?
                .map(|entry| patch::solid_geometry(reference, &entry)),
            DeferredReference::TextureCoordList(reference) => self
                .target(CacheFlavor::Geometry, &reference.target_id)?
                .map(|entry| patch::texture_coord_list(reference, &entry)),
            DeferredReference::TextureAssociation(reference) => self
                .target(CacheFlavor::Geometry, &reference.target_id)?
                .map(|entry| patch::texture_association(reference, &entry)),
            DeferredReference::TextureFile(reference) => self
                .read_file(&reference.uri)?
                .map(|file| patch::texture_file(reference, file)),
            DeferredReference::LibraryObject(reference) => self
                .read_file(&reference.uri)?
                .map(|file| patch::library_object(reference, file)),
            DeferredReference::DeprecatedMaterial(reference) => self
                .target(CacheFlavor::Object, &reference.target_id)?
                .map(|entry| patch::deprecated_material(reference, &entry)),
            DeferredReference::GroupMember(reference) => self
                .target(CacheFlavor::Object, &reference.member_id)?
                .map(|entry| patch::group_member(reference, &entry)),
            DeferredReference::Basic(reference) => self.resolve_basic(reference)?,
        };

        let kind = item.kind();
        let Some(statement) = statement else {
            self.unresolved.increment(kind);
            warn!(
                "unresolved {} reference to {}",
                kind.label(),
                describe(item.target())
            );
            return Ok(false);
        };
        self.enqueue(kind, statement)?;
        Ok(true)
    }

    /// Write every pending batch. Returns the number of statements written.
    ///
    /// # Errors
    /// Returns [`ResolveError`] for the first failing batch, or when the
    /// resolver is closed. The other kinds are still written; a failed batch
    /// stays pending.
    pub fn execute_batch(&self) -> Result<usize, ResolveError> {
        self.ensure_open()?;
        self.flush_all()
    }

    /// Flush every batch and return the run's report.
    ///
    /// Later calls on the resolver return [`ResolveError::Closed`].
    ///
    /// # Errors
    /// Returns [`ResolveError::Closed`] when already closed, or the first
    /// flush failure once every other batch has been written.
    pub fn close(&self) -> Result<ResolutionReport, ResolveError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ResolveError::Closed);
        }
        self.flush_all()?;
        let report = ResolutionReport::from_counts(&self.resolved, &self.unresolved);
        info!(
            "resolver closed: {} resolved, {} unresolved",
            report.total_resolved(),
            report.total_unresolved()
        );
        Ok(report)
    }

    /// Statements waiting in the batch of `kind`.
    #[must_use]
    pub fn pending(&self, kind: ReferenceKind) -> usize {
        self.batches
            .get(kind)
            .get()
            .map_or(0, |batch| batch.lock().len())
    }

    /// The run this resolver belongs to.
    #[must_use]
    pub const fn context(&self) -> &RunContext {
        &self.context
    }

    fn ensure_open(&self) -> Result<(), ResolveError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ResolveError::Closed)
        } else {
            Ok(())
        }
    }

    fn target(
        &self,
        flavor: CacheFlavor,
        external_id: &str,
    ) -> Result<Option<CacheEntry>, ResolveError> {
        Ok(self.context.caches().get(flavor).get(external_id)?)
    }

    fn resolve_basic(&self, reference: &BasicRef) -> Result<Option<PatchStatement>, ResolveError> {
        let Some(entry) = self.target(CacheFlavor::Object, &reference.target_id)? else {
            return Ok(None);
        };
        if matches!(reference.direction, BasicDirection::Reverse { .. })
            && !self.table_matches(&entry, &reference.table)
        {
            warn!(
                "type mismatch: {} is not stored in table {}",
                entry.external_id, reference.table
            );
            return Ok(None);
        }
        Ok(Some(patch::basic(reference, &entry)))
    }

    /// Whether `entry` lives in `table`. Unknown classes fall back to the
    /// entry's mapping tag; an empty tag is not checked.
    fn table_matches(&self, entry: &CacheEntry, table: &str) -> bool {
        let expected = entry
            .object_class_id
            .and_then(|class_id| self.context.schema().table_name(class_id))
            .unwrap_or(entry.mapping.as_str());
        expected.is_empty() || expected.eq_ignore_ascii_case(table)
    }

    fn read_file(&self, uri: &str) -> Result<Option<FileContents>, ResolveError> {
        let Some(path) = FileUri::parse(uri).resolve(&self.context.config().base_dir) else {
            return Ok(None);
        };
        let bytes = citylink_fs::read_optional(&path).map_err(|source| ResolveError::ReadFile {
            path: path.clone(),
            source,
        })?;
        Ok(bytes.map(|contents| FileContents {
            bytes: contents,
            mime_type: mime_type_for(&path),
        }))
    }

    fn enqueue(&self, kind: ReferenceKind, statement: PatchStatement) -> Result<(), ResolveError> {
        let batch = self.batches.get(kind).get_or_init(|| {
            debug!("created {} patcher", kind.label());
            Mutex::new(Vec::new())
        });
        let mut pending = batch.lock();
        pending.push(statement);
        if pending.len() < self.context.config().batch_size {
            return Ok(());
        }
        self.write_batch(kind, &mut pending).map(|_| ())
    }

    /// Flush every kind, carrying on past failures. Returns the number of
    /// statements written or the first failure.
    fn flush_all(&self) -> Result<usize, ResolveError> {
        let mut written = 0_usize;
        let mut first_error = None;
        for (kind, slot) in self.batches.iter() {
            let Some(batch) = slot.get() else {
                continue;
            };
            match self.write_batch(kind, &mut batch.lock()) {
                Ok(count) => written += count,
                Err(err) => {
                    warn!("failed to flush {} patches: {err}", kind.label());
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(written), Err)
    }

    /// Write `pending` in one transaction. The batch is only cleared, and
    /// counted as resolved, once the transaction commits.
    fn write_batch(
        &self,
        kind: ReferenceKind,
        pending: &mut Vec<PatchStatement>,
    ) -> Result<usize, ResolveError> {
        self.context.database().apply(pending)?;
        let written = pending.len();
        pending.clear();
        self.resolved.add(kind, written);
        Ok(written)
    }
}

fn describe(target: ReferenceTarget<'_>) -> String {
    match target {
        ReferenceTarget::Cached {
            flavor,
            external_id,
        } => format!("{external_id} in {}", flavor.table_name()),
        ReferenceTarget::File { uri } => format!("file {uri}"),
    }
}
