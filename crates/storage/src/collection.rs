//! Collection: the DocumentStore implementation
//!
//! A collection keeps its documents in a `BTreeMap` guarded by a
//! `parking_lot::RwLock`, with a sequence index for the change feed:
//! - `docs`: id → latest revision (tombstones included, for `changes`)
//! - `by_seq`: sequence → id, one entry per id (its latest write)
//! - `locals`: `_local/` documents, outside both listings
//!
//! # Backings
//!
//! - **Memory**: dependents live in a catalog shared by the root collection
//!   and every dependent opened from it.
//! - **Disk**: a collection is a directory holding a record log. Dependents
//!   are sibling directories named after the dependent store.
//!
//! Revisions are `<generation>-<xxh3 of body>`; generations continue across
//! deletions so a re-created document never reuses a revision.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use viewbuild_core::Document;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{StoreError, StoreResult};
use crate::record_log::{LogRecord, RecordLog, LOG_FILE_NAME};
use crate::store::{
    AllDocsOptions, AllDocsRow, BulkResult, ChangeRow, Changes, ChangesOptions, DocumentStore,
};

/// Compaction runs when superseded records exceed live records by this much
const COMPACTION_SLACK: u64 = 64;

/// Summary of a collection's contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Collection name
    pub name: String,
    /// Live (non-deleted) documents, excluding local documents
    pub doc_count: usize,
    /// Highest assigned sequence number
    pub update_seq: u64,
}

#[derive(Debug, Clone)]
struct StoredDoc {
    doc: Document,
    seq: u64,
}

/// Prior state of one id, kept until its write is persisted
#[derive(Debug)]
enum Undo {
    Doc {
        id: String,
        prev: Option<StoredDoc>,
        update_seq: u64,
    },
    Local {
        id: String,
        prev: Option<Document>,
    },
}

#[derive(Debug, Default)]
struct CollectionState {
    docs: BTreeMap<String, StoredDoc>,
    by_seq: BTreeMap<u64, String>,
    locals: BTreeMap<String, Document>,
    update_seq: u64,
}

impl CollectionState {
    fn live(&self, id: &str) -> Option<&Document> {
        self.docs
            .get(id)
            .map(|s| &s.doc)
            .filter(|d| !d.deleted)
    }

    fn replay(&mut self, record: LogRecord) {
        match record {
            LogRecord::Doc { seq, doc } => {
                self.update_seq = self.update_seq.max(seq);
                self.insert_doc(seq, doc);
            }
            LogRecord::Local { doc } => {
                if doc.deleted {
                    self.locals.remove(&doc.id);
                } else {
                    self.locals.insert(doc.id.clone(), doc);
                }
            }
        }
    }

    fn insert_doc(&mut self, seq: u64, doc: Document) {
        if let Some(prev) = self.docs.get(&doc.id) {
            self.by_seq.remove(&prev.seq);
        }
        self.by_seq.insert(seq, doc.id.clone());
        self.docs.insert(doc.id.clone(), StoredDoc { doc, seq });
    }

    /// Validate and apply one write, returning the record to persist
    fn apply(&mut self, mut doc: Document) -> StoreResult<LogRecord> {
        let is_local = doc.is_local();
        let (live_rev, generation) = if is_local {
            let current = self.locals.get(&doc.id);
            (
                current.and_then(|d| d.rev.clone()),
                current.map(Document::generation).unwrap_or(0),
            )
        } else {
            let current = self.docs.get(&doc.id).map(|s| &s.doc);
            (
                current.filter(|d| !d.deleted).and_then(|d| d.rev.clone()),
                current.map(Document::generation).unwrap_or(0),
            )
        };

        if doc.deleted && live_rev.is_none() {
            return Err(StoreError::NotFound { id: doc.id });
        }
        if doc.rev != live_rev {
            return Err(StoreError::Conflict { id: doc.id });
        }
        if doc.deleted {
            doc.body = Default::default();
        }

        doc.rev = Some(next_revision(generation, &doc)?);

        if is_local {
            if doc.deleted {
                self.locals.remove(&doc.id);
            } else {
                self.locals.insert(doc.id.clone(), doc.clone());
            }
            Ok(LogRecord::Local { doc })
        } else {
            self.update_seq += 1;
            let seq = self.update_seq;
            self.insert_doc(seq, doc.clone());
            Ok(LogRecord::Doc { seq, doc })
        }
    }

    /// What `apply(doc)` is about to overwrite
    fn undo_for(&self, doc: &Document) -> Undo {
        if doc.is_local() {
            Undo::Local {
                id: doc.id.clone(),
                prev: self.locals.get(&doc.id).cloned(),
            }
        } else {
            Undo::Doc {
                id: doc.id.clone(),
                prev: self.docs.get(&doc.id).cloned(),
                update_seq: self.update_seq,
            }
        }
    }

    /// Revert applied writes, most recent first
    fn rollback(&mut self, undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Local { id, prev } => match prev {
                    Some(doc) => {
                        self.locals.insert(id, doc);
                    }
                    None => {
                        self.locals.remove(&id);
                    }
                },
                Undo::Doc {
                    id,
                    prev,
                    update_seq,
                } => {
                    if let Some(current) = self.docs.remove(&id) {
                        self.by_seq.remove(&current.seq);
                    }
                    if let Some(stored) = prev {
                        self.by_seq.insert(stored.seq, id.clone());
                        self.docs.insert(id, stored);
                    }
                    self.update_seq = update_seq;
                }
            }
        }
    }

    fn snapshot_records(&self) -> Vec<LogRecord> {
        let mut records: Vec<LogRecord> = self
            .by_seq
            .iter()
            .filter_map(|(seq, id)| {
                self.docs.get(id).map(|s| LogRecord::Doc {
                    seq: *seq,
                    doc: s.doc.clone(),
                })
            })
            .collect();
        records.extend(
            self.locals
                .values()
                .map(|doc| LogRecord::Local { doc: doc.clone() }),
        );
        records
    }

    fn record_count(&self) -> u64 {
        (self.docs.len() + self.locals.len()) as u64
    }
}

fn next_revision(generation: u64, doc: &Document) -> StoreResult<String> {
    let bytes = rmp_serde::to_vec(&(&doc.body, doc.deleted, generation))?;
    Ok(format!("{}-{:016x}", generation + 1, xxh3_64(&bytes)))
}

fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Shared state behind every handle on one collection
#[derive(Debug)]
struct CollectionCore {
    name: String,
    state: RwLock<CollectionState>,
    log: Option<Mutex<RecordLog>>,
    auto_compaction: AtomicBool,
    closed: AtomicBool,
}

impl CollectionCore {
    fn new(name: String, state: CollectionState, log: Option<RecordLog>) -> Self {
        Self {
            name,
            state: RwLock::new(state),
            log: log.map(Mutex::new),
            auto_compaction: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }
}

/// Catalog of in-memory dependent stores
#[derive(Debug, Default)]
struct MemoryCatalog {
    stores: Mutex<BTreeMap<String, Arc<CollectionCore>>>,
}

#[derive(Debug, Clone)]
enum Backing {
    Memory { catalog: Arc<MemoryCatalog> },
    Disk { parent: PathBuf },
}

/// A document collection, in memory or on disk
#[derive(Debug)]
pub struct Collection {
    core: Arc<CollectionCore>,
    backing: Backing,
}

impl Collection {
    /// Create an empty in-memory collection with its own dependent catalog
    pub fn in_memory(name: impl Into<String>) -> Self {
        let name = name.into();
        Collection {
            core: Arc::new(CollectionCore::new(name, CollectionState::default(), None)),
            backing: Backing::Memory {
                catalog: Arc::new(MemoryCatalog::default()),
            },
        }
    }

    /// Open (or create) the disk collection stored in directory `dir`.
    ///
    /// The collection is named after the directory; dependents are created
    /// next to it.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StoreError::InvalidName(dir.display().to_string()))?;
        validate_name(&name)?;
        let parent = dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        fs::create_dir_all(dir)?;
        let (log, records) = RecordLog::open(&dir.join(LOG_FILE_NAME))?;
        let replayed = records.len();
        let mut state = CollectionState::default();
        for record in records {
            state.replay(record);
        }

        debug!(
            target: "viewbuild::store",
            name = %name,
            replayed,
            update_seq = state.update_seq,
            "Opened disk collection"
        );

        Ok(Collection {
            core: Arc::new(CollectionCore::new(name, state, Some(log))),
            backing: Backing::Disk { parent },
        })
    }

    /// Document count and latest sequence
    pub fn info(&self) -> StoreResult<CollectionInfo> {
        self.check_open()?;
        let state = self.core.state.read();
        Ok(CollectionInfo {
            name: self.core.name.clone(),
            doc_count: state.docs.values().filter(|s| !s.doc.deleted).count(),
            update_seq: state.update_seq,
        })
    }

    /// Rewrite the record log to hold only the latest revision of each id.
    ///
    /// No-op for memory collections.
    pub fn compact(&self) -> StoreResult<()> {
        self.check_open()?;
        self.compact_inner()
    }

    fn compact_inner(&self) -> StoreResult<()> {
        let Some(log) = &self.core.log else {
            return Ok(());
        };
        let state = self.core.state.read();
        let mut log = log.lock();
        let before = log.appended();
        let records = state.snapshot_records();
        log.rewrite(&records)?;
        info!(
            target: "viewbuild::store",
            name = %self.core.name,
            before,
            after = records.len(),
            "Compacted record log"
        );
        Ok(())
    }

    fn needs_compaction(&self) -> bool {
        let Some(log) = &self.core.log else {
            return false;
        };
        let live = self.core.state.read().record_count();
        log.lock().appended() > live.saturating_mul(2) + COMPACTION_SLACK
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed(self.core.name.clone()));
        }
        Ok(())
    }

    /// Apply writes under the state lock and persist them before releasing it
    fn write_batch(&self, docs: Vec<Document>) -> StoreResult<Vec<StoreResult<String>>> {
        self.check_open()?;
        let mut state = self.core.state.write();
        let mut records = Vec::with_capacity(docs.len());
        let mut outcomes = Vec::with_capacity(docs.len());
        let mut undo = Vec::with_capacity(docs.len());
        for doc in docs {
            let prior = state.undo_for(&doc);
            match state.apply(doc) {
                Ok(record) => {
                    undo.push(prior);
                    let rev = match &record {
                        LogRecord::Doc { doc, .. } | LogRecord::Local { doc } => {
                            doc.rev.clone().unwrap_or_default()
                        }
                    };
                    records.push(record);
                    outcomes.push(Ok(rev));
                }
                Err(e) => outcomes.push(Err(e)),
            }
        }
        if let Some(log) = &self.core.log {
            if let Err(e) = log.lock().append(&records) {
                state.rollback(undo);
                return Err(e);
            }
        }
        drop(state);

        if self.core.auto_compaction.load(Ordering::Relaxed) && self.needs_compaction() {
            self.compact_inner()?;
        }
        Ok(outcomes)
    }

    fn dependent_dir(&self, parent: &Path, name: &str) -> StoreResult<PathBuf> {
        validate_name(name)?;
        Ok(parent.join(name))
    }
}

impl DocumentStore for Collection {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn get(&self, id: &str) -> StoreResult<Option<Document>> {
        self.check_open()?;
        let state = self.core.state.read();
        if id.starts_with(viewbuild_core::LOCAL_PREFIX) {
            return Ok(state.locals.get(id).cloned());
        }
        Ok(state.live(id).cloned())
    }

    fn put(&self, doc: Document) -> StoreResult<String> {
        let mut outcomes = self.write_batch(vec![doc])?;
        outcomes
            .pop()
            .unwrap_or_else(|| Err(StoreError::Corruption("write produced no outcome".into())))
    }

    fn remove(&self, id: &str, rev: &str) -> StoreResult<String> {
        self.put(Document::tombstone(id, Some(rev.to_string())))
    }

    fn bulk_docs(&self, docs: Vec<Document>) -> StoreResult<Vec<BulkResult>> {
        let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        let outcomes = self.write_batch(docs)?;
        Ok(ids
            .into_iter()
            .zip(outcomes)
            .map(|(id, outcome)| match outcome {
                Ok(rev) => BulkResult {
                    id,
                    rev: Some(rev),
                    error: None,
                },
                Err(e) => BulkResult {
                    id,
                    rev: None,
                    error: Some(match e {
                        StoreError::Conflict { .. } => "conflict".to_string(),
                        StoreError::NotFound { .. } => "not_found".to_string(),
                        other => other.to_string(),
                    }),
                },
            })
            .collect())
    }

    fn all_docs(&self, opts: &AllDocsOptions) -> StoreResult<Vec<AllDocsRow>> {
        self.check_open()?;
        let state = self.core.state.read();

        let row_for = |stored: &StoredDoc| AllDocsRow {
            id: stored.doc.id.clone(),
            rev: stored.doc.rev.clone(),
            doc: (opts.include_docs && !stored.doc.deleted).then(|| stored.doc.clone()),
            deleted: stored.doc.deleted,
            error: None,
        };

        if let Some(keys) = &opts.keys {
            return Ok(keys
                .iter()
                .map(|key| match state.docs.get(key) {
                    Some(stored) => row_for(stored),
                    None => AllDocsRow {
                        id: key.clone(),
                        rev: None,
                        doc: None,
                        deleted: false,
                        error: Some("not_found".to_string()),
                    },
                })
                .collect());
        }

        let lower = opts
            .start_key
            .clone()
            .map_or(Bound::Unbounded, Bound::Included);
        let upper = opts
            .end_key
            .clone()
            .map_or(Bound::Unbounded, Bound::Included);
        if let (Some(start), Some(end)) = (&opts.start_key, &opts.end_key) {
            if start > end {
                return Ok(Vec::new());
            }
        }

        Ok(state
            .docs
            .range::<String, _>((lower, upper))
            .map(|(_, stored)| stored)
            .filter(|stored| !stored.doc.deleted)
            .map(row_for)
            .collect())
    }

    fn changes(&self, opts: &ChangesOptions) -> StoreResult<Changes> {
        self.check_open()?;
        let state = self.core.state.read();
        let limit = opts.limit.unwrap_or(usize::MAX);

        let to_row = |(seq, id): (&u64, &String)| {
            state.docs.get(id).map(|stored| ChangeRow {
                seq: *seq,
                id: id.clone(),
                rev: stored.doc.rev.clone().unwrap_or_default(),
                deleted: stored.doc.deleted,
            })
        };

        let range = state
            .by_seq
            .range((Bound::Excluded(opts.since), Bound::Unbounded));
        let results: Vec<ChangeRow> = if opts.descending {
            range.rev().filter_map(to_row).take(limit).collect()
        } else {
            range.filter_map(to_row).take(limit).collect()
        };
        let last_seq = results.last().map_or(opts.since, |row| row.seq);

        Ok(Changes { results, last_seq })
    }

    fn register_dependent(&self, name: &str) -> StoreResult<Arc<dyn DocumentStore>> {
        self.check_open()?;
        match &self.backing {
            Backing::Memory { catalog } => {
                validate_name(name)?;
                let mut stores = catalog.stores.lock();
                let core = stores
                    .entry(name.to_string())
                    .or_insert_with(|| {
                        Arc::new(CollectionCore::new(
                            name.to_string(),
                            CollectionState::default(),
                            None,
                        ))
                    })
                    .clone();
                core.closed.store(false, Ordering::Release);
                Ok(Arc::new(Collection {
                    core,
                    backing: self.backing.clone(),
                }))
            }
            Backing::Disk { parent } => {
                let dir = self.dependent_dir(parent, name)?;
                Ok(Arc::new(Collection::open(dir)?))
            }
        }
    }

    fn dependent_exists(&self, name: &str) -> StoreResult<bool> {
        match &self.backing {
            Backing::Memory { catalog } => Ok(catalog.stores.lock().contains_key(name)),
            Backing::Disk { parent } => Ok(self.dependent_dir(parent, name)?.is_dir()),
        }
    }

    fn remove_dependent(&self, name: &str) -> StoreResult<()> {
        match &self.backing {
            Backing::Memory { catalog } => {
                if let Some(core) = catalog.stores.lock().remove(name) {
                    core.closed.store(true, Ordering::Release);
                }
            }
            Backing::Disk { parent } => {
                let dir = self.dependent_dir(parent, name)?;
                if dir.is_dir() {
                    fs::remove_dir_all(&dir)?;
                }
            }
        }
        debug!(target: "viewbuild::store", source = %self.core.name, name, "Removed dependent store");
        Ok(())
    }

    fn list_dependents(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut names = match &self.backing {
            Backing::Memory { catalog } => catalog
                .stores
                .lock()
                .keys()
                .filter(|name| name.starts_with(prefix))
                .cloned()
                .collect::<Vec<_>>(),
            Backing::Disk { parent } => {
                let mut names = Vec::new();
                for entry in fs::read_dir(parent)? {
                    let entry = entry?;
                    if !entry.file_type()?.is_dir() {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name.starts_with(prefix) && name != self.core.name {
                        names.push(name);
                    }
                }
                names
            }
        };
        names.sort();
        Ok(names)
    }

    fn set_auto_compaction(&self, enabled: bool) {
        self.core.auto_compaction.store(enabled, Ordering::Relaxed);
    }

    fn close(&self) -> StoreResult<()> {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.core.auto_compaction.load(Ordering::Relaxed) && self.needs_compaction() {
            self.compact_inner()?;
        }
        debug!(target: "viewbuild::store", name = %self.core.name, "Closed collection");
        Ok(())
    }
}
