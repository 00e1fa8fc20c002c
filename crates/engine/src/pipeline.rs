//! Batch rebuild pipeline
//!
//! Streams the source collection once and fills every pending index store:
//! 1. list all ids
//! 2. fetch documents by id in read chunks
//! 3. evaluate every pending view over each write chunk, then issue one bulk
//!    write per view; the writes of one chunk run in parallel and are joined
//!    before the next chunk starts
//! 4. record the checkpoint in each store
//! 5. close every store handle
//!
//! The checkpoint is the source's latest change sequence, read before the
//! scan starts. A cancelled or failed run leaves its stores without a
//! checkpoint, so the next run re-creates them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};
use viewbuild_core::Document;
use viewbuild_storage::{AllDocsOptions, BulkResult, ChangesOptions, DocumentStore, StoreError};

use crate::config::{BuildConfig, MapErrorPolicy};
use crate::error::{BuildError, BuildPhase, BuildResult};
use crate::evaluator::evaluate;
use crate::index_keys::{checkpoint_doc, index_writes, LAST_SEQ_ID};
use crate::view::MapFunction;

/// Shared stop flag, checked between write chunks
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the run to stop
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A map failure recorded under [`MapErrorPolicy::Isolate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewFailure {
    /// Fully-qualified view name (`design/view`)
    pub view: String,
    /// Document the map function failed on
    pub doc_id: String,
    /// Error reported by the map function
    pub message: String,
}

/// What a rebuild run did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildReport {
    /// Source documents evaluated (internal, deleted and missing rows excluded)
    pub documents_scanned: usize,
    /// Map function calls, over all views
    pub map_evaluations: usize,
    /// Index entries written, per view
    pub entries_written: BTreeMap<String, usize>,
    /// Views left alone: store fresh, or shared with a view built this run
    pub views_skipped: Vec<String>,
    /// Isolated map failures
    pub failures: Vec<ViewFailure>,
    /// Index stores created this run
    pub stores_created: Vec<String>,
    /// Index stores destroyed this run (recreated, dropped or swept)
    pub stores_removed: Vec<String>,
    /// Checkpoint recorded in the rebuilt stores
    pub checkpoint: Option<u64>,
}

impl RebuildReport {
    /// Entries written for `view`
    pub fn entries_for(&self, view: &str) -> usize {
        self.entries_written.get(view).copied().unwrap_or(0)
    }
}

/// A view whose store this run populates
#[derive(Clone)]
pub struct PendingView {
    /// Fully-qualified view name (`design/view`)
    pub view: String,
    /// Index store name
    pub store_name: String,
    /// Map function
    pub map: MapFunction,
    /// Writable store handle
    pub store: Arc<dyn DocumentStore>,
}

/// Runs one rebuild over a source collection
pub struct RebuildPipeline<'a> {
    source: &'a dyn DocumentStore,
    config: &'a BuildConfig,
    cancel: CancelToken,
}

impl<'a> RebuildPipeline<'a> {
    /// Pipeline over `source`
    pub fn new(
        source: &'a dyn DocumentStore,
        config: &'a BuildConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            source,
            config,
            cancel,
        }
    }

    /// Populate every pending view, then close their stores.
    ///
    /// Stores are closed whether or not the run succeeded; close errors are
    /// logged and dropped.
    pub fn run(&self, views: &[PendingView], report: &mut RebuildReport) -> BuildResult<()> {
        let outcome = self.populate(views, report);
        for view in views {
            if let Err(e) = view.store.close() {
                warn!(
                    target: "viewbuild::build",
                    store = %view.store_name,
                    error = %e,
                    "Ignoring error closing index store"
                );
            }
        }
        outcome
    }

    fn populate(&self, views: &[PendingView], report: &mut RebuildReport) -> BuildResult<()> {
        let latest_seq = self.latest_seq();

        let ids: Vec<String> = self
            .source
            .all_docs(&AllDocsOptions::default())
            .map_err(|e| BuildError::store(BuildPhase::Evaluate, e))?
            .into_iter()
            .map(|row| row.id)
            .collect();
        let total = ids.len();
        info!(
            target: "viewbuild::build",
            docs = total,
            views = views.len(),
            "Rebuilding views"
        );

        for (chunk, read_ids) in ids.chunks(self.config.chunk_size_read).enumerate() {
            let rows = self
                .source
                .all_docs(&AllDocsOptions::for_keys(read_ids.to_vec()))
                .map_err(|e| BuildError::store(BuildPhase::Evaluate, e))?;
            debug!(target: "viewbuild::build", chunk, docs = rows.len(), "Read chunk");

            for write_rows in rows.chunks(self.config.chunk_size_write) {
                if self.cancel.is_cancelled() {
                    info!(target: "viewbuild::build", chunk, "Rebuild cancelled");
                    return Err(BuildError::Cancelled);
                }

                let docs: Vec<&Document> = write_rows
                    .iter()
                    .filter(|row| !row.is_unusable())
                    .filter_map(|row| row.doc.as_ref())
                    .filter(|doc| !doc.is_internal())
                    .collect();
                report.documents_scanned += docs.len();

                let batches = self.evaluate_chunk(views, &docs, report)?;
                self.write_chunk(views, batches, report)?;
            }
        }

        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let checkpoint = match latest_seq {
            Some(seq) if seq > 0 => seq,
            _ => {
                warn!(
                    target: "viewbuild::build",
                    fallback = total,
                    "Change sequence unavailable, checkpointing at document count"
                );
                total as u64
            }
        };
        self.write_checkpoint(views, checkpoint)?;
        report.checkpoint = Some(checkpoint);
        Ok(())
    }

    fn latest_seq(&self) -> Option<u64> {
        match self.source.changes(&ChangesOptions::latest()) {
            Ok(changes) => Some(changes.last_seq),
            Err(e) => {
                warn!(target: "viewbuild::build", error = %e, "Failed to read change sequence");
                None
            }
        }
    }

    /// Evaluate every view over `docs`; one write batch per view
    fn evaluate_chunk(
        &self,
        views: &[PendingView],
        docs: &[&Document],
        report: &mut RebuildReport,
    ) -> BuildResult<Vec<Vec<Document>>> {
        let mut batches: Vec<Vec<Document>> = vec![Vec::new(); views.len()];

        for doc in docs {
            for (view, batch) in views.iter().zip(batches.iter_mut()) {
                report.map_evaluations += 1;
                match evaluate(doc, &view.map) {
                    Ok(emissions) => batch.extend(index_writes(&doc.id, &emissions)),
                    Err(e) => match self.config.on_map_error {
                        MapErrorPolicy::FailFast => {
                            return Err(BuildError::MapEvaluation {
                                view: view.view.clone(),
                                doc_id: doc.id.clone(),
                                message: e.to_string(),
                            });
                        }
                        MapErrorPolicy::Isolate => {
                            warn!(
                                target: "viewbuild::build",
                                view = %view.view,
                                doc_id = %doc.id,
                                error = %e,
                                "Map function failed, skipping document"
                            );
                            report.failures.push(ViewFailure {
                                view: view.view.clone(),
                                doc_id: doc.id.clone(),
                                message: e.to_string(),
                            });
                        }
                    },
                }
            }
        }

        Ok(batches)
    }

    /// One bulk write per view, in parallel
    fn write_chunk(
        &self,
        views: &[PendingView],
        batches: Vec<Vec<Document>>,
        report: &mut RebuildReport,
    ) -> BuildResult<()> {
        let written: Vec<(usize, usize)> = views
            .par_iter()
            .zip(batches.into_par_iter())
            .enumerate()
            .filter(|(_, (_, batch))| !batch.is_empty())
            .map(|(i, (view, batch))| {
                let results = view
                    .store
                    .bulk_docs(batch)
                    .map_err(|e| BuildError::store(BuildPhase::Write, e))?;
                let rejected = results.iter().filter(|r| !r.is_ok()).count();
                if let Some(first) = results.iter().find(|r| !r.is_ok()) {
                    warn!(
                        target: "viewbuild::build",
                        view = %view.view,
                        rejected,
                        first = %first.id,
                        "Index store rejected writes"
                    );
                    return Err(BuildError::store(BuildPhase::Write, rejection(first)));
                }
                let entries = results
                    .iter()
                    .filter(|r| r.is_ok() && !r.id.starts_with(viewbuild_core::LOCAL_PREFIX))
                    .count();
                Ok((i, entries))
            })
            .collect::<BuildResult<Vec<_>>>()?;

        for (i, entries) in written {
            *report
                .entries_written
                .entry(views[i].view.clone())
                .or_insert(0) += entries;
        }
        Ok(())
    }

    fn write_checkpoint(&self, views: &[PendingView], seq: u64) -> BuildResult<()> {
        views.par_iter().try_for_each(|view| {
            let mut doc = checkpoint_doc(seq);
            doc.rev = view
                .store
                .get(LAST_SEQ_ID)
                .map_err(|e| BuildError::store(BuildPhase::Checkpoint, e))?
                .and_then(|existing| existing.rev);
            view.store
                .put(doc)
                .map_err(|e| BuildError::store(BuildPhase::Checkpoint, e))?;
            debug!(target: "viewbuild::build", store = %view.store_name, seq, "Recorded checkpoint");
            Ok(())
        })
    }
}

/// Store error for a write the index store refused
fn rejection(result: &BulkResult) -> StoreError {
    let id = result.id.clone();
    match result.error.as_deref() {
        Some("conflict") => StoreError::Conflict { id },
        Some("not_found") => StoreError::NotFound { id },
        other => StoreError::Corruption(format!(
            "write of {} rejected: {}",
            id,
            other.unwrap_or("unknown error")
        )),
    }
}
