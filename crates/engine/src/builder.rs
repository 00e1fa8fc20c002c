//! ViewBuilder: entry points for rebuilding the views of a collection
//!
//! - `current_views`: stored design documents with each view's store name
//! - `rebuild`: upsert the given design documents, then rebuild them
//! - `rebuild_stored`: rebuild from the design documents already stored
//! - `drop_views`: remove every stored design document and its stores
//!
//! A run goes: (force: drop views) → upsert design documents → resolve
//! index stores → write `_local/mrviews` when anything is pending → pipeline
//! → sweep orphaned stores.

use tracing::{debug, info, warn};
use viewbuild_core::{Document, Object, DESIGN_PREFIX};
use viewbuild_storage::{AllDocsOptions, DocumentStore};

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildPhase, BuildResult};
use crate::lifecycle::{destroy_store, StoreLifecycle};
use crate::pipeline::{CancelToken, PendingView, RebuildPipeline, RebuildReport};
use crate::sweeper::sweep_orphans;
use crate::view::{DesignDoc, MapResolver, StoredDesignDoc};

/// Local document recording which stores each view depends on
pub const DEPENDENT_VIEWS_ID: &str = "_local/mrviews";

/// Upper bound for design document ids in range listings
const DESIGN_RANGE_END: &str = "_design/\u{ffff}";

/// Rebuilds the views of one source collection
pub struct ViewBuilder<'a> {
    source: &'a dyn DocumentStore,
    config: BuildConfig,
    cancel: CancelToken,
}

impl<'a> ViewBuilder<'a> {
    /// Builder with the default configuration
    pub fn new(source: &'a dyn DocumentStore) -> Self {
        Self {
            source,
            config: BuildConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Builder with `config`, validated up front
    pub fn with_config(source: &'a dyn DocumentStore, config: BuildConfig) -> BuildResult<Self> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Token that stops runs of this builder between write chunks
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stored design documents, each view annotated with its store name
    pub fn current_views(&self) -> BuildResult<Vec<StoredDesignDoc>> {
        self.design_documents()?
            .iter()
            .map(|doc| StoredDesignDoc::from_document(doc, self.source.name()))
            .collect()
    }

    /// Upsert `design_docs` and rebuild exactly their views
    pub fn rebuild(&self, design_docs: Vec<DesignDoc>) -> BuildResult<RebuildReport> {
        self.build(design_docs)
    }

    /// Rebuild the views of the stored design documents.
    ///
    /// Map functions are looked up by source text in `resolver`; an unknown
    /// source fails the run before anything is written.
    pub fn rebuild_stored(&self, resolver: &dyn MapResolver) -> BuildResult<RebuildReport> {
        let design_docs = self
            .current_views()?
            .iter()
            .map(|stored| DesignDoc::from_stored(stored, resolver))
            .collect::<BuildResult<Vec<_>>>()?;
        self.build(design_docs)
    }

    /// Remove every stored design document and the index stores of its views.
    ///
    /// Returns the store names removed.
    pub fn drop_views(&self) -> BuildResult<Vec<String>> {
        let mut removed = Vec::new();
        for doc in self.design_documents()? {
            match StoredDesignDoc::from_document(&doc, self.source.name()) {
                Ok(stored) => {
                    for view in &stored.views {
                        if let Some(name) = destroy_store(self.source, &view.signature)? {
                            removed.push(name);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        target: "viewbuild::build",
                        id = %doc.id,
                        error = %e,
                        "Dropping unreadable design document"
                    );
                }
            }
            let rev = doc.rev.clone().unwrap_or_default();
            self.source
                .remove(&doc.id, &rev)
                .map_err(|e| BuildError::store(BuildPhase::Setup, e))?;
            debug!(target: "viewbuild::build", id = %doc.id, "Removed design document");
        }
        Ok(removed)
    }

    fn design_documents(&self) -> BuildResult<Vec<Document>> {
        let rows = self
            .source
            .all_docs(&AllDocsOptions::with_docs().range(DESIGN_PREFIX, DESIGN_RANGE_END))
            .map_err(|e| BuildError::store(BuildPhase::Setup, e))?;
        Ok(rows.into_iter().filter_map(|row| row.doc).collect())
    }

    fn upsert(&self, mut doc: Document) -> BuildResult<()> {
        let id = doc.id.clone();
        let existing = self
            .source
            .get(&id)
            .map_err(|source| BuildError::DefinitionUpsert {
                id: id.clone(),
                source,
            })?;
        doc.rev = existing.and_then(|d| d.rev);
        self.source
            .put(doc)
            .map_err(|source| BuildError::DefinitionUpsert { id, source })?;
        Ok(())
    }

    fn build(&self, design_docs: Vec<DesignDoc>) -> BuildResult<RebuildReport> {
        let force = self.config.force_rebuild;
        let mut report = RebuildReport::default();
        info!(
            target: "viewbuild::build",
            collection = %self.source.name(),
            design_docs = design_docs.len(),
            force,
            "Starting view build"
        );

        if force {
            report.stores_removed.extend(self.drop_views()?);
        }

        for design in &design_docs {
            self.upsert(design.to_document())?;
        }

        let mut lifecycle = StoreLifecycle::new(self.source);
        let mut pending = Vec::new();
        let mut dependents = Object::new();
        for design in &design_docs {
            for view in design.views() {
                let qualified = design.qualified_name(view);
                let resolution = lifecycle.resolve(view, force)?;

                let mut stores = Object::new();
                stores.insert(resolution.store_name.clone(), true);
                dependents.insert(qualified.clone(), stores);

                match resolution.store {
                    Some(store) if resolution.needs_rebuild => pending.push(PendingView {
                        view: qualified,
                        store_name: resolution.store_name,
                        map: view.map().clone(),
                        store,
                    }),
                    _ => report.views_skipped.push(qualified),
                }
            }
        }
        let (should_exist, created, removed) = lifecycle.into_parts();
        report.stores_created = created;
        report.stores_removed.extend(removed);

        if pending.is_empty() {
            info!(target: "viewbuild::build", "No view needs rebuild");
        } else {
            let mut record = Object::new();
            record.insert("views", dependents);
            self.upsert(Document::new(DEPENDENT_VIEWS_ID, record))?;

            RebuildPipeline::new(self.source, &self.config, self.cancel.clone())
                .run(&pending, &mut report)?;
        }

        report
            .stores_removed
            .extend(sweep_orphans(self.source, &should_exist)?);

        info!(
            target: "viewbuild::build",
            rebuilt = pending.len(),
            skipped = report.views_skipped.len(),
            docs = report.documents_scanned,
            removed = report.stores_removed.len(),
            "View build finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{MapFunction, MapRegistry, ViewDefinition};
    use viewbuild_core::{value, Value};
    use viewbuild_storage::Collection;

    const BY_NAME: &str = "function (doc) { emit(doc.name) }";

    fn by_name() -> MapFunction {
        MapFunction::new(BY_NAME, |doc, emit| {
            if let Some(name) = doc.get("name") {
                emit.emit_key(name.clone());
            }
            Ok(())
        })
    }

    fn seeded() -> Collection {
        let db = Collection::in_memory("db");
        for (id, name) in [("a", "foo"), ("b", "bar"), ("c", "baz")] {
            let body = value!({ "name": name }).into_object().unwrap();
            db.put(Document::new(id, body)).unwrap();
        }
        db
    }

    fn design() -> DesignDoc {
        DesignDoc::new("idx").with_view(ViewDefinition::new("by_name", by_name()))
    }

    #[test]
    fn test_rebuild_upserts_design_and_records_dependents() {
        let db = seeded();
        let report = ViewBuilder::new(&db).rebuild(vec![design()]).unwrap();
        assert_eq!(report.entries_for("idx/by_name"), 3);
        assert_eq!(report.stores_created.len(), 1);

        let stored = db.get("_design/idx").unwrap().unwrap();
        assert_eq!(
            stored.get("views").and_then(|v| v.get("by_name")).and_then(|v| v.get("map")),
            Some(&Value::from(BY_NAME))
        );

        let record = db.get(DEPENDENT_VIEWS_ID).unwrap().unwrap();
        let stores = record
            .get("views")
            .and_then(|v| v.get("idx/by_name"))
            .and_then(Value::as_object)
            .unwrap();
        assert_eq!(stores.get(&report.stores_created[0]), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_second_run_skips_fresh_views() {
        let db = seeded();
        let builder = ViewBuilder::new(&db);
        builder.rebuild(vec![design()]).unwrap();
        let report = builder.rebuild(vec![design()]).unwrap();
        assert_eq!(report.map_evaluations, 0);
        assert_eq!(report.views_skipped, vec!["idx/by_name"]);
        assert!(report.stores_created.is_empty());
        assert!(report.stores_removed.is_empty());
    }

    #[test]
    fn test_current_views_reports_store_names() {
        let db = seeded();
        let builder = ViewBuilder::new(&db);
        assert!(builder.current_views().unwrap().is_empty());

        let report = builder.rebuild(vec![design()]).unwrap();
        let views = builder.current_views().unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, "_design/idx");
        assert_eq!(views[0].views[0].store_name, report.stores_created[0]);
    }

    #[test]
    fn test_rebuild_stored_uses_resolver() {
        let db = seeded();
        let builder = ViewBuilder::new(&db);
        builder.rebuild(vec![design()]).unwrap();

        let forced = ViewBuilder::with_config(&db, BuildConfig::forced()).unwrap();
        let registry = MapRegistry::new().with(by_name());
        let report = forced.rebuild_stored(&registry).unwrap();
        assert_eq!(report.entries_for("idx/by_name"), 3);
        assert_eq!(report.stores_removed.len(), 1);
        assert_eq!(report.stores_created, report.stores_removed);
        assert!(db.get("_design/idx").unwrap().is_some());

        let err = builder.rebuild_stored(&MapRegistry::new()).unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedMap { .. }));
    }

    #[test]
    fn test_drop_views() {
        let db = seeded();
        let builder = ViewBuilder::new(&db);
        let report = builder.rebuild(vec![design()]).unwrap();

        let removed = builder.drop_views().unwrap();
        assert_eq!(removed, report.stores_created);
        assert!(db.get("_design/idx").unwrap().is_none());
        assert!(builder.current_views().unwrap().is_empty());
        assert!(db.list_dependents("db-mrview-").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let db = seeded();
        let config = BuildConfig {
            chunk_size_write: 0,
            ..BuildConfig::default()
        };
        assert!(matches!(
            ViewBuilder::with_config(&db, config),
            Err(BuildError::InvalidConfig(_))
        ));
    }
}
