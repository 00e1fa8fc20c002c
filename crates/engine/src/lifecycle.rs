//! Index store lifecycle
//!
//! Decides, per view, whether its index store can be reused or must be
//! (re)built:
//! - force: any existing store is destroyed and a fresh one created
//! - existing store with a `_local/lastSeq` checkpoint: fresh, skipped
//! - existing store without a checkpoint: left by an interrupted run,
//!   destroyed and re-created
//! - no store: created
//!
//! Every resolved name joins the should-exist set handed to the sweeper.
//! Views sharing a signature share a store, which is built once per run.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};
use viewbuild_storage::{DocumentStore, StoreError};

use crate::error::{BuildError, BuildPhase, BuildResult};
use crate::index_keys::LAST_SEQ_ID;
use crate::signature::{store_name, Signature};
use crate::view::ViewDefinition;

/// Outcome of resolving one view
#[derive(Clone)]
pub struct Resolution {
    /// Index store name
    pub store_name: String,
    /// View signature
    pub signature: Signature,
    /// Whether this run must populate the store
    pub needs_rebuild: bool,
    /// Writable handle, present when `needs_rebuild`
    pub store: Option<Arc<dyn DocumentStore>>,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("store_name", &self.store_name)
            .field("signature", &self.signature)
            .field("needs_rebuild", &self.needs_rebuild)
            .finish()
    }
}

/// Resolves index stores for the views of one run
pub struct StoreLifecycle<'a> {
    source: &'a dyn DocumentStore,
    should_exist: BTreeSet<String>,
    created: Vec<String>,
    removed: Vec<String>,
}

impl<'a> StoreLifecycle<'a> {
    /// Lifecycle manager over the dependents of `source`
    pub fn new(source: &'a dyn DocumentStore) -> Self {
        Self {
            source,
            should_exist: BTreeSet::new(),
            created: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Resolve the index store of `view`
    pub fn resolve(&mut self, view: &ViewDefinition, force: bool) -> BuildResult<Resolution> {
        let signature = view.signature();
        let name = store_name(self.source.name(), &signature);

        if !self.should_exist.insert(name.clone()) {
            debug!(target: "viewbuild::build", store = %name, "Store already resolved in this run");
            return Ok(Resolution {
                store_name: name,
                signature,
                needs_rebuild: false,
                store: None,
            });
        }

        let exists = self.source.dependent_exists(&name).map_err(resolve_err)?;
        if exists {
            if force {
                self.destroy(&name)?;
            } else if self.has_checkpoint(&name)? {
                debug!(target: "viewbuild::build", store = %name, "Index store is fresh");
                return Ok(Resolution {
                    store_name: name,
                    signature,
                    needs_rebuild: false,
                    store: None,
                });
            } else {
                info!(
                    target: "viewbuild::build",
                    store = %name,
                    "Index store has no checkpoint, re-creating"
                );
                self.destroy(&name)?;
            }
        }

        let store = self.source.register_dependent(&name).map_err(resolve_err)?;
        store.set_auto_compaction(true);
        self.created.push(name.clone());
        debug!(target: "viewbuild::build", store = %name, "Created index store");

        Ok(Resolution {
            store_name: name,
            signature,
            needs_rebuild: true,
            store: Some(store),
        })
    }

    fn has_checkpoint(&self, name: &str) -> BuildResult<bool> {
        let store = self.source.register_dependent(name).map_err(resolve_err)?;
        let checkpoint = store.get(LAST_SEQ_ID).map_err(resolve_err);
        if let Err(e) = store.close() {
            debug!(target: "viewbuild::build", store = %name, error = %e, "Ignoring close error");
        }
        Ok(checkpoint?.is_some())
    }

    fn destroy(&mut self, name: &str) -> BuildResult<()> {
        self.source.remove_dependent(name).map_err(resolve_err)?;
        self.removed.push(name.to_string());
        Ok(())
    }

    /// Names that must survive the sweep
    pub fn should_exist(&self) -> &BTreeSet<String> {
        &self.should_exist
    }

    /// Stores created (or re-created) so far
    pub fn created(&self) -> &[String] {
        &self.created
    }

    /// Stores destroyed so far
    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    /// Consume into `(should_exist, created, removed)`
    pub fn into_parts(self) -> (BTreeSet<String>, Vec<String>, Vec<String>) {
        (self.should_exist, self.created, self.removed)
    }
}

fn resolve_err(source: StoreError) -> BuildError {
    BuildError::store(BuildPhase::Resolve, source)
}

/// Destroy the store of `signature` if present; used when dropping views
pub(crate) fn destroy_store(
    source: &dyn DocumentStore,
    signature: &Signature,
) -> BuildResult<Option<String>> {
    let name = store_name(source.name(), signature);
    let exists = source
        .dependent_exists(&name)
        .map_err(|e| BuildError::store(BuildPhase::Setup, e))?;
    if !exists {
        return Ok(None);
    }
    source
        .remove_dependent(&name)
        .map_err(|e| BuildError::store(BuildPhase::Setup, e))?;
    Ok(Some(name))
}
