//! Orphan sweeper
//!
//! Destroys index stores of a collection that no declared view resolves to.
//! Runs after every build, including builds with nothing to rebuild, so a
//! removed or edited view eventually gives back its store.

use std::collections::BTreeSet;

use tracing::{debug, info};
use viewbuild_storage::DocumentStore;

use crate::error::{BuildError, BuildPhase, BuildResult};
use crate::signature::store_prefix;

/// Remove every `{collection}-mrview-*` store not in `should_exist`.
///
/// Returns the names removed.
pub fn sweep_orphans(
    source: &dyn DocumentStore,
    should_exist: &BTreeSet<String>,
) -> BuildResult<Vec<String>> {
    let prefix = store_prefix(source.name());
    debug!(target: "viewbuild::sweep", prefix = %prefix, "Sweeping index stores");

    let names = source
        .list_dependents(&prefix)
        .map_err(|e| BuildError::store(BuildPhase::Sweep, e))?;

    let mut removed = Vec::new();
    for name in names {
        if should_exist.contains(&name) {
            continue;
        }
        info!(target: "viewbuild::sweep", store = %name, "Removing orphaned index store");
        source
            .remove_dependent(&name)
            .map_err(|e| BuildError::store(BuildPhase::Sweep, e))?;
        removed.push(name);
    }
    Ok(removed)
}
