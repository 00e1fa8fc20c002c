//! View definitions and design documents
//!
//! A view is a named map function inside a design document. Map functions
//! are injected closures paired with their source text; the source text is
//! what gets stored and what the signature is computed over.
//!
//! Stored design documents only carry source text, so turning them back
//! into runnable definitions goes through a [`MapResolver`].
//!
//! Persisted shape of a design document body:
//!
//! ```text
//! { "views": { "<view>": { "map": "<source>", "reduce": "<source>"? } } }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use viewbuild_core::{Document, Object, Value, DESIGN_PREFIX};

use crate::error::{BuildError, BuildResult};
use crate::evaluator::{Emitter, MapError};
use crate::signature::{store_name, view_signature, Signature};

type MapFn = dyn Fn(&Document, &mut Emitter) -> Result<(), MapError> + Send + Sync;

/// A map function: source text plus the callable it stands for
#[derive(Clone)]
pub struct MapFunction {
    source: Arc<str>,
    func: Arc<MapFn>,
}

impl MapFunction {
    /// Pair `source` with the closure implementing it
    pub fn new<F>(source: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Document, &mut Emitter) -> Result<(), MapError> + Send + Sync + 'static,
    {
        Self {
            source: Arc::from(source.into()),
            func: Arc::new(func),
        }
    }

    /// Source text
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn call(&self, doc: &Document, emitter: &mut Emitter) -> Result<(), MapError> {
        (self.func)(doc, emitter)
    }
}

impl fmt::Debug for MapFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapFunction")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Turns stored map source text back into a callable
pub trait MapResolver: Send + Sync {
    /// Callable for `source`, if known
    fn resolve(&self, source: &str) -> Option<MapFunction>;
}

/// Map resolver backed by a table of registered functions keyed by source
#[derive(Debug, Default)]
pub struct MapRegistry {
    functions: RwLock<HashMap<String, MapFunction>>,
}

impl MapRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under its source text, replacing any previous one
    pub fn register(&self, map: MapFunction) {
        self.functions.write().insert(map.source().to_string(), map);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(self, map: MapFunction) -> Self {
        self.register(map);
        self
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}

impl MapResolver for MapRegistry {
    fn resolve(&self, source: &str) -> Option<MapFunction> {
        self.functions.read().get(source).cloned()
    }
}

/// One view of a design document
#[derive(Debug, Clone)]
pub struct ViewDefinition {
    name: String,
    map: MapFunction,
    reduce: Option<String>,
}

impl ViewDefinition {
    /// View `name` computed by `map`
    pub fn new(name: impl Into<String>, map: MapFunction) -> Self {
        Self {
            name: name.into(),
            map,
            reduce: None,
        }
    }

    /// Attach reduce source text. It only feeds the signature.
    pub fn with_reduce(mut self, reduce: impl Into<String>) -> Self {
        self.reduce = Some(reduce.into());
        self
    }

    /// View name within its design document
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map function
    pub fn map(&self) -> &MapFunction {
        &self.map
    }

    /// Reduce source text
    pub fn reduce(&self) -> Option<&str> {
        self.reduce.as_deref()
    }

    /// Signature over map and reduce source text
    pub fn signature(&self) -> Signature {
        view_signature(self.map.source(), self.reduce())
    }
}

/// A design document: a named group of views
#[derive(Debug, Clone)]
pub struct DesignDoc {
    id: String,
    views: Vec<ViewDefinition>,
}

impl DesignDoc {
    /// Design document `name`; the `_design/` prefix is added when missing
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let id = if name.starts_with(DESIGN_PREFIX) {
            name
        } else {
            format!("{}{}", DESIGN_PREFIX, name)
        };
        Self {
            id,
            views: Vec::new(),
        }
    }

    /// Add a view, replacing an existing view of the same name
    pub fn with_view(mut self, view: ViewDefinition) -> Self {
        match self.views.iter_mut().find(|v| v.name == view.name) {
            Some(existing) => *existing = view,
            None => self.views.push(view),
        }
        self
    }

    /// Build design documents from `name -> views` pairs
    pub fn loopback<I, N>(definitions: I) -> Vec<DesignDoc>
    where
        I: IntoIterator<Item = (N, Vec<ViewDefinition>)>,
        N: Into<String>,
    {
        definitions
            .into_iter()
            .map(|(name, views)| {
                views
                    .into_iter()
                    .fold(DesignDoc::new(name), DesignDoc::with_view)
            })
            .collect()
    }

    /// Rebuild runnable definitions from a stored design document
    pub fn from_stored(stored: &StoredDesignDoc, resolver: &dyn MapResolver) -> BuildResult<Self> {
        let mut design = DesignDoc::new(stored.id.clone());
        for view in &stored.views {
            let map = resolver
                .resolve(&view.map_source)
                .ok_or_else(|| BuildError::UnresolvedMap {
                    view: view.qualified_name.clone(),
                })?;
            let mut definition = ViewDefinition::new(view.name.clone(), map);
            definition.reduce = view.reduce_source.clone();
            design = design.with_view(definition);
        }
        Ok(design)
    }

    /// Document id (`_design/<name>`)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name without the `_design/` prefix
    pub fn name(&self) -> &str {
        design_name(&self.id)
    }

    /// Views in declaration order
    pub fn views(&self) -> &[ViewDefinition] {
        &self.views
    }

    /// `design/view` name of one of this document's views
    pub fn qualified_name(&self, view: &ViewDefinition) -> String {
        format!("{}/{}", self.name(), view.name)
    }

    /// Stored form: view source text under `views`
    pub fn to_document(&self) -> Document {
        let mut views = Object::new();
        for view in &self.views {
            let mut def = Object::new();
            def.insert("map", view.map.source());
            if let Some(reduce) = &view.reduce {
                def.insert("reduce", reduce.as_str());
            }
            views.insert(view.name.clone(), def);
        }
        let mut body = Object::new();
        body.insert("views", views);
        Document::new(self.id.clone(), body)
    }
}

fn design_name(id: &str) -> &str {
    id.strip_prefix(DESIGN_PREFIX).unwrap_or(id)
}

/// A view as found in a stored design document
#[derive(Debug, Clone, PartialEq)]
pub struct StoredView {
    /// View name within its design document
    pub name: String,
    /// `design/view`
    pub qualified_name: String,
    /// Map source text
    pub map_source: String,
    /// Reduce source text
    pub reduce_source: Option<String>,
    /// Signature over the source text
    pub signature: Signature,
    /// Name of the index store the view is built into
    pub store_name: String,
}

/// A stored design document with the computed store name of each view
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDesignDoc {
    /// Document id (`_design/<name>`)
    pub id: String,
    /// Current revision
    pub rev: Option<String>,
    /// Views in stored order
    pub views: Vec<StoredView>,
}

impl StoredDesignDoc {
    /// Parse a stored design document of `collection`
    pub fn from_document(doc: &Document, collection: &str) -> BuildResult<Self> {
        let invalid = |reason: &str| BuildError::InvalidDesignDoc {
            id: doc.id.clone(),
            reason: reason.to_string(),
        };

        let views = match doc.get("views") {
            Some(Value::Object(views)) => views,
            Some(_) => return Err(invalid("`views` is not an object")),
            None => return Err(invalid("missing `views`")),
        };

        let mut stored = Vec::with_capacity(views.len());
        for (name, def) in views.iter() {
            let map_source = def
                .get("map")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid(&format!("view '{}' has no map source", name)))?;
            let reduce_source = match def.get("reduce") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(_) => {
                    return Err(invalid(&format!(
                        "view '{}' has a non-string reduce",
                        name
                    )))
                }
            };
            let signature = view_signature(map_source, reduce_source.as_deref());
            stored.push(StoredView {
                name: name.to_string(),
                qualified_name: format!("{}/{}", design_name(&doc.id), name),
                map_source: map_source.to_string(),
                reduce_source,
                store_name: store_name(collection, &signature),
                signature,
            });
        }

        Ok(StoredDesignDoc {
            id: doc.id.clone(),
            rev: doc.rev.clone(),
            views: stored,
        })
    }
}
