//! Klaro index: in-RAM indexed source over previously captured documents.
//!
//! Stands in for a remote search backend; candidates come back in insertion
//! order, so the first hit is the oldest captured copy.

#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use klaro_core::{Error, IndexedSource, Result, SearchTerms};

#[derive(Default)]
pub struct MemoryIndex {
    docs: RwLock<Vec<Value>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_docs(docs: Vec<Value>) -> Self {
        Self { docs: RwLock::new(docs) }
    }

    /// Load a JSON array of documents captured earlier (e.g. by a watcher).
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Config(format!("index snapshot {}: {e}", path.display())))?;
        let docs: Vec<Value> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Config(format!("index snapshot {}: {e}", path.display())))?;
        debug!(docs = docs.len(), path = %path.display(), "index snapshot loaded");
        Ok(Self::from_docs(docs))
    }

    pub fn insert(&self, doc: Value) {
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(doc);
    }

    pub fn len(&self) -> usize {
        self.docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn field<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = doc;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str()
}

/// Structural match against the normalized terms. An absent namespace term
/// places no constraint on the document's namespace.
fn matches(doc: &Value, terms: &SearchTerms) -> bool {
    if field(doc, &["apiVersion"]) != Some(terms.api_version.as_str()) {
        return false;
    }
    if field(doc, &["kind"]) != Some(terms.kind.as_str()) {
        return false;
    }
    if field(doc, &["metadata", "name"]) != Some(terms.name.as_str()) {
        return false;
    }
    match terms.namespace.as_deref() {
        Some(ns) => field(doc, &["metadata", "namespace"]) == Some(ns),
        None => true,
    }
}

#[async_trait::async_trait]
impl IndexedSource for MemoryIndex {
    async fn search_by_terms(
        &self,
        terms: &SearchTerms,
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Value> = docs.iter().filter(|d| matches(d, terms)).cloned().collect();
        if let Some(cap) = limit {
            out.truncate(cap);
        }
        debug!(hits = out.len(), kind = %terms.kind, name = %terms.name, "index search");
        Ok(out)
    }
}
