//! Klaro resolver: live-then-indexed object lookup with field policy applied
//! before anything leaves this crate.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};

use klaro_core::{policy, Error, IndexedSource, LiveSource, ObjectCoordinate, Result};

/// Resolves object coordinates against a live source, falling back to an
/// indexed copy only when the live source confirms the object absent.
///
/// Stateless across calls; one instance may serve concurrent callers.
pub struct ResourceResolver {
    live: Arc<dyn LiveSource>,
    indexed: Arc<dyn IndexedSource>,
}

impl ResourceResolver {
    pub fn new(live: Arc<dyn LiveSource>, indexed: Arc<dyn IndexedSource>) -> Self {
        Self { live, indexed }
    }

    /// Resolve the current representation of the object at `coordinate`.
    ///
    /// Transport and authorization failures from the live source propagate
    /// unchanged and never trigger the fallback; the fallback is reserved for
    /// confirmed-absent objects.
    pub async fn resolve(&self, coordinate: &ObjectCoordinate) -> Result<Value> {
        let t0 = Instant::now();
        let rk = coordinate.resource_kind()?;
        info!(
            gvk = %rk.gvk_key(),
            name = %coordinate.name,
            ns = %coordinate.namespace.as_deref().unwrap_or("-"),
            "resolve start"
        );
        let doc = match self
            .live
            .get_by_coordinate(&rk, coordinate.namespace.as_deref(), &coordinate.name)
            .await
        {
            Ok(doc) => doc,
            Err(Error::NotFound(reason)) => match self.fallback(coordinate).await {
                Some(doc) => doc,
                None => return Err(Error::NotFound(reason)),
            },
            Err(e) => return Err(e),
        };
        let doc = policy::strip_managed_metadata(doc);
        let doc = if coordinate.kind.eq_ignore_ascii_case(policy::SENSITIVE_KIND) {
            policy::redact_if_sensitive_kind(doc, &coordinate.kind)
        } else {
            doc
        };
        info!(took_ms = %t0.elapsed().as_millis(), "resolve ok");
        Ok(doc)
    }

    /// Resolve and render as YAML bytes.
    pub async fn resolve_as_yaml(&self, coordinate: &ObjectCoordinate) -> Result<Vec<u8>> {
        let doc = self.resolve(coordinate).await?;
        let text = serde_yaml::to_string(&doc).map_err(|e| Error::Internal(e.to_string()))?;
        Ok(text.into_bytes())
    }

    /// Best-effort indexed lookup; failures are logged and swallowed so the
    /// caller sees the live source's original not-found condition. Only the
    /// first candidate is consulted (best match wins).
    async fn fallback(&self, coordinate: &ObjectCoordinate) -> Option<Value> {
        let terms = coordinate.to_terms();
        match self.indexed.search_by_terms(&terms, Some(1)).await {
            Ok(hits) => {
                let first = hits.into_iter().next();
                if first.is_some() {
                    metrics::counter!("klaro_resolve_fallback_hits", 1);
                    info!(kind = %terms.kind, name = %terms.name, "serving indexed copy for absent live object");
                }
                first
            }
            Err(e) => {
                warn!(error = %e, "indexed lookup failed; keeping original not-found");
                None
            }
        }
    }
}
