//! Klaro core types: coordinates, search terms, errors and source traits.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod policy;

/// Canonical group/version/kind discriminator derived from a coordinate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceKind {
    pub fn gvk_key(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.kind)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Caller-supplied address of a target object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectCoordinate {
    /// "v1" for the core group, "group/version" otherwise.
    pub api_version: String,
    pub kind: String,
    /// None for cluster-scoped objects.
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectCoordinate {
    /// Derive the canonical resource-type discriminator from apiVersion + kind.
    pub fn resource_kind(&self) -> Result<ResourceKind> {
        if self.kind.trim().is_empty() {
            return Err(Error::InvalidCoordinate("kind is empty".into()));
        }
        let parts: Vec<&str> = self.api_version.split('/').collect();
        match parts.as_slice() {
            [version] if !version.is_empty() => Ok(ResourceKind {
                group: String::new(),
                version: (*version).to_string(),
                kind: self.kind.clone(),
            }),
            [group, version] if !group.is_empty() && !version.is_empty() => Ok(ResourceKind {
                group: (*group).to_string(),
                version: (*version).to_string(),
                kind: self.kind.clone(),
            }),
            _ => Err(Error::InvalidCoordinate(format!(
                "cannot map apiVersion {:?} (expect v1 or group/v1)",
                self.api_version
            ))),
        }
    }

    /// Derive the indexed-source query terms. Deterministic for a given coordinate.
    pub fn to_terms(&self) -> SearchTerms {
        SearchTerms {
            api_version: self.api_version.trim().to_string(),
            kind: self.kind.trim().to_string(),
            namespace: self
                .namespace
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            name: self.name.trim().to_string(),
        }
    }
}

/// Query terms for the indexed source, normalized from a coordinate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchTerms {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

/// Errors suitable for transport across crate boundaries.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum Error {
    #[error("invalid_coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("config: {0}")]
    Config(String),
    #[error("empty_response: no completion choices returned")]
    EmptyResponse,
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Authoritative, real-time backend for object state.
///
/// Must answer `NotFound` only when the object is confirmed absent; transport
/// and authorization failures are `Transport` so callers never mistake an
/// outage for a missing object.
#[async_trait::async_trait]
pub trait LiveSource: Send + Sync {
    async fn get_by_coordinate(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value>;
}

/// Secondary, search-oriented backend holding possibly-stale copies.
#[async_trait::async_trait]
pub trait IndexedSource: Send + Sync {
    /// Return candidate documents in backend order, best match first.
    async fn search_by_terms(&self, terms: &SearchTerms, limit: Option<usize>)
        -> Result<Vec<Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(api_version: &str, kind: &str, ns: Option<&str>, name: &str) -> ObjectCoordinate {
        ObjectCoordinate {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: ns.map(|s| s.to_string()),
            name: name.to_string(),
        }
    }

    #[test]
    fn resource_kind_parses_core_group() {
        let rk = coord("v1", "ConfigMap", Some("default"), "cm").resource_kind().expect("ok");
        assert_eq!(rk.group, "");
        assert_eq!(rk.version, "v1");
        assert_eq!(rk.kind, "ConfigMap");
        assert_eq!(rk.gvk_key(), "v1/ConfigMap");
    }

    #[test]
    fn resource_kind_parses_named_group() {
        let rk = coord("apps/v1", "Deployment", Some("prod"), "web").resource_kind().expect("ok");
        assert_eq!(rk.group, "apps");
        assert_eq!(rk.version, "v1");
        assert_eq!(rk.gvk_key(), "apps/v1/Deployment");
    }

    #[test]
    fn resource_kind_rejects_unmappable_pairs() {
        assert!(coord("", "Pod", None, "p").resource_kind().is_err());
        assert!(coord("a/b/c", "Pod", None, "p").resource_kind().is_err());
        assert!(coord("v1", "", None, "p").resource_kind().is_err());
        assert!(coord("/v1", "Pod", None, "p").resource_kind().is_err());
    }

    #[test]
    fn terms_are_deterministic_and_normalized() {
        let c = coord("v1", "Secret", Some(" default "), " creds ");
        let t1 = c.to_terms();
        let t2 = c.to_terms();
        assert_eq!(t1, t2);
        assert_eq!(t1.namespace.as_deref(), Some("default"));
        assert_eq!(t1.name, "creds");
    }

    #[test]
    fn empty_namespace_normalizes_to_cluster_scope() {
        let t = coord("v1", "Node", Some(""), "worker-1").to_terms();
        assert_eq!(t.namespace, None);
    }
}
