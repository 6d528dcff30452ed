//! Klaro livehub: kube-backed [`LiveSource`] for authoritative object state.

#![forbid(unsafe_code)]

use std::time::Instant;

use kube::{
    api::Api,
    core::DynamicObject,
    discovery::{Discovery, Scope},
    Client,
};
use serde_json::Value;
use tracing::{debug, info};

use klaro_core::{Error, LiveSource, ResourceKind, Result};

/// Live source backed by the current kubeconfig context.
#[derive(Clone)]
pub struct KubeLiveSource {
    client: Client,
}

impl KubeLiveSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the ambient kubeconfig/in-cluster environment.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::Transport(format!("kube client: {e}")))?;
        Ok(Self { client })
    }

    /// Locate the served ApiResource for a discriminator via discovery.
    /// A kind the cluster does not serve cannot be addressed at all.
    async fn find_api_resource(&self, rk: &ResourceKind) -> Result<(kube::core::ApiResource, bool)> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| Error::Transport(format!("discovery: {e}")))?;
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                if ar.group == rk.group && ar.version == rk.version && ar.kind == rk.kind {
                    let namespaced = matches!(caps.scope, Scope::Namespaced);
                    return Ok((ar.clone(), namespaced));
                }
            }
        }
        Err(Error::InvalidCoordinate(format!(
            "kind not served by cluster: {}",
            rk.gvk_key()
        )))
    }
}

/// Map kube failures onto the klaro taxonomy. Only a confirmed 404 becomes
/// `NotFound`; everything else is a transport condition.
fn classify_kube_error(e: kube::Error) -> Error {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound(ae.message),
        kube::Error::Api(ae) if ae.code == 401 || ae.code == 403 => {
            Error::Transport(format!("unauthorized ({}): {}", ae.code, ae.message))
        }
        kube::Error::Api(ae) => Error::Transport(format!("api status {}: {}", ae.code, ae.message)),
        other => Error::Transport(other.to_string()),
    }
}

#[async_trait::async_trait]
impl LiveSource for KubeLiveSource {
    async fn get_by_coordinate(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value> {
        let t0 = Instant::now();
        debug!(gvk = %kind.gvk_key(), name = %name, ns = %namespace.unwrap_or("-"), "live get start");
        let (ar, namespaced) = self.find_api_resource(kind).await?;
        let api: Api<DynamicObject> = if namespaced {
            match namespace {
                Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
                None => {
                    return Err(Error::InvalidCoordinate(format!(
                        "namespace required for namespaced kind {}",
                        kind.gvk_key()
                    )))
                }
            }
        } else {
            Api::all_with(self.client.clone(), &ar)
        };
        let obj = api.get(name).await.map_err(classify_kube_error)?;
        let doc = serde_json::to_value(&obj).map_err(|e| Error::Internal(e.to_string()))?;
        info!(gvk = %kind.gvk_key(), name = %name, took_ms = %t0.elapsed().as_millis(), "live get ok");
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_err(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn http_404_classifies_as_not_found() {
        match classify_kube_error(api_err(404, "pods \"web\" not found")) {
            Error::NotFound(msg) => assert!(msg.contains("not found")),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn auth_failures_classify_as_transport() {
        for code in [401u16, 403] {
            match classify_kube_error(api_err(code, "denied")) {
                Error::Transport(msg) => assert!(msg.contains("unauthorized")),
                other => panic!("expected Transport, got {other:?}"),
            }
        }
    }

    #[test]
    fn server_errors_classify_as_transport() {
        match classify_kube_error(api_err(500, "boom")) {
            Error::Transport(msg) => assert!(msg.contains("500")),
            other => panic!("expected Transport, got {other:?}"),
        }
    }
}
