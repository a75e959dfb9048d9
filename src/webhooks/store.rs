//! Resource store collaborator.
//!
//! Cross-resource checks read sibling objects through [`ResourceStore`]. The
//! production implementation is [`KubeStore`], backed by the API server;
//! tests substitute an in-memory store.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::core::{ApiResource, DynamicObject};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use super::error::StoreError;

/// Read access to stored resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get one object; `Ok(None)` when it does not exist.
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError>;

    /// List objects in a namespace whose labels match every selector entry.
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError>;
}

/// Store backed by the Kubernetes API server.
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Render a label map as a `k=v,k2=v2` selector.
pub fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        Ok(api.get_opt(name).await?)
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        let params = ListParams::default().labels(&label_selector(selector));
        Ok(api.list(&params).await?.items)
    }
}

/// API resource of a statically typed kind.
pub fn api_resource<K: Resource<DynamicType = ()>>() -> ApiResource {
    ApiResource::erase::<K>(&())
}

/// Decode a dynamic object into a typed resource.
pub fn decode<K: DeserializeOwned>(obj: &DynamicObject) -> Result<K, StoreError> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|source| StoreError::Decode {
            kind: obj
                .types
                .as_ref()
                .map(|t| t.kind.clone())
                .unwrap_or_default(),
            name: obj.metadata.name.clone().unwrap_or_default(),
            source,
        })
}

/// Fixed-delay retry budget for owner lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Get an object, retrying failed reads with a fixed delay.
///
/// A missing object is a definitive answer and is never retried. Any other
/// failure is retried until `policy.attempts` reads have been made, after
/// which the last error is returned.
pub async fn get_with_retry(
    store: &dyn ResourceStore,
    resource: &ApiResource,
    namespace: &str,
    name: &str,
    policy: RetryPolicy,
) -> Result<Option<DynamicObject>, StoreError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match store.get(resource, namespace, name).await {
            Ok(found) => {
                debug!(
                    kind = %resource.kind,
                    namespace,
                    name,
                    found = found.is_some(),
                    "Owner lookup finished"
                );
                return Ok(found);
            }
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => {
                if attempt >= attempts {
                    error!(
                        kind = %resource.kind,
                        namespace,
                        name,
                        attempt,
                        error = %e,
                        "Owner lookup failed after max retries"
                    );
                    return Err(e);
                }

                warn!(
                    kind = %resource.kind,
                    namespace,
                    name,
                    attempt,
                    error = %e,
                    delay_ms = policy.delay.as_millis() as u64,
                    "Owner lookup failed, retrying"
                );

                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
