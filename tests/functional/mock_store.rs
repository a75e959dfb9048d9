//! In-memory store and review helpers for functional tests.
//!
//! `MockStore` answers the registry's reads from a plain vector of dynamic
//! objects. Gets can be made to fail a fixed number of times so owner-lookup
//! retries can be observed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use capz_webhooks::webhooks::{ResourceStore, StaticFeatureGates, StoreError};
use json_patch::Patch;
use capz_webhooks::{AdmissionRegistry, WebhookConfig};
use kube::ResourceExt;
use kube::core::admission::{AdmissionRequest, AdmissionReview};
use kube::core::{ApiResource, DynamicObject};
use serde::Serialize;
use serde_json::{Value, json};

use crate::common::fixtures::to_dynamic;

/// In-memory resource store.
#[derive(Default)]
pub struct MockStore {
    objects: Mutex<Vec<DynamicObject>>,
    /// Remaining gets that fail before reads succeed again.
    failing_gets: AtomicU32,
    /// Total number of gets served, failed ones included.
    gets: AtomicU32,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a typed object.
    pub fn insert<K: Serialize>(&self, obj: &K) {
        self.insert_dynamic(to_dynamic(obj));
    }

    pub fn insert_dynamic(&self, obj: DynamicObject) {
        self.objects.lock().unwrap().push(obj);
    }

    /// Drop every object with this name, whatever its kind.
    pub fn remove(&self, name: &str) {
        self.objects
            .lock()
            .unwrap()
            .retain(|o| o.metadata.name.as_deref() != Some(name));
    }

    /// Make the next `n` gets fail as unavailable.
    pub fn fail_next_gets(&self, n: u32) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    pub fn get_count(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }
}

fn kind_of(obj: &DynamicObject) -> &str {
    obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or_default()
}

#[async_trait]
impl ResourceStore for MockStore {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_gets.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_gets.store(failing - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }

        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .find(|o| {
                kind_of(o) == resource.kind
                    && o.metadata.namespace.as_deref() == Some(namespace)
                    && o.metadata.name.as_deref() == Some(name)
            })
            .cloned())
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|o| {
                kind_of(o) == resource.kind && o.metadata.namespace.as_deref() == Some(namespace)
            })
            .filter(|o| selector.iter().all(|(k, v)| o.labels().get(k) == Some(v)))
            .cloned()
            .collect())
    }
}

/// Configuration with a short retry delay so tests stay fast.
pub fn test_config() -> WebhookConfig {
    WebhookConfig {
        owner_lookup_attempts: 3,
        owner_lookup_delay: Duration::from_millis(5),
        ..Default::default()
    }
}

/// Registry over `store` with default gates.
pub fn registry(store: Arc<MockStore>) -> AdmissionRegistry {
    registry_with_gates(store, StaticFeatureGates::default())
}

pub fn registry_with_gates(store: Arc<MockStore>, gates: StaticFeatureGates) -> AdmissionRegistry {
    AdmissionRegistry::new(store, Arc::new(gates), test_config())
}

/// Build an admission request for `kind` the way the API server sends it.
pub fn request<K: Serialize>(
    operation: &str,
    kind: &str,
    object: Option<&K>,
    old_object: Option<&K>,
) -> AdmissionRequest<DynamicObject> {
    let to_value = |o: &K| serde_json::to_value(o).unwrap();
    let name = object
        .or(old_object)
        .map(|o| to_value(o)["metadata"]["name"].clone())
        .unwrap_or(Value::Null);

    let review = json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
            "kind": {
                "group": "infrastructure.cluster.x-k8s.io",
                "version": "v1beta1",
                "kind": kind,
            },
            "resource": {
                "group": "infrastructure.cluster.x-k8s.io",
                "version": "v1beta1",
                "resource": format!("{}s", kind.to_lowercase()),
            },
            "name": name,
            "namespace": "default",
            "operation": operation,
            "userInfo": { "username": "admin" },
            "object": object.map(to_value),
            "oldObject": old_object.map(to_value),
            "dryRun": false,
        }
    });

    let review: AdmissionReview<DynamicObject> = serde_json::from_value(review).unwrap();
    review.try_into().unwrap()
}

/// The parts of an admission response the tests look at.
#[derive(Debug)]
pub struct Outcome {
    pub allowed: bool,
    pub message: String,
    pub patch: Option<Patch>,
}

impl Outcome {
    /// Apply the returned patch to the object that was sent.
    pub fn patched<K: Serialize>(&self, sent: &K) -> Value {
        let mut value = serde_json::to_value(sent).unwrap();
        if let Some(patch) = &self.patch {
            json_patch::patch(&mut value, patch).unwrap();
        }
        value
    }
}

/// Run one request through the registry.
pub async fn review(
    registry: &AdmissionRegistry,
    req: &AdmissionRequest<DynamicObject>,
) -> Outcome {
    let response = registry.review(req).await;
    let review = serde_json::to_value(response.into_review()).unwrap();
    let response = &review["response"];

    // kube serializes `patch: Vec<u8>` as a byte array; accept base64 too.
    let patch_bytes: Option<Vec<u8>> = match &response["patch"] {
        serde_json::Value::String(encoded) => Some(STANDARD.decode(encoded).unwrap()),
        serde_json::Value::Array(_) => Some(serde_json::from_value(response["patch"].clone()).unwrap()),
        _ => None,
    };
    let patch = patch_bytes.map(|bytes| serde_json::from_slice(&bytes).unwrap());

    Outcome {
        allowed: response["allowed"].as_bool().unwrap(),
        message: response["status"]["message"].as_str().unwrap_or_default().to_string(),
        patch,
    }
}
