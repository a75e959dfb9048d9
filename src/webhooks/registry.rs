//! Admission dispatch over the Azure infrastructure kinds.
//!
//! [`AdmissionRegistry`] is built once at process start and shared by
//! reference. It runs defaulting, the store-free policies and the
//! cross-resource checks for every kind, and adapts kube admission requests
//! into responses carrying a JSON patch for the defaulted fields.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::defaults::cluster::{default_azure_cluster, default_azure_cluster_template};
use super::defaults::control_plane::{
    default_managed_control_plane, default_managed_control_plane_template,
};
use super::defaults::machine::{
    default_azure_machine, default_azure_machine_template, resolve_machine_context,
};
use super::defaults::machine_pool::{
    default_managed_machine_pool, default_managed_machine_pool_template, sync_mode_label,
};
use super::error::{AdmissionError, Result, into_result};
use super::feature_gates::{FeatureGates, MACHINE_POOL};
use super::field::ErrorList;
use super::policies::control_plane::validate_cluster_network;
use super::policies::validate_all;
use super::store::ResourceStore;
use super::system_pool::{validate_mode_change, validate_pool_delete};
use crate::config::WebhookConfig;
use crate::crd::{
    AzureCluster, AzureClusterTemplate, AzureMachine, AzureMachineTemplate,
    AzureManagedControlPlane, AzureManagedControlPlaneTemplate, AzureManagedMachinePool,
    AzureManagedMachinePoolTemplate,
};
use crate::metrics::Metrics;

/// One admitted object, tagged by kind.
#[derive(Clone, Debug, PartialEq)]
pub enum AdmissionObject {
    AzureCluster(AzureCluster),
    AzureClusterTemplate(AzureClusterTemplate),
    AzureMachine(AzureMachine),
    AzureMachineTemplate(AzureMachineTemplate),
    AzureManagedControlPlane(AzureManagedControlPlane),
    AzureManagedControlPlaneTemplate(AzureManagedControlPlaneTemplate),
    AzureManagedMachinePool(AzureManagedMachinePool),
    AzureManagedMachinePoolTemplate(AzureManagedMachinePoolTemplate),
}

fn decode<K: DeserializeOwned>(kind: &str, obj: &DynamicObject) -> Result<K> {
    let value = serde_json::to_value(obj)?;
    serde_json::from_value(value)
        .map_err(|e| AdmissionError::BadRequest(format!("failed to decode {}: {}", kind, e)))
}

impl AdmissionObject {
    /// Select the variant named by the request's `kind` and decode `obj` into it.
    pub fn from_dynamic(kind: &str, obj: &DynamicObject) -> Result<Self> {
        let typed = match kind {
            "AzureCluster" => Self::AzureCluster(decode(kind, obj)?),
            "AzureClusterTemplate" => Self::AzureClusterTemplate(decode(kind, obj)?),
            "AzureMachine" => Self::AzureMachine(decode(kind, obj)?),
            "AzureMachineTemplate" => Self::AzureMachineTemplate(decode(kind, obj)?),
            "AzureManagedControlPlane" => Self::AzureManagedControlPlane(decode(kind, obj)?),
            "AzureManagedControlPlaneTemplate" => {
                Self::AzureManagedControlPlaneTemplate(decode(kind, obj)?)
            }
            "AzureManagedMachinePool" => Self::AzureManagedMachinePool(decode(kind, obj)?),
            "AzureManagedMachinePoolTemplate" => {
                Self::AzureManagedMachinePoolTemplate(decode(kind, obj)?)
            }
            other => {
                return Err(AdmissionError::BadRequest(format!(
                    "unsupported kind {:?}",
                    other
                )));
            }
        };
        Ok(typed)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AzureCluster(_) => "AzureCluster",
            Self::AzureClusterTemplate(_) => "AzureClusterTemplate",
            Self::AzureMachine(_) => "AzureMachine",
            Self::AzureMachineTemplate(_) => "AzureMachineTemplate",
            Self::AzureManagedControlPlane(_) => "AzureManagedControlPlane",
            Self::AzureManagedControlPlaneTemplate(_) => "AzureManagedControlPlaneTemplate",
            Self::AzureManagedMachinePool(_) => "AzureManagedMachinePool",
            Self::AzureManagedMachinePoolTemplate(_) => "AzureManagedMachinePoolTemplate",
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::AzureCluster(o) => o.name_any(),
            Self::AzureClusterTemplate(o) => o.name_any(),
            Self::AzureMachine(o) => o.name_any(),
            Self::AzureMachineTemplate(o) => o.name_any(),
            Self::AzureManagedControlPlane(o) => o.name_any(),
            Self::AzureManagedControlPlaneTemplate(o) => o.name_any(),
            Self::AzureManagedMachinePool(o) => o.name_any(),
            Self::AzureManagedMachinePoolTemplate(o) => o.name_any(),
        }
    }

    /// Serialized form, used to diff before and after defaulting.
    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            Self::AzureCluster(o) => serde_json::to_value(o),
            Self::AzureClusterTemplate(o) => serde_json::to_value(o),
            Self::AzureMachine(o) => serde_json::to_value(o),
            Self::AzureMachineTemplate(o) => serde_json::to_value(o),
            Self::AzureManagedControlPlane(o) => serde_json::to_value(o),
            Self::AzureManagedControlPlaneTemplate(o) => serde_json::to_value(o),
            Self::AzureManagedMachinePool(o) => serde_json::to_value(o),
            Self::AzureManagedMachinePoolTemplate(o) => serde_json::to_value(o),
        };
        Ok(value?)
    }

    fn is_machine_pool_gated(&self) -> bool {
        matches!(self, Self::AzureManagedControlPlane(_) | Self::AzureManagedMachinePool(_))
    }
}

/// Admission entry points for every supported kind.
pub struct AdmissionRegistry {
    store: Arc<dyn ResourceStore>,
    gates: Arc<dyn FeatureGates>,
    config: WebhookConfig,
    metrics: Metrics,
}

impl AdmissionRegistry {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        gates: Arc<dyn FeatureGates>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            store,
            gates,
            config,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Fill unset fields in place.
    pub async fn default(&self, obj: &mut AdmissionObject) -> Result<()> {
        match obj {
            AdmissionObject::AzureCluster(c) => default_azure_cluster(c),
            AdmissionObject::AzureClusterTemplate(t) => default_azure_cluster_template(t),
            AdmissionObject::AzureMachine(m) => {
                let ctx =
                    resolve_machine_context(self.store.as_ref(), m, self.config.retry_policy())
                        .await?;
                default_azure_machine(m, &ctx)?;
            }
            AdmissionObject::AzureMachineTemplate(t) => default_azure_machine_template(t)?,
            AdmissionObject::AzureManagedControlPlane(cp) => default_managed_control_plane(cp),
            AdmissionObject::AzureManagedControlPlaneTemplate(t) => {
                default_managed_control_plane_template(t)
            }
            AdmissionObject::AzureManagedMachinePool(p) => default_managed_machine_pool(p),
            AdmissionObject::AzureManagedMachinePoolTemplate(t) => {
                default_managed_machine_pool_template(t)
            }
        }
        Ok(())
    }

    pub async fn validate_create(&self, obj: &AdmissionObject) -> Result<()> {
        if obj.is_machine_pool_gated() && !self.gates.enabled(MACHINE_POOL) {
            return Err(AdmissionError::FeatureGateDisabled {
                kind: obj.kind().to_string(),
                feature: MACHINE_POOL.to_string(),
            });
        }

        let mut errs = match obj {
            AdmissionObject::AzureCluster(o) => validate_all(o, None),
            AdmissionObject::AzureClusterTemplate(o) => validate_all(o, None),
            AdmissionObject::AzureMachine(o) => validate_all(o, None),
            AdmissionObject::AzureMachineTemplate(o) => validate_all(o, None),
            AdmissionObject::AzureManagedControlPlane(o) => validate_all(o, None),
            AdmissionObject::AzureManagedControlPlaneTemplate(o) => validate_all(o, None),
            AdmissionObject::AzureManagedMachinePool(o) => validate_all(o, None),
            AdmissionObject::AzureManagedMachinePoolTemplate(o) => validate_all(o, None),
        };
        if let AdmissionObject::AzureManagedControlPlane(cp) = obj {
            errs.append(self.cluster_network_errors(cp).await);
        }

        into_result(obj.kind(), &obj.name(), errs)
    }

    pub async fn validate_update(
        &self,
        old: &AdmissionObject,
        new: &AdmissionObject,
    ) -> Result<()> {
        use AdmissionObject as O;

        let mut errs = match (old, new) {
            (O::AzureCluster(o), O::AzureCluster(n)) => validate_all(n, Some(o)),
            (O::AzureClusterTemplate(o), O::AzureClusterTemplate(n)) => validate_all(n, Some(o)),
            (O::AzureMachine(o), O::AzureMachine(n)) => validate_all(n, Some(o)),
            (O::AzureMachineTemplate(o), O::AzureMachineTemplate(n)) => validate_all(n, Some(o)),
            (O::AzureManagedControlPlane(o), O::AzureManagedControlPlane(n)) => {
                validate_all(n, Some(o))
            }
            (O::AzureManagedControlPlaneTemplate(o), O::AzureManagedControlPlaneTemplate(n)) => {
                validate_all(n, Some(o))
            }
            (O::AzureManagedMachinePool(o), O::AzureManagedMachinePool(n)) => {
                validate_all(n, Some(o))
            }
            (O::AzureManagedMachinePoolTemplate(o), O::AzureManagedMachinePoolTemplate(n)) => {
                validate_all(n, Some(o))
            }
            _ => {
                return Err(AdmissionError::BadRequest(format!(
                    "kind changed from {} to {}",
                    old.kind(),
                    new.kind()
                )));
            }
        };

        match (old, new) {
            (_, O::AzureManagedControlPlane(cp)) => {
                errs.append(self.cluster_network_errors(cp).await)
            }
            (O::AzureManagedMachinePool(o), O::AzureManagedMachinePool(n)) => {
                let policy = self.config.retry_policy();
                errs.extend(validate_mode_change(self.store.as_ref(), o, n, policy).await?);
            }
            _ => {}
        }

        into_result(new.kind(), &new.name(), errs)
    }

    /// Only the removal of a system pool is ever refused.
    pub async fn validate_delete(&self, obj: &AdmissionObject) -> Result<()> {
        let AdmissionObject::AzureManagedMachinePool(pool) = obj else {
            return Ok(());
        };

        let policy = self.config.retry_policy();
        let errs: ErrorList = validate_pool_delete(self.store.as_ref(), pool, policy)
            .await?
            .into_iter()
            .collect();
        into_result(obj.kind(), &obj.name(), errs)
    }

    async fn cluster_network_errors(&self, cp: &AzureManagedControlPlane) -> ErrorList {
        validate_cluster_network(
            self.store.as_ref(),
            cp.labels(),
            &cp.namespace().unwrap_or_default(),
            cp.spec.dns_service_ip.as_deref(),
        )
        .await
    }

    /// Decide one admission request.
    ///
    /// CREATE defaults the incoming object before validating it and returns
    /// the defaulted fields as a JSON patch. UPDATE leaves the spec as sent;
    /// only the agent pool mode label is kept in step with `spec.mode`.
    pub async fn review(&self, req: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let start = Instant::now();
        let kind = req.kind.kind.as_str();
        let operation = operation_name(&req.operation);

        debug!(
            uid = %req.uid,
            kind,
            name = %req.name,
            namespace = ?req.namespace,
            operation,
            "Processing admission request"
        );

        let result = self.decide(req).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(response) => {
                self.metrics.record_admission(kind, operation, true, elapsed);
                info!(
                    uid = %req.uid,
                    kind,
                    name = %req.name,
                    operation,
                    "Admission request allowed"
                );
                response
            }
            Err(e) => {
                let reason = e.reason();
                self.metrics.record_admission(kind, operation, false, elapsed);
                self.metrics.record_denial(kind, reason);
                warn!(
                    uid = %req.uid,
                    kind,
                    name = %req.name,
                    operation,
                    reason,
                    error = %e,
                    "Admission request denied"
                );
                AdmissionResponse::from(req).deny(format!("[{}] {}", reason, e))
            }
        }
    }

    async fn decide(&self, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
        let kind = req.kind.kind.as_str();
        let response = AdmissionResponse::from(req);

        match req.operation {
            Operation::Create => {
                let mut obj = AdmissionObject::from_dynamic(kind, required_object(req)?)?;

                let before = obj.to_value()?;
                self.default(&mut obj).await?;
                let patch = json_patch::diff(&before, &obj.to_value()?);

                self.validate_create(&obj).await?;
                with_patch(response, patch)
            }
            Operation::Update => {
                let mut obj = AdmissionObject::from_dynamic(kind, required_object(req)?)?;
                let old = AdmissionObject::from_dynamic(kind, required_old_object(req)?)?;

                // spec defaults are only applied on create
                let before = obj.to_value()?;
                if let AdmissionObject::AzureManagedMachinePool(pool) = &mut obj {
                    sync_mode_label(pool);
                }
                let patch = json_patch::diff(&before, &obj.to_value()?);

                self.validate_update(&old, &obj).await?;
                with_patch(response, patch)
            }
            Operation::Delete => {
                let old = AdmissionObject::from_dynamic(kind, required_old_object(req)?)?;
                self.validate_delete(&old).await?;
                Ok(response)
            }
            Operation::Connect => Ok(response),
        }
    }
}

fn required_object(req: &AdmissionRequest<DynamicObject>) -> Result<&DynamicObject> {
    req.object
        .as_ref()
        .ok_or_else(|| AdmissionError::BadRequest("missing object in request".to_string()))
}

fn required_old_object(req: &AdmissionRequest<DynamicObject>) -> Result<&DynamicObject> {
    req.old_object
        .as_ref()
        .ok_or_else(|| AdmissionError::BadRequest("missing oldObject in request".to_string()))
}

fn with_patch(response: AdmissionResponse, patch: json_patch::Patch) -> Result<AdmissionResponse> {
    if patch.0.is_empty() {
        return Ok(response);
    }
    response
        .with_patch(patch)
        .map_err(|e| AdmissionError::BadRequest(format!("failed to serialize patch: {}", e)))
}

fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}
