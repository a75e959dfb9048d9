//! AzureMachine defaulting.

use std::collections::BTreeSet;

use kube::ResourceExt;
use tracing::debug;

use super::ssh::generate_public_key;
use crate::crd::capi::{CapiClusterSpec, cluster_resource};
use crate::crd::{
    AzureCluster, AzureMachine, AzureMachineSpec, AzureMachineTemplate, BootDiagnostics,
    BootDiagnosticsStorage, CACHING_NONE, CACHING_READ_ONLY, CACHING_READ_WRITE,
    CLUSTER_NAME_LABEL, Diagnostics, NetworkInterface, SpotEvictionPolicy,
    SystemAssignedIdentityRole, VmIdentity,
};
use crate::webhooks::error::{AdmissionError, Result, StoreError};
use crate::webhooks::store::{ResourceStore, RetryPolicy, api_resource, decode, get_with_retry};

/// Built-in Azure "Contributor" role definition.
pub const CONTRIBUTOR_ROLE_ID: &str = "b24988ac-6180-42a0-ab88-20f7382dd24c";

/// Values inherited from the owning AzureCluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MachineDefaultsContext {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
}

/// Resolve the defaulting context by walking
/// machine label -> CAPI Cluster -> infrastructureRef -> AzureCluster.
///
/// A missing label or a missing object at any hop yields an empty context.
pub async fn resolve_machine_context(
    store: &dyn ResourceStore,
    machine: &AzureMachine,
    policy: RetryPolicy,
) -> Result<MachineDefaultsContext> {
    let Some(cluster_name) = machine.labels().get(CLUSTER_NAME_LABEL) else {
        return Ok(MachineDefaultsContext::default());
    };
    let namespace = machine.namespace().unwrap_or_default();
    let lookup_failed = |source: StoreError| AdmissionError::OwnerLookup {
        kind: "AzureMachine".to_string(),
        name: machine.name_any(),
        attempts: policy.attempts.max(1),
        source,
    };

    let Some(owner) = get_with_retry(store, &cluster_resource(), &namespace, cluster_name, policy)
        .await
        .map_err(lookup_failed)?
    else {
        debug!(
            namespace = %namespace,
            cluster = %cluster_name,
            "Owner cluster not found, skipping context"
        );
        return Ok(MachineDefaultsContext::default());
    };

    let infra = CapiClusterSpec::from_dynamic(&owner)?
        .infrastructure_ref
        .filter(|r| r.kind.as_deref() == Some("AzureCluster"));
    let Some(infra_name) = infra.as_ref().and_then(|r| r.name.clone()) else {
        return Ok(MachineDefaultsContext::default());
    };
    let infra_namespace = infra
        .and_then(|r| r.namespace)
        .unwrap_or_else(|| namespace.clone());

    let Some(azure_cluster) = get_with_retry(
        store,
        &api_resource::<AzureCluster>(),
        &infra_namespace,
        &infra_name,
        policy,
    )
    .await
    .map_err(lookup_failed)?
    else {
        return Ok(MachineDefaultsContext::default());
    };

    let azure_cluster: AzureCluster = decode(&azure_cluster)?;
    Ok(MachineDefaultsContext {
        subscription_id: azure_cluster.spec.subscription_id,
        resource_group: azure_cluster.spec.resource_group,
    })
}

/// Default an AzureMachine in place.
pub fn default_azure_machine(
    machine: &mut AzureMachine,
    ctx: &MachineDefaultsContext,
) -> Result<()> {
    default_machine_spec(&mut machine.spec, ctx)
}

/// Default the inner spec of an AzureMachineTemplate.
///
/// Role assignment names are left to each stamped machine so that every VM
/// gets its own.
pub fn default_azure_machine_template(template: &mut AzureMachineTemplate) -> Result<()> {
    default_template_spec(&mut template.spec.template.spec)
}

pub fn default_machine_spec(
    spec: &mut AzureMachineSpec,
    ctx: &MachineDefaultsContext,
) -> Result<()> {
    default_template_spec(spec)?;
    default_identity_role(spec, ctx);
    Ok(())
}

pub(crate) fn default_template_spec(spec: &mut AzureMachineSpec) -> Result<()> {
    if spec.ssh_public_key.is_empty() {
        spec.ssh_public_key = generate_public_key()?;
    }
    default_os_disk_caching(spec);
    default_data_disk_luns(spec);
    default_data_disk_caching(spec);
    default_network_interfaces(spec);
    default_spot_eviction(spec);
    default_diagnostics(spec);
    Ok(())
}

fn default_os_disk_caching(spec: &mut AzureMachineSpec) {
    if spec.os_disk.caching_type.is_none() {
        let caching = if spec.os_disk.is_ephemeral() {
            CACHING_READ_ONLY
        } else {
            CACHING_NONE
        };
        spec.os_disk.caching_type = Some(caching.to_string());
    }
}

/// Give every data disk without a LUN the lowest LUN not already taken.
pub fn default_data_disk_luns(spec: &mut AzureMachineSpec) {
    let mut used: BTreeSet<i32> = spec.data_disks.iter().filter_map(|d| d.lun).collect();
    let mut candidate = 0;

    for disk in spec.data_disks.iter_mut().filter(|d| d.lun.is_none()) {
        while used.contains(&candidate) {
            candidate += 1;
        }
        disk.lun = Some(candidate);
        used.insert(candidate);
    }
}

fn default_data_disk_caching(spec: &mut AzureMachineSpec) {
    for disk in &mut spec.data_disks {
        if disk.caching_type.is_none() {
            let caching = if disk.is_ultra() {
                CACHING_NONE
            } else {
                CACHING_READ_WRITE
            };
            disk.caching_type = Some(caching.to_string());
        }
    }
}

/// Move the legacy single-NIC fields into `networkInterfaces`.
///
/// When both forms are populated nothing moves; validation rejects the object.
pub fn default_network_interfaces(spec: &mut AzureMachineSpec) {
    if spec.network_interfaces.is_empty() {
        spec.network_interfaces.push(NetworkInterface {
            subnet_name: spec.subnet_name.take().unwrap_or_default(),
            private_ip_configs: 1,
            accelerated_networking: spec.accelerated_networking.take(),
        });
    }

    for nic in &mut spec.network_interfaces {
        if nic.private_ip_configs == 0 {
            nic.private_ip_configs = 1;
        }
    }
}

fn default_identity_role(spec: &mut AzureMachineSpec, ctx: &MachineDefaultsContext) {
    if spec.identity != VmIdentity::SystemAssigned {
        return;
    }

    let role = spec
        .system_assigned_identity_role
        .get_or_insert_with(SystemAssignedIdentityRole::default);

    if role.name.is_empty() {
        role.name = match spec.role_assignment_name.take().filter(|n| !n.is_empty()) {
            Some(legacy) => legacy,
            None => uuid::Uuid::new_v4().to_string(),
        };
    }

    if let Some(subscription) = ctx.subscription_id.as_deref().filter(|s| !s.is_empty()) {
        if role.definition_id.is_empty() {
            role.definition_id = format!(
                "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions/{}",
                subscription, CONTRIBUTOR_ROLE_ID
            );
        }
        if role.scope.is_empty() {
            role.scope = format!(
                "/subscriptions/{}/resourceGroups/{}",
                subscription,
                ctx.resource_group.as_deref().unwrap_or_default()
            );
        }
    }
}

fn default_spot_eviction(spec: &mut AzureMachineSpec) {
    let ephemeral = spec.os_disk.is_ephemeral();
    if let Some(spot) = spec.spot_vm_options.as_mut() {
        spot.eviction_policy.get_or_insert(if ephemeral {
            SpotEvictionPolicy::Delete
        } else {
            SpotEvictionPolicy::Deallocate
        });
    }
}

fn default_diagnostics(spec: &mut AzureMachineSpec) {
    let diagnostics = spec.diagnostics.get_or_insert_with(Diagnostics::default);
    diagnostics.boot.get_or_insert(BootDiagnostics {
        storage_account_type: BootDiagnosticsStorage::Managed,
        user_managed: None,
    });
}
