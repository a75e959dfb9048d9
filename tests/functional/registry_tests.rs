//! Single-request tests through the admission registry.
//!
//! Each test sends one CREATE, UPDATE or DELETE and checks the allowed flag,
//! the returned patch, or the denial message.

use capz_webhooks::crd::{
    AGENT_POOL_MODE_LABEL, AzureCluster, AzureMachine, AzureManagedControlPlane,
    AzureManagedMachinePool, DELETE_FOR_MOVE_ANNOTATION, ManagedDiskParameters, NodePoolMode,
    SpotVmOptions, ULTRA_SSD_STORAGE, VmIdentity,
};
use capz_webhooks::webhooks::defaults::cluster::default_azure_cluster;
use capz_webhooks::webhooks::defaults::control_plane::default_managed_control_plane;
use capz_webhooks::webhooks::defaults::machine::{MachineDefaultsContext, default_azure_machine};
use capz_webhooks::webhooks::defaults::machine_pool::default_managed_machine_pool;
use capz_webhooks::webhooks::{AdmissionObject, AdmissionRegistry, StaticFeatureGates};
use kube::ResourceExt;
use serde_json::json;

use crate::common::fixtures::{
    CLUSTER_NAME, MachineBuilder, PoolBuilder, azure_cluster, capi_cluster, control_plane,
};
use crate::{MockStore, registry, registry_with_gates, request, review};

/// A machine as the API server would have stored it after admission.
fn stored_machine(builder: MachineBuilder) -> AzureMachine {
    let mut machine = builder.build();
    default_azure_machine(&mut machine, &MachineDefaultsContext::default()).unwrap();
    machine
}

fn stored_pool(builder: PoolBuilder) -> AzureManagedMachinePool {
    let mut pool = builder.build();
    default_managed_machine_pool(&mut pool);
    pool
}

// ============================================================================
// Defaulting Patch Tests
// ============================================================================

/// A bare machine comes back with LUNs, caching, NICs and an SSH key filled in.
#[tokio::test]
async fn test_machine_create_returns_patch() {
    let store = MockStore::new();
    let registry = registry(store);
    let machine = MachineBuilder::new("m1")
        .data_disk("etcd", 256)
        .data_disk("logs", 128)
        .with(|s| s.subnet_name = Some("node-subnet".to_string()))
        .build();

    let outcome = review(&registry, &request("CREATE", "AzureMachine", Some(&machine), None)).await;
    assert!(outcome.allowed, "unexpected denial: {}", outcome.message);

    let patched = outcome.patched(&machine);
    let spec = &patched["spec"];
    assert_eq!(spec["dataDisks"][0]["lun"], 0);
    assert_eq!(spec["dataDisks"][1]["lun"], 1);
    assert_eq!(spec["dataDisks"][0]["cachingType"], "ReadWrite");
    assert_eq!(spec["osDisk"]["cachingType"], "None");
    assert_eq!(
        spec["networkInterfaces"],
        json!([{ "subnetName": "node-subnet", "privateIPConfigs": 1 }])
    );
    assert!(spec.get("subnetName").is_none());
    assert!(!spec["sshPublicKey"].as_str().unwrap().is_empty());
    assert_eq!(spec["diagnostics"]["boot"]["storageAccountType"], "Managed");
}

/// An already-defaulted machine needs no patch.
#[tokio::test]
async fn test_defaulted_machine_has_no_patch() {
    let registry = registry(MockStore::new());
    let machine = stored_machine(MachineBuilder::new("m1").data_disk("etcd", 256));

    let outcome = review(&registry, &request("CREATE", "AzureMachine", Some(&machine), None)).await;
    assert!(outcome.allowed, "unexpected denial: {}", outcome.message);
    assert!(outcome.patch.is_none());
}

/// The role assignment scope comes from the AzureCluster behind the CAPI Cluster.
#[tokio::test]
async fn test_machine_role_scoped_to_owner_cluster() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &["10.96.0.0/12"]));
    let mut azure = azure_cluster(CLUSTER_NAME);
    azure.spec.subscription_id = Some("sub-1".to_string());
    azure.spec.resource_group = Some("rg-1".to_string());
    store.insert(&azure);

    let registry = registry(store);
    let machine = MachineBuilder::new("m1")
        .cluster(CLUSTER_NAME)
        .with(|s| s.identity = VmIdentity::SystemAssigned)
        .build();

    let outcome = review(&registry, &request("CREATE", "AzureMachine", Some(&machine), None)).await;
    assert!(outcome.allowed, "unexpected denial: {}", outcome.message);

    let role = &outcome.patched(&machine)["spec"]["systemAssignedIdentityRole"];
    assert_eq!(role["scope"], "/subscriptions/sub-1/resourceGroups/rg-1");
    assert!(
        role["definitionID"]
            .as_str()
            .unwrap()
            .starts_with("/subscriptions/sub-1/providers/Microsoft.Authorization/roleDefinitions/")
    );
    assert!(uuid::Uuid::parse_str(role["name"].as_str().unwrap()).is_ok());
}

/// A pool is patched with its own name and a mode label.
#[tokio::test]
async fn test_pool_create_patch_sets_name_and_labels() {
    let registry = registry(MockStore::new());
    let pool = PoolBuilder::new("pool0", NodePoolMode::User).build();

    let outcome =
        review(&registry, &request("CREATE", "AzureManagedMachinePool", Some(&pool), None)).await;
    assert!(outcome.allowed, "unexpected denial: {}", outcome.message);

    let patched = outcome.patched(&pool);
    assert_eq!(patched["spec"]["name"], "pool0");
    assert_eq!(patched["spec"]["osType"], "Linux");
    assert_eq!(patched["spec"]["scaleSetPriority"], "Regular");
}

// ============================================================================
// Denial Tests
// ============================================================================

/// Field errors are aggregated into one Invalid denial naming every path.
#[tokio::test]
async fn test_invalid_machine_is_denied_with_all_paths() {
    let registry = registry(MockStore::new());
    let machine = MachineBuilder::new("m1")
        .data_disk("ultra", 256)
        .with(|s| {
            s.image = None;
            s.data_disks[0].managed_disk = Some(ManagedDiskParameters {
                storage_account_type: ULTRA_SSD_STORAGE.to_string(),
                ..Default::default()
            });
            s.data_disks[0].caching_type = Some("ReadWrite".to_string());
            s.spot_vm_options = Some(SpotVmOptions {
                max_price: Some("0".to_string()),
                ..Default::default()
            });
        })
        .build();

    let outcome = review(&registry, &request("CREATE", "AzureMachine", Some(&machine), None)).await;
    assert!(!outcome.allowed);
    assert!(outcome.message.starts_with("[Invalid] AzureMachine \"m1\" is invalid"));
    assert!(outcome.message.contains("spec.image"));
    assert!(outcome.message.contains("spec.dataDisks[0].cachingType"));
    assert!(outcome.message.contains("spec.spotVMOptions.maxPrice"));
}

/// Managed kinds are refused while the MachinePool gate is off.
#[tokio::test]
async fn test_machine_pool_gate_denies_create() {
    let gates = StaticFeatureGates::default().set("MachinePool", false);
    let registry = registry_with_gates(MockStore::new(), gates);
    let pool = PoolBuilder::new("pool0", NodePoolMode::User).build();

    let outcome =
        review(&registry, &request("CREATE", "AzureManagedMachinePool", Some(&pool), None)).await;
    assert!(!outcome.allowed);
    assert!(outcome.message.starts_with("[Forbidden]"));
    assert!(outcome.message.contains("MachinePool feature flag"));
}

/// Requests for kinds the registry does not know are bad requests.
#[tokio::test]
async fn test_unknown_kind_is_bad_request() {
    let registry = registry(MockStore::new());
    let machine = MachineBuilder::new("m1").build();

    let outcome =
        review(&registry, &request("CREATE", "AzureMachinePool", Some(&machine), None)).await;
    assert!(!outcome.allowed);
    assert!(outcome.message.starts_with("[BadRequest]"));
}

// ============================================================================
// Update Tests
// ============================================================================

/// Changing a hard-immutable field is refused with the field named.
#[tokio::test]
async fn test_machine_update_rejects_vm_size_change() {
    let registry = registry(MockStore::new());
    let old = stored_machine(MachineBuilder::new("m1"));
    let mut new = old.clone();
    new.spec.vm_size = "Standard_D4s_v3".to_string();

    let outcome =
        review(&registry, &request("UPDATE", "AzureMachine", Some(&new), Some(&old))).await;
    assert!(!outcome.allowed);
    assert!(outcome.message.contains("spec.vmSize"));
    assert!(outcome.message.contains("field is immutable"));
}

/// An object stored before newer defaults existed can still be updated.
#[tokio::test]
async fn test_machine_update_from_legacy_object_is_allowed() {
    let registry = registry(MockStore::new());
    let mut old = MachineBuilder::new("m1")
        .with(|s| s.subnet_name = Some("legacy".to_string()))
        .build();
    old.spec.ssh_public_key = stored_machine(MachineBuilder::new("m1")).spec.ssh_public_key;
    let mut new = old.clone();
    new.spec.provider_id = Some("azure:///subscriptions/sub-1/vm/m1".to_string());

    let outcome =
        review(&registry, &request("UPDATE", "AzureMachine", Some(&new), Some(&old))).await;
    assert!(outcome.allowed, "unexpected denial: {}", outcome.message);
}

/// Pool updates aggregate every immutable field that changed.
#[tokio::test]
async fn test_pool_update_reports_each_immutable_field() {
    let store = MockStore::new();
    let registry = registry(store);
    let old = stored_pool(PoolBuilder::new("pool0", NodePoolMode::User));
    let mut new = old.clone();
    new.spec.sku = "Standard_D8s_v3".to_string();
    new.spec.max_pods = Some(60);

    let outcome = review(
        &registry,
        &request("UPDATE", "AzureManagedMachinePool", Some(&new), Some(&old)),
    )
    .await;
    assert!(!outcome.allowed);
    assert!(outcome.message.contains("spec.sku"));
    assert!(outcome.message.contains("spec.maxPods"));
}

/// An update is validated as sent. Only the mode label is patched.
#[tokio::test]
async fn test_pool_update_patches_mode_label_only() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let registry = registry(store);
    let old = stored_pool(PoolBuilder::new("pool0", NodePoolMode::User));
    let mut new = old.clone();
    new.spec.os_disk_type = None;
    new.labels_mut().remove(AGENT_POOL_MODE_LABEL);

    let outcome = review(
        &registry,
        &request("UPDATE", "AzureManagedMachinePool", Some(&new), Some(&old)),
    )
    .await;
    assert!(outcome.allowed, "unexpected denial: {}", outcome.message);

    let patched = outcome.patched(&new);
    assert_eq!(patched["metadata"]["labels"][AGENT_POOL_MODE_LABEL], "User");
    assert!(patched["spec"].get("osDiskType").is_none());
}

/// Clearing a defaulted field on a stored object is not a change: both sides
/// are re-defaulted before they are compared.
async fn assert_redefaulted_update(
    registry: &AdmissionRegistry,
    old: AdmissionObject,
    new: AdmissionObject,
) {
    if let Err(err) = registry.validate_update(&old, &new).await {
        panic!("cleared default reported as a change: {}", err);
    }
    if let Err(err) = registry.validate_update(&new, &old).await {
        panic!("omitted default reported as a change: {}", err);
    }
}

#[tokio::test]
async fn test_pool_update_redefaults_cleared_fields() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let registry = registry(store);
    let stored = stored_pool(PoolBuilder::new("pool0", NodePoolMode::User));

    let clears: [fn(&mut AzureManagedMachinePool); 4] = [
        |p| p.spec.name = None,
        |p| p.spec.os_type = None,
        |p| p.spec.os_disk_type = None,
        |p| p.spec.scale_set_priority = None,
    ];
    for clear in clears {
        let mut old = stored.clone();
        clear(&mut old);
        assert_redefaulted_update(
            &registry,
            AdmissionObject::AzureManagedMachinePool(old),
            AdmissionObject::AzureManagedMachinePool(stored.clone()),
        )
        .await;
    }
}

#[tokio::test]
async fn test_control_plane_update_redefaults_cleared_fields() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let registry = registry(store);
    let mut stored = control_plane("cp");
    default_managed_control_plane(&mut stored);
    assert_eq!(stored.spec.node_resource_group_name.as_deref(), Some("MC_rg_cp_eastus"));

    let clears: [fn(&mut AzureManagedControlPlane); 6] = [
        |cp| cp.spec.node_resource_group_name = None,
        |cp| cp.spec.sku = None,
        |cp| cp.spec.virtual_network = Default::default(),
        |cp| cp.spec.ssh_public_key = None,
        |cp| cp.spec.dns_prefix = None,
        |cp| cp.spec.oidc_issuer_profile = None,
    ];
    for clear in clears {
        let mut old = stored.clone();
        clear(&mut old);
        if let Err(err) = registry
            .validate_update(
                &AdmissionObject::AzureManagedControlPlane(old),
                &AdmissionObject::AzureManagedControlPlane(stored.clone()),
            )
            .await
        {
            panic!("cleared default reported as a change: {}", err);
        }
    }

    let mut moved = stored.clone();
    moved.spec.node_resource_group_name = Some("MC_other".to_string());
    let err = registry
        .validate_update(
            &AdmissionObject::AzureManagedControlPlane(stored),
            &AdmissionObject::AzureManagedControlPlane(moved),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("spec.nodeResourceGroupName"));
}

#[tokio::test]
async fn test_cluster_update_redefaults_cleared_fields() {
    let registry = registry(MockStore::new());
    let mut stored = azure_cluster(CLUSTER_NAME);
    default_azure_cluster(&mut stored);

    let clears: [fn(&mut AzureCluster); 4] = [
        |c| c.spec.resource_group = None,
        |c| c.spec.network_spec.vnet.name.clear(),
        |c| c.spec.network_spec.api_server_lb = None,
        |c| c.spec.network_spec.node_outbound_lb = None,
    ];
    for clear in clears {
        let mut old = stored.clone();
        clear(&mut old);
        assert_redefaulted_update(
            &registry,
            AdmissionObject::AzureCluster(old),
            AdmissionObject::AzureCluster(stored.clone()),
        )
        .await;
    }
}

// ============================================================================
// Cross-Resource Tests
// ============================================================================

fn dns_plane(dns_service_ip: &str) -> AzureManagedControlPlane {
    let mut cp = control_plane(CLUSTER_NAME);
    cp.spec.dns_service_ip = Some(dns_service_ip.to_string());
    cp
}

/// A DNS service IP inside the cluster service CIDR is accepted.
#[tokio::test]
async fn test_control_plane_dns_service_ip_in_range() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &["10.96.0.0/12"]));
    let registry = registry(store);
    let cp = dns_plane("10.96.0.10");

    let outcome =
        review(&registry, &request("CREATE", "AzureManagedControlPlane", Some(&cp), None)).await;
    assert!(outcome.allowed, "unexpected denial: {}", outcome.message);
}

/// Outside the service CIDR, and not ending in .10, are separate errors.
#[tokio::test]
async fn test_control_plane_dns_service_ip_rejected() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &["10.96.0.0/12"]));
    let registry = registry(store);
    let cp = dns_plane("192.168.0.11");

    let outcome =
        review(&registry, &request("CREATE", "AzureManagedControlPlane", Some(&cp), None)).await;
    assert!(!outcome.allowed);
    let outside = "DNSServiceIP must reside within the associated cluster serviceCIDR";
    assert!(outcome.message.contains(outside));
    assert!(outcome.message.contains("Cluster.spec.clusterNetwork.services.dnsServiceIP"));
}

/// A missing owner Cluster fails the control plane with an internal field error.
#[tokio::test]
async fn test_control_plane_without_owner_cluster() {
    let registry = registry(MockStore::new());
    let cp = control_plane(CLUSTER_NAME);

    let outcome =
        review(&registry, &request("CREATE", "AzureManagedControlPlane", Some(&cp), None)).await;
    assert!(!outcome.allowed);
    assert!(outcome.message.contains("not found"));
}

/// Several service CIDRs are more than AKS accepts.
#[tokio::test]
async fn test_control_plane_rejects_multiple_service_cidrs() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &["10.96.0.0/12", "fd00::/108"]));
    let registry = registry(store);
    let cp = control_plane(CLUSTER_NAME);

    let outcome =
        review(&registry, &request("CREATE", "AzureManagedControlPlane", Some(&cp), None)).await;
    assert!(!outcome.allowed);
    assert!(outcome.message.contains("Cluster.spec.clusterNetwork.services.cidrBlocks"));
}

// ============================================================================
// Delete And Owner Lookup Tests
// ============================================================================

/// Deleting the only system pool of a live cluster is refused.
#[tokio::test]
async fn test_delete_last_system_pool_denied() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let pool = stored_pool(PoolBuilder::new("pool0", NodePoolMode::System));
    store.insert(&pool);
    let registry = registry(store);

    let outcome =
        review(&registry, &request("DELETE", "AzureManagedMachinePool", None, Some(&pool))).await;
    assert!(!outcome.allowed);
    assert!(outcome.message.contains("AKS Cluster must have at least one system pool"));
}

/// A pool being moved by clusterctl can always be deleted.
#[tokio::test]
async fn test_delete_for_move_skips_system_pool_check() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let pool = stored_pool(
        PoolBuilder::new("pool0", NodePoolMode::System)
            .annotation(DELETE_FOR_MOVE_ANNOTATION, "true"),
    );
    store.insert(&pool);
    let registry = registry(store);

    let outcome =
        review(&registry, &request("DELETE", "AzureManagedMachinePool", None, Some(&pool))).await;
    assert!(outcome.allowed, "unexpected denial: {}", outcome.message);
}

/// A transient read failure is retried within the budget.
#[tokio::test]
async fn test_owner_lookup_retries_transient_failure() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let pool = stored_pool(PoolBuilder::new("pool0", NodePoolMode::System));
    store.insert(&pool);
    store.insert(&stored_pool(PoolBuilder::new("pool1", NodePoolMode::System)));
    store.fail_next_gets(2);
    let registry = registry(store.clone());

    let outcome =
        review(&registry, &request("DELETE", "AzureManagedMachinePool", None, Some(&pool))).await;
    assert!(outcome.allowed, "unexpected denial: {}", outcome.message);
    assert_eq!(store.get_count(), 3);
}

/// Running out of attempts is an internal error, not a field error.
#[tokio::test]
async fn test_owner_lookup_gives_up_after_budget() {
    let store = MockStore::new();
    let pool = stored_pool(PoolBuilder::new("pool0", NodePoolMode::System));
    store.insert(&pool);
    store.fail_next_gets(10);
    let registry = registry(store.clone());

    let outcome =
        review(&registry, &request("DELETE", "AzureManagedMachinePool", None, Some(&pool))).await;
    assert!(!outcome.allowed);
    assert!(outcome.message.starts_with("[InternalError]"));
    assert!(outcome.message.contains("after 3 attempts"));
    assert_eq!(store.get_count(), 3);
}

/// Deleting kinds without delete rules never touches the store.
#[tokio::test]
async fn test_delete_of_cluster_is_allowed() {
    let store = MockStore::new();
    let registry = registry(store.clone());
    let cluster: AzureCluster = azure_cluster(CLUSTER_NAME);

    let outcome = review(&registry, &request("DELETE", "AzureCluster", None, Some(&cluster))).await;
    assert!(outcome.allowed);
    assert_eq!(store.get_count(), 0);
}

// ============================================================================
// Metrics Tests
// ============================================================================

/// Decisions and denials are counted per kind.
#[tokio::test]
async fn test_metrics_record_decisions() {
    let registry = registry(MockStore::new());
    let good = MachineBuilder::new("m1").build();
    let bad = MachineBuilder::new("m2").with(|s| s.image = None).build();

    review(&registry, &request("CREATE", "AzureMachine", Some(&good), None)).await;
    review(&registry, &request("CREATE", "AzureMachine", Some(&bad), None)).await;

    let text = registry.metrics().encode();
    assert!(text.contains("capz_webhook_admissions_total"));
    assert!(text.contains("capz_webhook_admission_denials_total"));
    assert!(text.contains("reason=\"Invalid\""));
}
