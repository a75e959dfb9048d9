//! Multi-step admission scenarios over a shared store.
//!
//! These tests replay what the API server would see across a sequence of
//! requests: objects admitted earlier are written back into the store and
//! constrain the requests that follow.

use capz_webhooks::crd::{AGENT_POOL_MODE_LABEL, AzureManagedMachinePool, NodePoolMode};
use capz_webhooks::webhooks::defaults::machine_pool::default_managed_machine_pool;

use crate::common::fixtures::{CLUSTER_NAME, PoolBuilder, capi_cluster};
use crate::{MockStore, Outcome, registry, request, review};

fn stored_pool(name: &str, mode: NodePoolMode) -> AzureManagedMachinePool {
    let mut pool = PoolBuilder::new(name, mode).build();
    default_managed_machine_pool(&mut pool);
    pool
}

fn with_mode(pool: &AzureManagedMachinePool, mode: NodePoolMode) -> AzureManagedMachinePool {
    let mut changed = pool.clone();
    changed.spec.mode = mode;
    changed
}

/// Send an update and, when allowed, persist the patched object.
async fn update_pool(
    store: &MockStore,
    registry: &capz_webhooks::AdmissionRegistry,
    old: &AzureManagedMachinePool,
    new: &AzureManagedMachinePool,
) -> Outcome {
    let outcome =
        review(registry, &request("UPDATE", "AzureManagedMachinePool", Some(new), Some(old))).await;
    if outcome.allowed {
        let stored: AzureManagedMachinePool = serde_json::from_value(outcome.patched(new)).unwrap();
        store.remove(&old.metadata.name.clone().unwrap_or_default());
        store.insert(&stored);
    }
    outcome
}

// ============================================================================
// System Pool Demotion Scenarios
// ============================================================================

/// Two system pools: the first demotion passes, the second is refused.
#[tokio::test]
async fn test_demote_system_pools_one_by_one() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let pool0 = stored_pool("pool0", NodePoolMode::System);
    let pool1 = stored_pool("pool1", NodePoolMode::System);
    store.insert(&pool0);
    store.insert(&pool1);
    let registry = registry(store.clone());

    let first =
        update_pool(&store, &registry, &pool0, &with_mode(&pool0, NodePoolMode::User)).await;
    assert!(first.allowed, "unexpected denial: {}", first.message);

    // the mode label follows the new mode, so pool0 no longer counts
    let patched = first.patched(&with_mode(&pool0, NodePoolMode::User));
    assert_eq!(patched["metadata"]["labels"][AGENT_POOL_MODE_LABEL], "User");

    let second =
        update_pool(&store, &registry, &pool1, &with_mode(&pool1, NodePoolMode::User)).await;
    assert!(!second.allowed);
    assert!(second.message.contains("spec.mode: Forbidden"));
    assert!(second.message.contains("AKS Cluster must have at least one system pool"));
}

/// Promoting a user pool first makes room to demote the old system pool.
#[tokio::test]
async fn test_promote_then_demote() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let system = stored_pool("pool0", NodePoolMode::System);
    let user = stored_pool("pool1", NodePoolMode::User);
    store.insert(&system);
    store.insert(&user);
    let registry = registry(store.clone());

    let refused =
        update_pool(&store, &registry, &system, &with_mode(&system, NodePoolMode::User)).await;
    assert!(!refused.allowed);

    let promoted =
        update_pool(&store, &registry, &user, &with_mode(&user, NodePoolMode::System)).await;
    assert!(promoted.allowed, "unexpected denial: {}", promoted.message);

    let demoted =
        update_pool(&store, &registry, &system, &with_mode(&system, NodePoolMode::User)).await;
    assert!(demoted.allowed, "unexpected denial: {}", demoted.message);
}

/// A demotion refusal is reported together with other field errors.
#[tokio::test]
async fn test_demotion_refusal_aggregates_with_immutability() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let pool = stored_pool("pool0", NodePoolMode::System);
    store.insert(&pool);
    let registry = registry(store.clone());

    let mut new = with_mode(&pool, NodePoolMode::User);
    new.spec.os_disk_size_gb = Some(512);
    let outcome = update_pool(&store, &registry, &pool, &new).await;
    assert!(!outcome.allowed);
    assert!(outcome.message.contains("spec.osDiskSizeGB"));
    assert!(outcome.message.contains("spec.mode"));
}

// ============================================================================
// Deletion Scenarios
// ============================================================================

/// Pools can be deleted down to the last system pool, but not past it.
#[tokio::test]
async fn test_delete_pools_until_last_system_pool() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let pools = [
        stored_pool("pool0", NodePoolMode::System),
        stored_pool("pool1", NodePoolMode::System),
        stored_pool("pool2", NodePoolMode::User),
    ];
    for pool in &pools {
        store.insert(pool);
    }
    let registry = registry(store.clone());

    for pool in [&pools[2], &pools[1]] {
        let req = request("DELETE", "AzureManagedMachinePool", None, Some(pool));
        let outcome = review(&registry, &req).await;
        assert!(outcome.allowed, "unexpected denial: {}", outcome.message);
        store.remove(&pool.metadata.name.clone().unwrap());
    }

    let req = request("DELETE", "AzureManagedMachinePool", None, Some(&pools[0]));
    let last = review(&registry, &req).await;
    assert!(!last.allowed);
    assert!(last.message.contains("spec.mode: Invalid value"));
}

/// Once the owner Cluster is gone the last system pool can be deleted.
#[tokio::test]
async fn test_delete_last_system_pool_after_cluster_removed() {
    let store = MockStore::new();
    store.insert_dynamic(capi_cluster(CLUSTER_NAME, &[]));
    let pool = stored_pool("pool0", NodePoolMode::System);
    store.insert(&pool);
    let registry = registry(store.clone());

    let refused =
        review(&registry, &request("DELETE", "AzureManagedMachinePool", None, Some(&pool))).await;
    assert!(!refused.allowed);

    store.remove(CLUSTER_NAME);
    let allowed =
        review(&registry, &request("DELETE", "AzureManagedMachinePool", None, Some(&pool))).await;
    assert!(allowed.allowed, "unexpected denial: {}", allowed.message);
}

/// A cluster whose deletion has started no longer protects its system pool.
#[tokio::test]
async fn test_delete_last_system_pool_of_deleting_cluster() {
    let store = MockStore::new();
    let mut cluster = capi_cluster(CLUSTER_NAME, &[]);
    cluster.metadata.deletion_timestamp = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
        k8s_openapi::chrono::Utc::now(),
    ));
    store.insert_dynamic(cluster);
    let pool = stored_pool("pool0", NodePoolMode::System);
    store.insert(&pool);
    let registry = registry(store);

    let outcome =
        review(&registry, &request("DELETE", "AzureManagedMachinePool", None, Some(&pool))).await;
    assert!(outcome.allowed, "unexpected denial: {}", outcome.message);
}
