//! Last-system-pool protection.
//!
//! An AKS cluster needs at least one `System` agent pool. Moving a pool from
//! `System` to `User`, or deleting a `System` pool, is rejected when no other
//! system pool of the same cluster exists.
//!
//! Sibling pools are read without a lock, so two concurrent requests against
//! the last two system pools can both pass.

use std::collections::BTreeMap;

use kube::ResourceExt;
use tracing::{debug, info};

use super::error::{AdmissionError, Result};
use super::field::{FieldError, FieldPath};
use super::store::{ResourceStore, RetryPolicy, api_resource, get_with_retry};
use crate::crd::capi::cluster_resource;
use crate::crd::{
    AGENT_POOL_MODE_LABEL, AzureManagedMachinePool, CLUSTER_NAME_LABEL, DELETE_FOR_MOVE_ANNOTATION,
    NodePoolMode,
};

pub const LAST_SYSTEM_POOL: &str = "AKS Cluster must have at least one system pool";

/// Check a mode change from `old` to `new`.
///
/// Only a `System` to `User` change is checked. The rejection is a
/// `Forbidden` error on `spec.mode`, aggregated with the other update errors.
pub async fn validate_mode_change(
    store: &dyn ResourceStore,
    old: &AzureManagedMachinePool,
    new: &AzureManagedMachinePool,
    policy: RetryPolicy,
) -> Result<Option<FieldError>> {
    if old.spec.mode != NodePoolMode::System || new.spec.mode != NodePoolMode::User {
        return Ok(None);
    }

    let last = is_last_system_pool(store, new, policy).await?;
    Ok(last.then(|| FieldError::forbidden(mode_path(), LAST_SYSTEM_POOL)))
}

/// Check the deletion of `pool`. Deleting a `User` pool is always allowed.
pub async fn validate_pool_delete(
    store: &dyn ResourceStore,
    pool: &AzureManagedMachinePool,
    policy: RetryPolicy,
) -> Result<Option<FieldError>> {
    if pool.spec.mode != NodePoolMode::System {
        return Ok(None);
    }

    let last = is_last_system_pool(store, pool, policy).await?;
    Ok(last.then(|| FieldError::invalid(mode_path(), &pool.spec.mode, LAST_SYSTEM_POOL)))
}

fn mode_path() -> FieldPath {
    FieldPath::from_parts("spec", &["mode"])
}

/// Whether `pool` is the only system pool of its cluster.
///
/// Answers `false` when the check does not apply: no cluster label, owner
/// gone or being deleted, or either object marked for `clusterctl move`.
async fn is_last_system_pool(
    store: &dyn ResourceStore,
    pool: &AzureManagedMachinePool,
    policy: RetryPolicy,
) -> Result<bool> {
    let name = pool.name_any();
    let namespace = pool.namespace().unwrap_or_default();

    let Some(cluster_name) = pool.labels().get(CLUSTER_NAME_LABEL) else {
        debug!(name = %name, "Pool has no cluster label, skipping system pool check");
        return Ok(false);
    };
    if pool.annotations().contains_key(DELETE_FOR_MOVE_ANNOTATION) {
        info!(name = %name, "Pool is being moved, skipping system pool check");
        return Ok(false);
    }

    let owner = get_with_retry(store, &cluster_resource(), &namespace, cluster_name, policy)
        .await
        .map_err(|source| AdmissionError::OwnerLookup {
            kind: "AzureManagedMachinePool".to_string(),
            name: name.clone(),
            attempts: policy.attempts.max(1),
            source,
        })?;

    let Some(owner) = owner else {
        debug!(
            name = %name,
            cluster = %cluster_name,
            "Owner cluster not found, skipping system pool check"
        );
        return Ok(false);
    };
    if owner.metadata.deletion_timestamp.is_some() {
        debug!(
            name = %name,
            cluster = %cluster_name,
            "Owner cluster is being deleted, skipping system pool check"
        );
        return Ok(false);
    }
    if owner.annotations().contains_key(DELETE_FOR_MOVE_ANNOTATION) {
        info!(
            name = %name,
            cluster = %cluster_name,
            "Owner cluster is being moved, skipping system pool check"
        );
        return Ok(false);
    }

    let selector = BTreeMap::from([
        (CLUSTER_NAME_LABEL.to_string(), cluster_name.clone()),
        (AGENT_POOL_MODE_LABEL.to_string(), NodePoolMode::System.to_string()),
    ]);
    let system_pools = store
        .list(&api_resource::<AzureManagedMachinePool>(), &namespace, &selector)
        .await?;

    debug!(
        name = %name,
        cluster = %cluster_name,
        system_pools = system_pools.len(),
        "Counted system pools"
    );
    Ok(system_pools.len() <= 1)
}
