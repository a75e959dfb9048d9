//! Test fixtures and builder patterns for the Azure infrastructure kinds.

#![allow(dead_code)]

use std::collections::BTreeMap;

use capz_webhooks::crd::capi::cluster_resource;
use capz_webhooks::crd::{
    AGENT_POOL_MODE_LABEL, AzureCluster, AzureClusterSpec, AzureMachine, AzureMachineSpec,
    AzureManagedControlPlane, AzureManagedControlPlaneSpec, AzureManagedMachinePool,
    AzureManagedMachinePoolSpec, CLUSTER_NAME_LABEL, DataDisk, Image, MarketplaceImage,
    NodePoolMode, OsDisk,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde::Serialize;
use serde_json::json;

pub const NAMESPACE: &str = "default";
pub const CLUSTER_NAME: &str = "c1";

fn meta(
    name: &str,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        labels: if labels.is_empty() { None } else { Some(labels) },
        annotations: if annotations.is_empty() {
            None
        } else {
            Some(annotations)
        },
        ..Default::default()
    }
}

pub fn marketplace_image() -> Image {
    Image {
        marketplace: Some(MarketplaceImage {
            publisher: "cncf-upstream".to_string(),
            offer: "capi".to_string(),
            sku: "ubuntu-2204-gen1".to_string(),
            version: "latest".to_string(),
            third_party_image: false,
        }),
        ..Default::default()
    }
}

/// Builder for creating AzureMachine test fixtures.
///
/// # Example
/// ```
/// let machine = MachineBuilder::new("m1")
///     .cluster("c1")
///     .data_disk("etcd", 256)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct MachineBuilder {
    name: String,
    labels: BTreeMap<String, String>,
    spec: AzureMachineSpec,
}

impl MachineBuilder {
    /// A Linux machine with a marketplace image and no data disks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            spec: AzureMachineSpec {
                vm_size: "Standard_D2s_v3".to_string(),
                image: Some(marketplace_image()),
                os_disk: OsDisk {
                    os_type: "Linux".to_string(),
                    disk_size_gb: Some(128),
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    /// Label the machine as belonging to `cluster`.
    pub fn cluster(mut self, cluster: &str) -> Self {
        self.labels
            .insert(CLUSTER_NAME_LABEL.to_string(), cluster.to_string());
        self
    }

    /// Add a data disk without a LUN.
    pub fn data_disk(mut self, suffix: &str, size_gb: i32) -> Self {
        self.spec.data_disks.push(DataDisk {
            name_suffix: suffix.to_string(),
            disk_size_gb: size_gb,
            ..Default::default()
        });
        self
    }

    /// Adjust the spec directly.
    pub fn with(mut self, f: impl FnOnce(&mut AzureMachineSpec)) -> Self {
        f(&mut self.spec);
        self
    }

    pub fn build(self) -> AzureMachine {
        AzureMachine {
            metadata: meta(&self.name, self.labels, BTreeMap::new()),
            spec: self.spec,
        }
    }
}

/// Builder for creating AzureManagedMachinePool test fixtures.
#[derive(Clone, Debug)]
pub struct PoolBuilder {
    name: String,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    spec: AzureManagedMachinePoolSpec,
}

impl PoolBuilder {
    /// A pool of `cluster` in the given mode, mode label included.
    pub fn new(name: impl Into<String>, mode: NodePoolMode) -> Self {
        let labels = BTreeMap::from([
            (CLUSTER_NAME_LABEL.to_string(), CLUSTER_NAME.to_string()),
            (AGENT_POOL_MODE_LABEL.to_string(), mode.to_string()),
        ]);
        Self {
            name: name.into(),
            labels,
            annotations: BTreeMap::new(),
            spec: AzureManagedMachinePoolSpec {
                mode,
                sku: "Standard_D2s_v3".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, f: impl FnOnce(&mut AzureManagedMachinePoolSpec)) -> Self {
        f(&mut self.spec);
        self
    }

    pub fn build(self) -> AzureManagedMachinePool {
        AzureManagedMachinePool {
            metadata: meta(&self.name, self.labels, self.annotations),
            spec: self.spec,
        }
    }
}

/// A managed control plane of [`CLUSTER_NAME`].
pub fn control_plane(name: &str) -> AzureManagedControlPlane {
    let labels = BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), CLUSTER_NAME.to_string())]);
    AzureManagedControlPlane {
        metadata: meta(name, labels, BTreeMap::new()),
        spec: AzureManagedControlPlaneSpec {
            version: "v1.29.2".to_string(),
            resource_group_name: "rg".to_string(),
            location: "eastus".to_string(),
            ..Default::default()
        },
    }
}

pub fn azure_cluster(name: &str) -> AzureCluster {
    AzureCluster {
        metadata: meta(name, BTreeMap::new(), BTreeMap::new()),
        spec: AzureClusterSpec {
            location: "eastus".to_string(),
            ..Default::default()
        },
    }
}

/// Serialize a typed object into the dynamic form the store and requests carry.
pub fn to_dynamic<K: Serialize>(obj: &K) -> DynamicObject {
    let value = serde_json::to_value(obj).expect("serialize fixture");
    serde_json::from_value(value).expect("fixture is a valid object")
}

/// A CAPI `Cluster` pointing at an `AzureCluster` of the same name.
pub fn capi_cluster(name: &str, service_cidrs: &[&str]) -> DynamicObject {
    let mut cluster = DynamicObject::new(name, &cluster_resource()).within(NAMESPACE);
    cluster.data = json!({
        "spec": {
            "clusterNetwork": {
                "services": { "cidrBlocks": service_cidrs },
            },
            "infrastructureRef": {
                "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta1",
                "kind": "AzureCluster",
                "name": name,
            },
        }
    });
    cluster
}
