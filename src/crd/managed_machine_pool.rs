//! AzureManagedMachinePool (AKS agent pool) Custom Resource Definitions.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::Tags;

/// Label mirroring `spec.mode`, used to list the system pools of a cluster.
pub const AGENT_POOL_MODE_LABEL: &str = "azure-managed-machinepool/agentpoolmode";

/// Node label prefix reserved for AKS.
pub const AKS_RESERVED_LABEL_PREFIX: &str = "kubernetes.azure.com";

pub const OS_TYPE_LINUX: &str = "Linux";
pub const OS_TYPE_WINDOWS: &str = "Windows";

pub const SCALE_SET_PRIORITY_REGULAR: &str = "Regular";
pub const SCALE_SET_PRIORITY_SPOT: &str = "Spot";

/// AzureManagedMachinePool is one AKS agent pool of an AzureManagedControlPlane.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureManagedMachinePool",
    plural = "azuremanagedmachinepools",
    shortname = "ammp",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Mode", "type":"string", "jsonPath":".spec.mode"}"#,
    printcolumn = r#"{"name":"SKU", "type":"string", "jsonPath":".spec.sku"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AzureManagedMachinePoolSpec {
    #[serde(default)]
    pub mode: NodePoolMode,

    /// Agent pool name in AKS (default: object name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,

    #[serde(default)]
    pub sku: String,

    #[serde(rename = "osDiskSizeGB", default, skip_serializing_if = "Option::is_none")]
    pub os_disk_size_gb: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_disk_type: Option<String>,

    #[serde(default)]
    pub availability_zones: Vec<String>,

    #[serde(default)]
    pub node_labels: BTreeMap<String, String>,

    #[serde(default)]
    pub taints: Vec<Taint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<ManagedMachinePoolScaling>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_set_priority: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_mode: Option<String>,

    /// `-1` (pay up to on-demand) or a positive decimal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_max_price: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet_config: Option<KubeletConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet_disk_type: Option<String>,

    #[serde(rename = "linuxOSConfig", default, skip_serializing_if = "Option::is_none")]
    pub linux_os_config: Option<LinuxOsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_name: Option<String>,

    #[serde(rename = "enableUltraSSD", default, skip_serializing_if = "Option::is_none")]
    pub enable_ultra_ssd: Option<bool>,

    #[serde(rename = "enableNodePublicIP", default, skip_serializing_if = "Option::is_none")]
    pub enable_node_public_ip: Option<bool>,

    #[serde(rename = "nodePublicIPPrefixID", default, skip_serializing_if = "Option::is_none")]
    pub node_public_ip_prefix_id: Option<String>,

    #[serde(rename = "enableFIPS", default, skip_serializing_if = "Option::is_none")]
    pub enable_fips: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_encryption_at_host: Option<bool>,

    #[serde(default)]
    pub additional_tags: Tags,
}

impl AzureManagedMachinePoolSpec {
    pub fn is_windows(&self) -> bool {
        self.os_type.as_deref() == Some(OS_TYPE_WINDOWS)
    }

    pub fn is_spot(&self) -> bool {
        self.scale_set_priority.as_deref() == Some(SCALE_SET_PRIORITY_SPOT)
    }
}

/// Agent pool mode. At least one `System` pool must exist per cluster.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum NodePoolMode {
    System,
    #[default]
    User,
}

impl std::fmt::Display for NodePoolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodePoolMode::System => write!(f, "System"),
            NodePoolMode::User => write!(f, "User"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Taint {
    pub effect: String,
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedMachinePoolScaling {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i32>,
}

/// Kubelet tuning for the pool's nodes.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_manager_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cfs_quota: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cfs_quota_period: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_gc_high_threshold: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_gc_low_threshold: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology_manager_policy: Option<String>,

    #[serde(default)]
    pub allowed_unsafe_sysctls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_swap_on: Option<bool>,

    #[serde(rename = "containerLogMaxSizeMB", default, skip_serializing_if = "Option::is_none")]
    pub container_log_max_size_mb: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_log_max_files: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_max_pids: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinuxOsConfig {
    #[serde(rename = "swapFileSizeMB", default, skip_serializing_if = "Option::is_none")]
    pub swap_file_size_mb: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sysctls: Option<SysctlConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent_huge_page_defrag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent_huge_page_enabled: Option<String>,
}

/// The subset of node sysctls AKS lets a pool tune.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SysctlConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_aio_max_nr: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_file_max: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_inotify_max_user_watches: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_nr_open: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_threads_max: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_core_somaxconn: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_ipv4_tcp_fin_timeout: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_ipv4_tcp_keepalive_probes: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_ipv4_tcp_max_syn_backlog: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_max_map_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_swappiness: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_vfs_cache_pressure: Option<i32>,
}

/// AzureManagedMachinePoolTemplate is the ClassSpec blueprint for AKS agent pools.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureManagedMachinePoolTemplate",
    plural = "azuremanagedmachinepooltemplates",
    namespaced,
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct AzureManagedMachinePoolTemplateSpec {
    pub template: AzureManagedMachinePoolTemplateResource,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureManagedMachinePoolTemplateResource {
    pub spec: AzureManagedMachinePoolSpec,
}
