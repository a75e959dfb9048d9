//! AzureManagedControlPlane (AKS) Custom Resource Definitions.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{IdentityRef, PrivateEndpointSpec, ServiceEndpoint, Tags};

/// Network plugin mode that puts pods on an overlay network.
pub const NETWORK_PLUGIN_MODE_OVERLAY: &str = "overlay";

/// Network plugin that is incompatible with overlay mode.
pub const NETWORK_PLUGIN_KUBENET: &str = "kubenet";

/// Cilium network policy / dataplane name.
pub const CILIUM: &str = "cilium";

/// AzureManagedControlPlane is the AKS managed cluster behind a Cluster API cluster.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureManagedControlPlane",
    plural = "azuremanagedcontrolplanes",
    shortname = "amcp",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Location", "type":"string", "jsonPath":".spec.location"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AzureManagedControlPlaneSpec {
    /// Kubernetes version, e.g. `v1.29.2`.
    pub version: String,

    pub resource_group_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_resource_group_name: Option<String>,

    pub location: String,

    #[serde(rename = "subscriptionID", default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_ref: Option<IdentityRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ManagedControlPlaneIdentity>,

    /// Base64-encoded OpenSSH public key. An explicit empty string disables the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<String>,

    #[serde(default)]
    pub virtual_network: ManagedControlPlaneVirtualNetwork,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<AksSku>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaler_profile: Option<AutoScalerProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server_access_profile: Option<ApiServerAccessProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_issuer_profile: Option<OidcIssuerProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_prefix: Option<String>,

    #[serde(rename = "dnsServiceIP", default, skip_serializing_if = "Option::is_none")]
    pub dns_service_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_plugin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_plugin_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_dataplane: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_type: Option<String>,

    #[serde(rename = "loadBalancerSKU", default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_sku: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_profile: Option<LoadBalancerProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_profile: Option<AadProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_local_accounts: Option<bool>,

    #[serde(default)]
    pub addon_profiles: Vec<AddonProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_upgrade_profile: Option<AutoUpgradeProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_profile: Option<ManagedControlPlaneSecurityProfile>,

    /// Joins the cluster to an Azure Kubernetes Fleet Manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fleets_member: Option<FleetsMember>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy_config: Option<HttpProxyConfig>,

    #[serde(default)]
    pub extensions: Vec<AksExtension>,

    #[serde(default)]
    pub additional_tags: Tags,
}

impl AzureManagedControlPlaneSpec {
    pub fn is_oidc_enabled(&self) -> bool {
        self.oidc_issuer_profile
            .as_ref()
            .and_then(|p| p.enabled)
            .unwrap_or(false)
    }

    pub fn is_user_assigned_identity(&self) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|i| i.identity_type == ManagedControlPlaneIdentityType::UserAssigned)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedControlPlaneVirtualNetwork {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub cidr_block: String,

    #[serde(default)]
    pub resource_group: String,

    #[serde(default)]
    pub subnet: ManagedControlPlaneSubnet,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedControlPlaneSubnet {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub cidr_block: String,

    #[serde(default)]
    pub service_endpoints: Vec<ServiceEndpoint>,

    #[serde(default)]
    pub private_endpoints: Vec<PrivateEndpointSpec>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ManagedControlPlaneIdentityType {
    #[default]
    SystemAssigned,
    UserAssigned,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedControlPlaneIdentity {
    #[serde(rename = "type", default)]
    pub identity_type: ManagedControlPlaneIdentityType,

    #[serde(rename = "userAssignedIdentityResourceID", default)]
    pub user_assigned_identity_resource_id: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum AksSkuTier {
    #[default]
    Free,
    Standard,
    Premium,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AksSku {
    #[serde(default)]
    pub tier: AksSkuTier,
}

/// Cluster autoscaler tuning. Every value is string-encoded, as AKS expects.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoScalerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_similar_node_groups: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expander: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_empty_bulk_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_graceful_termination_sec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_node_provision_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_unready_percentage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_pod_scale_up_delay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok_total_unready_count: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_delay_after_add: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_delay_after_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_delay_after_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_unneeded_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_unready_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_utilization_threshold: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_nodes_with_local_storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_nodes_with_system_pods: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerAccessProfile {
    #[serde(rename = "authorizedIPRanges", default)]
    pub authorized_ip_ranges: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_private_cluster: Option<bool>,

    #[serde(rename = "privateDNSZone", default, skip_serializing_if = "Option::is_none")]
    pub private_dns_zone: Option<String>,

    #[serde(
        rename = "enablePrivateClusterPublicFQDN",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enable_private_cluster_public_fqdn: Option<bool>,
}

impl ApiServerAccessProfile {
    /// The profile with `authorizedIPRanges` cleared; the remaining fields are immutable.
    pub fn without_authorized_ranges(&self) -> Self {
        Self {
            authorized_ip_ranges: Vec::new(),
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OidcIssuerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerProfile {
    #[serde(rename = "managedOutboundIPs", default, skip_serializing_if = "Option::is_none")]
    pub managed_outbound_ips: Option<i32>,

    #[serde(rename = "outboundIPPrefixes", default)]
    pub outbound_ip_prefixes: Vec<String>,

    #[serde(rename = "outboundIPs", default)]
    pub outbound_ips: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocated_outbound_ports: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_in_minutes: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AadProfile {
    #[serde(default)]
    pub managed: bool,

    #[serde(rename = "adminGroupObjectIDs", default)]
    pub admin_group_object_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonProfile {
    pub name: String,

    #[serde(default)]
    pub config: BTreeMap<String, String>,

    #[serde(default)]
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoUpgradeProfile {
    /// `none`, `patch`, `rapid`, `stable` or `node-image`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_channel: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum KeyVaultNetworkAccess {
    #[default]
    Public,
    Private,
}

/// KMS etcd encryption with a key held in Azure Key Vault.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureKeyVaultKms {
    #[serde(default)]
    pub enabled: bool,

    #[serde(rename = "keyID", default)]
    pub key_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_vault_network_access: Option<KeyVaultNetworkAccess>,

    #[serde(rename = "keyVaultResourceID", default, skip_serializing_if = "Option::is_none")]
    pub key_vault_resource_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityMonitoring {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterDefender {
    #[serde(rename = "logAnalyticsWorkspaceResourceID", default)]
    pub log_analytics_workspace_resource_id: String,

    #[serde(default)]
    pub security_monitoring: SecurityMonitoring,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageCleaner {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_hours: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadIdentity {
    #[serde(default)]
    pub enabled: bool,
}

/// Security profile of the managed cluster. Sub-profiles, once present, are
/// disabled through their own `enabled` switch rather than removed.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedControlPlaneSecurityProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_key_vault_kms: Option<AzureKeyVaultKms>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defender: Option<ManagedClusterDefender>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_cleaner: Option<ImageCleaner>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_identity: Option<WorkloadIdentity>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FleetsMember {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub group: String,

    #[serde(default)]
    pub manager_name: String,

    #[serde(default)]
    pub manager_resource_group: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpProxyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,

    #[serde(default)]
    pub no_proxy: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trusted_ca: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ExtensionScopeType {
    Cluster,
    Namespace,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionScope {
    pub scope_type: ExtensionScopeType,

    #[serde(default)]
    pub release_namespace: String,

    #[serde(default)]
    pub target_namespace: String,
}

/// Marketplace plan of a third-party extension.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionPlan {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub product: String,

    #[serde(default)]
    pub promotion_code: String,

    #[serde(default)]
    pub publisher: String,

    #[serde(default)]
    pub version: String,
}

/// A cluster extension installed through the AKS extension manager.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AksExtension {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_type: Option<String>,

    /// Defaults to `true` on the Azure side when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_upgrade_minor_version: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_train: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExtensionPlan>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ExtensionScope>,

    /// Only `SystemAssigned` is accepted by AKS today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    #[serde(default)]
    pub configuration_settings: BTreeMap<String, String>,
}

/// AzureManagedControlPlaneTemplate is the ClassSpec blueprint for AKS control planes.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureManagedControlPlaneTemplate",
    plural = "azuremanagedcontrolplanetemplates",
    namespaced,
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct AzureManagedControlPlaneTemplateSpec {
    pub template: AzureManagedControlPlaneTemplateResource,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureManagedControlPlaneTemplateResource {
    pub spec: AzureManagedControlPlaneSpec,
}
