//! AzureCluster and AzureClusterTemplate Custom Resource Definitions.
//!
//! An AzureCluster describes the Azure-side infrastructure of a workload
//! cluster: where it lives, the virtual network and its subnets, and the
//! load balancers fronting the API server and node egress.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{IdentityRef, PublicIpSpec, ServiceEndpoint, SubnetRole, Tags};

/// AzureCluster is the infrastructure provider resource for a Cluster API cluster.
///
/// Example:
/// ```yaml
/// apiVersion: infrastructure.cluster.x-k8s.io/v1beta1
/// kind: AzureCluster
/// metadata:
///   name: my-cluster
/// spec:
///   location: westus2
///   networkSpec:
///     vnet:
///       cidrBlocks: ["10.0.0.0/8"]
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureCluster",
    plural = "azureclusters",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Location", "type":"string", "jsonPath":".spec.location"}"#,
    printcolumn = r#"{"name":"Resource Group", "type":"string", "jsonPath":".spec.resourceGroup"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterSpec {
    /// Azure region.
    pub location: String,

    #[serde(rename = "subscriptionID", default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,

    /// Resource group holding every cluster resource (default: cluster name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,

    /// Azure cloud environment (default: AzurePublicCloud).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_ref: Option<IdentityRef>,

    #[serde(default)]
    pub additional_tags: Tags,

    #[serde(default)]
    pub network_spec: NetworkSpec,

    #[serde(default)]
    pub bastion_spec: BastionSpec,
}

/// Network topology of the cluster.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    #[serde(default)]
    pub vnet: VnetSpec,

    #[serde(default)]
    pub subnets: Vec<SubnetSpec>,

    #[serde(rename = "apiServerLB", default, skip_serializing_if = "Option::is_none")]
    pub api_server_lb: Option<LoadBalancerSpec>,

    #[serde(rename = "nodeOutboundLB", default, skip_serializing_if = "Option::is_none")]
    pub node_outbound_lb: Option<LoadBalancerSpec>,

    #[serde(rename = "controlPlaneOutboundLB", default, skip_serializing_if = "Option::is_none")]
    pub control_plane_outbound_lb: Option<LoadBalancerSpec>,

    /// Private DNS zone used for an internal API server.
    #[serde(rename = "privateDNSZoneName", default, skip_serializing_if = "Option::is_none")]
    pub private_dns_zone_name: Option<String>,
}

impl NetworkSpec {
    /// Subnets carrying the given role.
    pub fn subnets_with_role(&self, role: SubnetRole) -> impl Iterator<Item = &SubnetSpec> {
        self.subnets.iter().filter(move |s| s.role == Some(role))
    }

    /// Whether the API server is exposed through an internal load balancer.
    pub fn is_api_server_internal(&self) -> bool {
        self.api_server_lb
            .as_ref()
            .is_some_and(|lb| lb.lb_type == Some(LoadBalancerType::Internal))
    }
}

/// Virtual network configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VnetSpec {
    /// Azure resource ID of a pre-existing (unmanaged) vnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,

    #[serde(default)]
    pub cidr_blocks: Vec<String>,

    #[serde(default)]
    pub tags: Tags,
}

impl VnetSpec {
    /// A vnet without an ID is created and owned by the provider.
    pub fn is_managed(&self) -> bool {
        self.id.as_deref().unwrap_or_default().is_empty()
    }
}

/// A subnet of the cluster vnet.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<SubnetRole>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub cidr_blocks: Vec<String>,

    #[serde(default)]
    pub security_group: SecurityGroup,

    #[serde(default)]
    pub route_table: RouteTable,

    #[serde(default)]
    pub nat_gateway: NatGateway,

    #[serde(default)]
    pub service_endpoints: Vec<ServiceEndpoint>,
}

impl SubnetSpec {
    pub fn is_nat_gateway_enabled(&self) -> bool {
        !self.nat_gateway.name.is_empty()
    }

    /// A subnet with any IPv6 CIDR is treated as dual-stack.
    pub fn is_ipv6_enabled(&self) -> bool {
        self.cidr_blocks.iter().any(|c| c.contains(':'))
    }
}

/// Network security group attached to a subnet.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub security_rules: Vec<SecurityRule>,
}

/// Traffic direction of a security rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum SecurityRuleDirection {
    Inbound,
    Outbound,
}

/// A single network security rule.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRule {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// One of `*`, `Tcp`, `Udp`, `Icmp`.
    pub protocol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<SecurityRuleDirection>,

    pub priority: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ports: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ports: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTable {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NatGateway {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "natGatewayIP", default)]
    pub nat_gateway_ip: PublicIpSpec,
}

/// Load balancer exposure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum LoadBalancerType {
    Public,
    Internal,
}

/// Load balancer SKU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum LoadBalancerSku {
    Standard,
}

/// A load balancer owned by the cluster.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub lb_type: Option<LoadBalancerType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<LoadBalancerSku>,

    #[serde(rename = "frontendIPs", default)]
    pub frontend_ips: Vec<FrontendIp>,

    #[serde(rename = "frontendIPsCount", default, skip_serializing_if = "Option::is_none")]
    pub frontend_ips_count: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_in_minutes: Option<i32>,

    #[serde(default)]
    pub backend_pool: BackendPool,
}

/// Frontend IP configuration of a load balancer.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FrontendIp {
    pub name: String,

    #[serde(rename = "privateIP", default, skip_serializing_if = "Option::is_none")]
    pub private_ip_address: Option<String>,

    #[serde(rename = "publicIP", default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<PublicIpSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendPool {
    #[serde(default)]
    pub name: String,
}

/// Bastion host configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BastionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_bastion: Option<AzureBastion>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureBastion {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub subnet: SubnetSpec,

    #[serde(rename = "publicIP", default)]
    pub public_ip: PublicIpSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,

    #[serde(default)]
    pub enable_tunneling: bool,
}

/// AzureClusterTemplate is a reusable AzureCluster blueprint for ClusterClass.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureClusterTemplate",
    plural = "azureclustertemplates",
    namespaced,
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterTemplateSpec {
    pub template: AzureClusterTemplateResource,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterTemplateResource {
    pub spec: AzureClusterSpec,
}
