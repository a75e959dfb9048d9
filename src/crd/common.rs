//! Types shared across the Azure infrastructure resource kinds.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of every infrastructure kind in this crate.
pub const INFRASTRUCTURE_GROUP: &str = "infrastructure.cluster.x-k8s.io";

/// Label carrying the name of the owning Cluster API `Cluster`.
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Annotation set by clusterctl on objects being deleted as part of a move.
pub const DELETE_FOR_MOVE_ANNOTATION: &str = "clusterctl.cluster.x-k8s.io/delete-for-move";

/// Default Azure cloud environment name.
pub const DEFAULT_AZURE_ENVIRONMENT: &str = "AzurePublicCloud";

/// Free-form Azure resource tags.
pub type Tags = BTreeMap<String, String>;

/// Reference to the identity used to talk to Azure.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    /// Kind of the referenced object (expected: AzureClusterIdentity).
    #[serde(default)]
    pub kind: String,

    /// Name of the referenced object.
    pub name: String,

    /// Namespace of the referenced object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Subnet roles understood by the cluster network layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetRole {
    ControlPlane,
    Node,
    Bastion,
    Cluster,
}

impl std::fmt::Display for SubnetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubnetRole::ControlPlane => write!(f, "control-plane"),
            SubnetRole::Node => write!(f, "node"),
            SubnetRole::Bastion => write!(f, "bastion"),
            SubnetRole::Cluster => write!(f, "cluster"),
        }
    }
}

/// A public IP address definition.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
}

/// Service endpoint enabled on a subnet.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    pub service: String,

    #[serde(default)]
    pub locations: Vec<String>,
}

/// Private link connection of a private endpoint.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrivateLinkServiceConnection {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "privateLinkServiceID", default)]
    pub private_link_service_id: String,

    #[serde(default)]
    pub group_ids: Vec<String>,
}

/// Private endpoint placed in a subnet.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrivateEndpointSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default)]
    pub private_link_service_connections: Vec<PrivateLinkServiceConnection>,

    #[serde(default)]
    pub private_ip_addresses: Vec<String>,
}

/// Returns true when the annotation map carries the given key.
pub fn has_annotation(annotations: Option<&BTreeMap<String, String>>, key: &str) -> bool {
    annotations.is_some_and(|a| a.contains_key(key))
}
