//! Read-only view of the Cluster API `Cluster` that owns the Azure resources.
//!
//! Only the fields the admission checks consult are modelled; everything else
//! in the upstream object is ignored on decode.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::core::{ApiResource, DynamicObject};
use serde::{Deserialize, Serialize};

pub const CAPI_GROUP: &str = "cluster.x-k8s.io";
pub const CAPI_VERSION: &str = "v1beta1";

/// API resource of the Cluster API `Cluster` kind.
pub fn cluster_resource() -> ApiResource {
    ApiResource {
        group: CAPI_GROUP.to_string(),
        version: CAPI_VERSION.to_string(),
        api_version: format!("{}/{}", CAPI_GROUP, CAPI_VERSION),
        kind: "Cluster".to_string(),
        plural: "clusters".to_string(),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapiClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_network: Option<ClusterNetwork>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ObjectReference>,
}

impl CapiClusterSpec {
    /// Decode the `spec` of a dynamic Cluster object; a missing spec is empty.
    pub fn from_dynamic(obj: &DynamicObject) -> Result<Self, serde_json::Error> {
        match obj.data.get("spec") {
            Some(spec) => serde_json::from_value(spec.clone()),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<NetworkRanges>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<NetworkRanges>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRanges {
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
}
