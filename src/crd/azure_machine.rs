//! AzureMachine and AzureMachineTemplate Custom Resource Definitions.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::common::Tags;

/// Storage tier that only supports uncached disks.
pub const ULTRA_SSD_STORAGE: &str = "UltraSSD_LRS";

/// Diff-disk option selecting an ephemeral OS disk.
pub const EPHEMERAL_DIFF_DISK: &str = "Local";

/// Disk caching modes.
pub const CACHING_NONE: &str = "None";
pub const CACHING_READ_ONLY: &str = "ReadOnly";
pub const CACHING_READ_WRITE: &str = "ReadWrite";

/// AzureMachine describes a single Azure virtual machine backing a Cluster API Machine.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureMachine",
    plural = "azuremachines",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"VM Size", "type":"string", "jsonPath":".spec.vmSize"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AzureMachineSpec {
    /// Set once by the controller after the VM exists.
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    pub vm_size: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_domain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,

    #[serde(default)]
    pub identity: VmIdentity,

    #[serde(default)]
    pub user_assigned_identities: Vec<UserAssignedIdentity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_assigned_identity_role: Option<SystemAssignedIdentityRole>,

    /// Deprecated: use `systemAssignedIdentityRole.name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_assignment_name: Option<String>,

    #[serde(default)]
    pub os_disk: OsDisk,

    #[serde(default)]
    pub data_disks: Vec<DataDisk>,

    /// Base64-encoded OpenSSH public key.
    #[serde(default)]
    pub ssh_public_key: String,

    #[serde(default)]
    pub additional_tags: Tags,

    #[serde(rename = "allocatePublicIP", default)]
    pub allocate_public_ip: bool,

    #[serde(rename = "enableIPForwarding", default)]
    pub enable_ip_forwarding: bool,

    /// Deprecated: use `networkInterfaces[].acceleratedNetworking`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerated_networking: Option<bool>,

    /// Deprecated: use `networkInterfaces[].subnetName`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_name: Option<String>,

    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,

    #[serde(default)]
    pub dns_servers: Vec<String>,

    #[serde(rename = "spotVMOptions", default, skip_serializing_if = "Option::is_none")]
    pub spot_vm_options: Option<SpotVmOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_profile: Option<SecurityProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,

    #[serde(
        rename = "capacityReservationGroupID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub capacity_reservation_group_id: Option<String>,

    #[serde(default)]
    pub vm_extensions: Vec<VmExtension>,
}

/// Image selector. Exactly one variant must be set.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_gallery: Option<SharedGalleryImage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace: Option<MarketplaceImage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_gallery: Option<ComputeGalleryImage>,
}

impl Image {
    /// Number of image-source variants that are populated.
    pub fn source_count(&self) -> usize {
        [
            self.id.is_some(),
            self.shared_gallery.is_some(),
            self.marketplace.is_some(),
            self.compute_gallery.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SharedGalleryImage {
    #[serde(rename = "subscriptionID", default)]
    pub subscription_id: String,
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub gallery: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceImage {
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub offer: String,
    #[serde(rename = "sku", default)]
    pub sku: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub third_party_image: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComputeGalleryImage {
    #[serde(default)]
    pub gallery: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "subscriptionID", default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
}

/// Managed identity mode of the VM.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum VmIdentity {
    #[default]
    None,
    SystemAssigned,
    UserAssigned,
}

impl std::fmt::Display for VmIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VmIdentity::None => write!(f, "None"),
            VmIdentity::SystemAssigned => write!(f, "SystemAssigned"),
            VmIdentity::UserAssigned => write!(f, "UserAssigned"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserAssignedIdentity {
    #[serde(rename = "providerID")]
    pub provider_id: String,
}

/// Role assignment created for a system-assigned identity.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemAssignedIdentityRole {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub scope: String,
    #[serde(rename = "definitionID", default)]
    pub definition_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    #[serde(default)]
    pub os_type: String,

    #[serde(rename = "diskSizeGB", default, skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_disk: Option<ManagedDiskParameters>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_disk_settings: Option<DiffDiskSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caching_type: Option<String>,
}

impl OsDisk {
    /// Ephemeral OS disks live on the host's local storage.
    pub fn is_ephemeral(&self) -> bool {
        self.diff_disk_settings
            .as_ref()
            .is_some_and(|d| d.option == EPHEMERAL_DIFF_DISK)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiffDiskSettings {
    pub option: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDiskParameters {
    #[serde(default)]
    pub storage_account_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_encryption_set: Option<DiskEncryptionSet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_profile: Option<DiskSecurityProfile>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiskEncryptionSet {
    #[serde(rename = "id")]
    pub id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiskSecurityProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_encryption_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    #[serde(default)]
    pub name_suffix: String,

    #[serde(rename = "diskSizeGB", default)]
    pub disk_size_gb: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_disk: Option<ManagedDiskParameters>,

    /// Logical unit number; assigned during defaulting when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lun: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caching_type: Option<String>,
}

impl DataDisk {
    pub fn is_ultra(&self) -> bool {
        self.managed_disk
            .as_ref()
            .is_some_and(|m| m.storage_account_type == ULTRA_SSD_STORAGE)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default)]
    pub subnet_name: String,

    #[serde(rename = "privateIPConfigs", default)]
    pub private_ip_configs: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerated_networking: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum SpotEvictionPolicy {
    Deallocate,
    Delete,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpotVmOptions {
    /// `-1` or a positive decimal, as a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eviction_policy: Option<SpotEvictionPolicy>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_at_host: Option<bool>,

    /// `TrustedLaunch` or `ConfidentialVM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uefi_settings: Option<UefiSettings>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UefiSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_boot_enabled: Option<bool>,

    #[serde(rename = "vTpmEnabled", default, skip_serializing_if = "Option::is_none")]
    pub v_tpm_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot: Option<BootDiagnostics>,
}

/// Where boot diagnostics are stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum BootDiagnosticsStorage {
    #[default]
    Managed,
    UserManaged,
    Disabled,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BootDiagnostics {
    pub storage_account_type: BootDiagnosticsStorage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_managed: Option<UserManagedBootDiagnostics>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserManagedBootDiagnostics {
    #[serde(rename = "storageAccountURI", default)]
    pub storage_account_uri: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VmExtension {
    pub name: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
}

/// AzureMachineTemplate is the immutable blueprint AzureMachines are stamped from.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureMachineTemplate",
    plural = "azuremachinetemplates",
    namespaced,
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct AzureMachineTemplateSpec {
    pub template: AzureMachineTemplateResource,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureMachineTemplateResource {
    pub spec: AzureMachineSpec,
}
