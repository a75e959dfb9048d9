//! AzureManagedControlPlane validation policy.
//!
//! Validates:
//! - Kubernetes version format and downgrades
//! - network plugin, policy and dataplane combinations
//! - API server access, load balancer and autoscaler profiles
//! - security profile, fleet membership and AKS extensions
//! - the service network of the owning Cluster (read through the store)

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::sync::LazyLock;

use kube::ResourceExt;
use regex::Regex;

use super::Validate;
use super::common::{is_duration, matches, parse_cidr, validate_private_endpoints, validate_ssh_key};
use super::immutability::{IMMUTABLE, immutable, one_directional};
use crate::crd::capi::{CapiClusterSpec, cluster_resource};
use crate::crd::{
    AksExtension, AutoScalerProfile, AzureManagedControlPlane, AzureManagedControlPlaneSpec,
    AzureManagedControlPlaneTemplate, CILIUM, CLUSTER_NAME_LABEL, ExtensionScopeType,
    FleetsMember, KeyVaultNetworkAccess, LoadBalancerProfile, ManagedControlPlaneIdentityType,
    ManagedControlPlaneVirtualNetwork, NETWORK_PLUGIN_KUBENET, NETWORK_PLUGIN_MODE_OVERLAY,
};
use crate::webhooks::defaults::control_plane::default_control_plane_spec;
use crate::webhooks::field::{ErrorList, FieldError, FieldPath};
use crate::webhooks::store::ResourceStore;

const DNS_PREFIX_PATTERN: &str = "^[a-zA-Z0-9][a-zA-Z0-9-]{0,52}[a-zA-Z0-9]$";

static DNS_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(DNS_PREFIX_PATTERN).ok());

static KUBE_SEMVER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^v(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)([-0-9a-zA-Z_\.+]*)?$").ok()
});

static MINUTES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^(\d+)m$").ok());
static SECONDS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^(\d+)s$").ok());

static PRIVATE_ZONE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(privatelink|private)\.[a-zA-Z0-9]+\.(azmk8s\.io)$").ok());
static PRIVATE_SUBZONE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9-]{1,32}\.(privatelink|private)\.[a-zA-Z0-9]+\.(azmk8s\.io)$").ok()
});

static FLEET_MEMBER_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").ok());

const EXPANDERS: &[&str] = &["least-waste", "most-pods", "priority", "random"];
const PRIVATE_DNS_ZONES_SEGMENT: &str = "privatednszones/";

impl Validate for AzureManagedControlPlane {
    fn validate_fields(&self) -> ErrorList {
        let mut errs = validate_control_plane_spec(&self.spec, &FieldPath::new("spec"));
        errs.append(validate_name(&self.name_any()));
        errs
    }

    fn validate_transition(&self, old: &Self) -> ErrorList {
        validate_control_plane_update(&old.spec, &self.spec, &old.name_any())
    }
}

impl Validate for AzureManagedControlPlaneTemplate {
    fn validate_fields(&self) -> ErrorList {
        validate_control_plane_spec(
            &self.spec.template.spec,
            &FieldPath::from_parts("spec", &["template", "spec"]),
        )
    }

    fn validate_transition(&self, old: &Self) -> ErrorList {
        let (old_spec, new_spec) =
            update_baseline(&old.spec.template.spec, &self.spec.template.spec, &old.name_any());

        let mut errs = ErrorList::new();
        if old_spec != new_spec {
            errs.push(FieldError::invalid(
                FieldPath::from_parts("spec", &["template", "spec"]),
                &self.spec.template.spec,
                "AzureManagedControlPlaneTemplate spec.template.spec field is immutable. Please create new resource instead.",
            ));
        }
        errs
    }
}

pub fn validate_control_plane_spec(
    spec: &AzureManagedControlPlaneSpec,
    root: &FieldPath,
) -> ErrorList {
    let mut errs = ErrorList::new();

    if let Some(key) = spec.ssh_public_key.as_deref().filter(|k| !k.is_empty()) {
        errs.append(validate_ssh_key(key, root.child("sshPublicKey")));
    }

    if let Some(identity) = &spec.identity {
        let path = root.child("identity").child("userAssignedIdentityResourceID");
        let id = &identity.user_assigned_identity_resource_id;
        match identity.identity_type {
            ManagedControlPlaneIdentityType::UserAssigned if id.is_empty() => {
                errs.push(FieldError::invalid(
                    path,
                    id,
                    "cannot be empty if Identity.Type is UserAssigned",
                ));
            }
            ManagedControlPlaneIdentityType::SystemAssigned if !id.is_empty() => {
                errs.push(FieldError::invalid(
                    path,
                    id,
                    "should be empty if Identity.Type is SystemAssigned",
                ));
            }
            _ => {}
        }
    }

    let plugin_mode = spec.network_plugin_mode.as_deref();
    if plugin_mode == Some(NETWORK_PLUGIN_MODE_OVERLAY)
        && spec.network_plugin.as_deref() == Some(NETWORK_PLUGIN_KUBENET)
    {
        errs.push(FieldError::invalid(
            root.child("networkPluginMode"),
            &spec.network_plugin_mode,
            format!(
                "cannot be set to {:?} when NetworkPlugin is {:?}",
                NETWORK_PLUGIN_MODE_OVERLAY, NETWORK_PLUGIN_KUBENET
            ),
        ));
    }

    if let Some(prefix) = spec.dns_prefix.as_deref() {
        if !matches(&DNS_PREFIX, prefix) {
            errs.push(FieldError::invalid(
                root.child("dnsPrefix"),
                prefix,
                format!("DNSPrefix is invalid, does not match regex: {}", DNS_PREFIX_PATTERN),
            ));
        }
    }

    if let Some(disabled) = spec.disable_local_accounts {
        if spec.aad_profile.is_none() {
            errs.push(FieldError::invalid(
                root.child("disableLocalAccounts"),
                &disabled,
                "DisableLocalAccounts should be set only for AAD enabled clusters",
            ));
        }
    }

    if !matches(&KUBE_SEMVER, &spec.version) {
        errs.push(FieldError::invalid(
            root.child("version"),
            &spec.version,
            "must be a valid semantic version",
        ));
    }

    if let Some(profile) = &spec.load_balancer_profile {
        errs.append(validate_load_balancer_profile(profile, &root.child("loadBalancerProfile")));
    }
    if let Some(profile) = &spec.auto_scaler_profile {
        errs.append(validate_auto_scaler_profile(profile, &root.child("autoScalerProfile")));
    }

    errs.append(validate_network_policy(spec, root));

    if let Some(profile) = &spec.api_server_access_profile {
        let path = root.child("apiServerAccessProfile");
        for (i, range) in profile.authorized_ip_ranges.iter().enumerate() {
            if parse_cidr(range).is_none() {
                errs.push(FieldError::invalid(
                    path.child("authorizedIPRanges").index(i),
                    range,
                    "invalid CIDR format",
                ));
            }
        }
        if let Some(zone) = profile.private_dns_zone.as_deref() {
            errs.extend(validate_private_dns_zone(zone, profile.enable_private_cluster, &path));
        }
    }

    errs.append(validate_virtual_network(&spec.virtual_network, &root.child("virtualNetwork")));

    let subnet = &spec.virtual_network.subnet;
    errs.append(validate_private_endpoints(
        &subnet.private_endpoints,
        &[subnet.cidr_block.as_str()],
        &root.child("virtualNetwork").child("subnet").child("privateEndpoints"),
    ));

    errs.append(validate_security_profile(spec, &root.child("securityProfile")));
    if let Some(member) = &spec.fleets_member {
        errs.extend(validate_fleets_member(member, &root.child("fleetsMember")));
    }
    errs.append(validate_extensions(&spec.extensions, &root.child("extensions")));
    errs
}

/// KMS needs a user-assigned identity and a resource ID exactly when the key
/// vault is private. Workload identity needs the OIDC issuer.
fn validate_security_profile(spec: &AzureManagedControlPlaneSpec, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let Some(profile) = &spec.security_profile else {
        return errs;
    };

    if let Some(kms) = &profile.azure_key_vault_kms {
        let id_path = path.child("azureKeyVaultKms").child("keyVaultResourceID");
        let resource_id = kms.key_vault_resource_id.as_deref().unwrap_or_default();
        let access = kms.key_vault_network_access.unwrap_or_default();
        if !spec.is_user_assigned_identity() {
            errs.push(FieldError::invalid(
                id_path,
                &kms.key_vault_resource_id,
                "Spec.SecurityProfile.AzureKeyVaultKms can be set only when Spec.Identity.Type is UserAssigned",
            ));
        } else if access == KeyVaultNetworkAccess::Private && resource_id.is_empty() {
            errs.push(FieldError::invalid(
                id_path,
                &kms.key_vault_resource_id,
                "Spec.SecurityProfile.AzureKeyVaultKms.KeyVaultResourceID cannot be empty when Spec.SecurityProfile.AzureKeyVaultKms.KeyVaultNetworkAccess is Private",
            ));
        } else if access == KeyVaultNetworkAccess::Public && !resource_id.is_empty() {
            errs.push(FieldError::invalid(
                id_path,
                &kms.key_vault_resource_id,
                "Spec.SecurityProfile.AzureKeyVaultKms.KeyVaultResourceID should be empty when Spec.SecurityProfile.AzureKeyVaultKms.KeyVaultNetworkAccess is Public",
            ));
        }
    }

    if let Some(workload) = &profile.workload_identity {
        if !spec.is_oidc_enabled() {
            errs.push(FieldError::invalid(
                path.child("workloadIdentity"),
                workload,
                "Spec.SecurityProfile.WorkloadIdentity cannot be enabled when Spec.OIDCIssuerProfile is disabled",
            ));
        }
    }

    errs
}

fn validate_fleets_member(member: &FleetsMember, path: &FieldPath) -> Option<FieldError> {
    if member.name.is_empty() || matches(&FLEET_MEMBER_NAME, &member.name) {
        return None;
    }
    Some(FieldError::invalid(
        path.child("name"),
        &member.name,
        "Name must match ^[a-z0-9]([-a-z0-9]*[a-z0-9])?$",
    ))
}

fn validate_extensions(extensions: &[AksExtension], path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    for (i, ext) in extensions.iter().enumerate() {
        let ext_path = path.index(i);
        // AKS treats an unset flag as true
        let auto_upgrade = ext.auto_upgrade_minor_version.unwrap_or(true);
        if ext.version.is_some() && auto_upgrade {
            errs.push(FieldError::forbidden(
                ext_path.child("version"),
                "Version must not be given if AutoUpgradeMinorVersion is true (or not provided, as it is true by default)",
            ));
        }
        if !auto_upgrade && ext.release_train.is_some() {
            errs.push(FieldError::forbidden(
                ext_path.child("releaseTrain"),
                "ReleaseTrain must not be given if AutoUpgradeMinorVersion is false",
            ));
        }

        let Some(scope) = &ext.scope else {
            continue;
        };
        let scope_path = ext_path.child("scope");
        match scope.scope_type {
            ExtensionScopeType::Cluster => {
                if scope.release_namespace.is_empty() {
                    errs.push(FieldError::required(
                        scope_path.child("releaseNamespace"),
                        "ReleaseNamespace must be provided if Scope is Cluster",
                    ));
                }
                if !scope.target_namespace.is_empty() {
                    errs.push(FieldError::forbidden(
                        scope_path.child("targetNamespace"),
                        "TargetNamespace can only be given if Scope is Namespace",
                    ));
                }
            }
            ExtensionScopeType::Namespace => {
                if scope.target_namespace.is_empty() {
                    errs.push(FieldError::required(
                        scope_path.child("targetNamespace"),
                        "TargetNamespace must be provided if Scope is Namespace",
                    ));
                }
                if !scope.release_namespace.is_empty() {
                    errs.push(FieldError::forbidden(
                        scope_path.child("releaseNamespace"),
                        "ReleaseNamespace can only be given if Scope is Cluster",
                    ));
                }
            }
        }
    }

    errs
}

fn validate_name(name: &str) -> ErrorList {
    let lower = name.to_lowercase();
    if lower.contains("microsoft") || lower.contains("windows") {
        return FieldError::invalid(
            FieldPath::from_parts("metadata", &["name"]),
            name,
            "cluster name is invalid because 'MICROSOFT' and 'WINDOWS' can't be used as either a whole word or a substring in the name",
        )
        .into();
    }
    ErrorList::new()
}

fn validate_load_balancer_profile(profile: &LoadBalancerProfile, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let mut in_range = |field: &str, value: Option<i32>, min: i32, max: i32| {
        if let Some(v) = value.filter(|v| !(min..=max).contains(v)) {
            errs.push(FieldError::invalid(
                path.child(field),
                &v,
                format!("value should be in between {} and {}", min, max),
            ));
        }
    };
    in_range("managedOutboundIPs", profile.managed_outbound_ips, 1, 100);
    in_range("allocatedOutboundPorts", profile.allocated_outbound_ports, 0, 64000);
    in_range("idleTimeoutInMinutes", profile.idle_timeout_in_minutes, 4, 120);

    let sources = [
        profile.managed_outbound_ips.is_some(),
        !profile.outbound_ip_prefixes.is_empty(),
        !profile.outbound_ips.is_empty(),
    ];
    if sources.iter().filter(|set| **set).count() > 1 {
        errs.push(FieldError::forbidden(
            path.clone(),
            "load balancer profile must specify at most one of ManagedOutboundIPs, OutboundIPPrefixes and OutboundIPs",
        ));
    }

    errs
}

fn validate_auto_scaler_profile(profile: &AutoScalerProfile, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let mut check = |field: &str, value: &Option<String>, valid: &dyn Fn(&str) -> bool| {
        if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
            if !valid(v) {
                errs.push(FieldError::invalid(path.child(field), v, "invalid value"));
            }
        }
    };

    let non_negative = |v: &str| v.parse::<i64>().is_ok_and(|n| n >= 0);
    let minutes = |v: &str| matches(&MINUTES, v);
    let seconds = |v: &str| matches(&SECONDS, v);
    let boolean = |v: &str| v.parse::<bool>().is_ok();

    check("balanceSimilarNodeGroups", &profile.balance_similar_node_groups, &boolean);
    check("expander", &profile.expander, &|v| EXPANDERS.contains(&v));
    check("maxEmptyBulkDelete", &profile.max_empty_bulk_delete, &non_negative);
    check("maxGracefulTerminationSec", &profile.max_graceful_termination_sec, &non_negative);
    check("maxNodeProvisionTime", &profile.max_node_provision_time, &minutes);
    check("maxTotalUnreadyPercentage", &profile.max_total_unready_percentage, &|v| {
        v.parse::<i64>().is_ok_and(|n| (0..=100).contains(&n))
    });
    check("newPodScaleUpDelay", &profile.new_pod_scale_up_delay, &is_duration);
    check("okTotalUnreadyCount", &profile.ok_total_unready_count, &non_negative);
    check("scanInterval", &profile.scan_interval, &seconds);
    check("scaleDownDelayAfterAdd", &profile.scale_down_delay_after_add, &minutes);
    check("scaleDownDelayAfterDelete", &profile.scale_down_delay_after_delete, &seconds);
    check("scaleDownDelayAfterFailure", &profile.scale_down_delay_after_failure, &minutes);
    check("scaleDownUnneededTime", &profile.scale_down_unneeded_time, &minutes);
    check("scaleDownUnreadyTime", &profile.scale_down_unready_time, &minutes);
    check("scaleDownUtilizationThreshold", &profile.scale_down_utilization_threshold, &|v| {
        v.parse::<f64>().is_ok_and(|f| (0.0..=1.0).contains(&f))
    });
    check("skipNodesWithLocalStorage", &profile.skip_nodes_with_local_storage, &boolean);
    check("skipNodesWithSystemPods", &profile.skip_nodes_with_system_pods, &boolean);

    errs
}

fn validate_network_policy(spec: &AzureManagedControlPlaneSpec, root: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let policy = spec.network_policy.as_deref();
    let dataplane = spec.network_dataplane.as_deref();

    if policy == Some(CILIUM) && dataplane.is_some_and(|d| d != CILIUM) {
        errs.push(FieldError::invalid(
            root.child("networkPolicy"),
            &policy,
            "cilium network policy can only be used with cilium network dataplane",
        ));
    }
    if dataplane == Some(CILIUM) {
        let path = root.child("networkDataplane");
        if spec.network_plugin_mode.as_deref() != Some(NETWORK_PLUGIN_MODE_OVERLAY) {
            errs.push(FieldError::invalid(
                path.clone(),
                &dataplane,
                "cilium network dataplane can only be used with overlay network plugin mode",
            ));
        }
        if policy != Some(CILIUM) {
            errs.push(FieldError::invalid(
                path,
                &dataplane,
                "cilium dataplane requires network policy cilium.",
            ));
        }
    }

    errs
}

/// `System`, `None`, or a private DNS zone resource ID naming an AKS zone.
fn validate_private_dns_zone(
    zone: &str,
    private_cluster: Option<bool>,
    path: &FieldPath,
) -> Option<FieldError> {
    let zone = zone.to_lowercase();
    if zone == "system" || zone == "none" {
        return None;
    }
    let Some(start) = zone.find(PRIVATE_DNS_ZONES_SEGMENT) else {
        return Some(FieldError::invalid(path.clone(), &zone, "invalid private DNS zone"));
    };
    if private_cluster != Some(true) {
        return Some(FieldError::invalid(
            path.clone(),
            &private_cluster,
            "Private Cluster should be enabled to use PrivateDNSZone",
        ));
    }

    let name = &zone[start + PRIVATE_DNS_ZONES_SEGMENT.len()..];
    if matches(&PRIVATE_ZONE, name) || matches(&PRIVATE_SUBZONE, name) {
        return None;
    }
    Some(FieldError::invalid(
        path.clone(),
        &zone,
        "invalid privateDnsZone resource ID. Each label the private dns zone name should be in either of these formats: 'private.<location>.azmk8s.io,privatelink.<location>.azmk8s.io,[a-zA-Z0-9-]{1,32}.private.<location>.azmk8s.io,[a-zA-Z0-9-]{1,32}.privatelink.<location>.azmk8s.io'",
    ))
}

fn validate_virtual_network(
    vnet: &ManagedControlPlaneVirtualNetwork,
    path: &FieldPath,
) -> ErrorList {
    let mut errs = ErrorList::new();
    if vnet == &ManagedControlPlaneVirtualNetwork::default() {
        return errs;
    }

    let parent = parse_cidr(&vnet.cidr_block);
    if parent.is_none() {
        errs.push(FieldError::invalid(
            path.child("cidrBlock"),
            &vnet.cidr_block,
            "pre-existing virtual networks CIDR block is invalid",
        ));
    }
    let subnet = parse_cidr(&vnet.subnet.cidr_block);
    if subnet.is_none() {
        errs.push(FieldError::invalid(
            path.child("subnet").child("cidrBlock"),
            &vnet.subnet.cidr_block,
            "pre-existing subnets CIDR block is invalid",
        ));
    }
    if let (Some(parent), Some(subnet)) = (parent, subnet) {
        if !parent.contains(&subnet.addr()) {
            errs.push(FieldError::invalid(
                path.child("cidrBlock"),
                &vnet.cidr_block,
                "pre-existing virtual networks CIDR block should contain the subnet CIDR block",
            ));
        }
    }

    errs
}

/// Check the `dnsServiceIP` against the service network of the owning Cluster.
///
/// Skipped when the object carries no cluster-name label. A failed read is
/// reported as an internal field error rather than failing the request.
pub async fn validate_cluster_network(
    store: &dyn ResourceStore,
    labels: &BTreeMap<String, String>,
    namespace: &str,
    dns_service_ip: Option<&str>,
) -> ErrorList {
    let mut errs = ErrorList::new();
    let Some(cluster_name) = labels.get(CLUSTER_NAME_LABEL) else {
        return errs;
    };

    let network = FieldPath::from_parts("Cluster", &["spec", "clusterNetwork"]);
    let owner = match store.get(&cluster_resource(), namespace, cluster_name).await {
        Ok(Some(owner)) => owner,
        Ok(None) => {
            errs.push(FieldError::internal(
                network,
                format!("clusters.cluster.x-k8s.io {:?} not found", cluster_name),
            ));
            return errs;
        }
        Err(e) => {
            errs.push(FieldError::internal(network, e));
            return errs;
        }
    };
    let cluster_network = match CapiClusterSpec::from_dynamic(&owner) {
        Ok(spec) => spec.cluster_network.unwrap_or_default(),
        Err(e) => {
            errs.push(FieldError::internal(network, e));
            return errs;
        }
    };

    let services = network.child("services");
    let service_cidrs = cluster_network.services.map(|s| s.cidr_blocks).unwrap_or_default();
    if service_cidrs.len() > 1 {
        errs.push(FieldError::too_many(services.child("cidrBlocks"), service_cidrs.len(), 1));
    }
    let pod_cidrs = cluster_network.pods.map(|p| p.cidr_blocks).unwrap_or_default();
    if pod_cidrs.len() > 1 {
        errs.push(FieldError::too_many(
            network.child("pods").child("cidrBlocks"),
            pod_cidrs.len(),
            1,
        ));
    }

    let Some(dns_ip) = dns_service_ip else {
        return errs;
    };
    let service_cidr = match service_cidrs.as_slice() {
        [single] => single.as_str(),
        _ => "",
    };
    if service_cidr.is_empty() {
        errs.push(FieldError::required(
            services.child("cidrBlocks"),
            "service CIDR must be specified if specifying DNSServiceIP",
        ));
    }
    let cidr = parse_cidr(service_cidr);
    if cidr.is_none() {
        errs.push(FieldError::invalid(
            services.child("cidrBlocks"),
            service_cidr,
            "failed to parse cluster service cidr",
        ));
    }

    let Ok(ip) = dns_ip.parse::<IpAddr>() else {
        errs.push(FieldError::invalid(
            services.child("dnsServiceIP"),
            dns_ip,
            "must be a valid IP address",
        ));
        return errs;
    };
    if cidr.is_some_and(|c| !c.contains(&ip)) {
        errs.push(FieldError::invalid(
            services.child("cidrBlocks"),
            service_cidr,
            "DNSServiceIP must reside within the associated cluster serviceCIDR",
        ));
    }
    if !ip.to_string().ends_with(".10") {
        errs.push(FieldError::invalid(
            services.child("dnsServiceIP"),
            dns_ip,
            "must end with \".10\"",
        ));
    }

    errs
}

/// `true` when `new` is a lower version than `old`. Unparseable versions are
/// left to the field rules.
fn is_downgrade(old: &str, new: &str) -> bool {
    let parse = |v: &str| semver::Version::parse(v.trim_start_matches('v')).ok();
    match (parse(old), parse(new)) {
        (Some(old), Some(new)) => new < old,
        _ => false,
    }
}

/// Both specs with the current defaults applied, so a field whose default
/// rule postdates `old` compares equal. Generated key material comes from `new`.
pub(crate) fn update_baseline(
    old: &AzureManagedControlPlaneSpec,
    new: &AzureManagedControlPlaneSpec,
    name: &str,
) -> (AzureManagedControlPlaneSpec, AzureManagedControlPlaneSpec) {
    let mut new_spec = new.clone();
    default_control_plane_spec(&mut new_spec, name);

    let mut old_spec = old.clone();
    if old_spec.ssh_public_key.is_none() {
        old_spec.ssh_public_key = new_spec.ssh_public_key.clone();
    }
    default_control_plane_spec(&mut old_spec, name);

    (old_spec, new_spec)
}

/// Transition rules between two AzureManagedControlPlane specs. `name` is the
/// object name, which feeds the name-derived defaults.
pub fn validate_control_plane_update(
    old: &AzureManagedControlPlaneSpec,
    new: &AzureManagedControlPlaneSpec,
    name: &str,
) -> ErrorList {
    let (old, new) = update_baseline(old, new, name);
    let (old, new) = (&old, &new);
    let mut errs = ErrorList::new();
    let spec = FieldPath::new("spec");

    immutable(&mut errs, spec.child("subscriptionID"), &old.subscription_id, &new.subscription_id);
    immutable(
        &mut errs,
        spec.child("resourceGroupName"),
        &old.resource_group_name,
        &new.resource_group_name,
    );
    immutable(
        &mut errs,
        spec.child("nodeResourceGroupName"),
        &old.node_resource_group_name,
        &new.node_resource_group_name,
    );
    immutable(&mut errs, spec.child("location"), &old.location, &new.location);
    immutable(&mut errs, spec.child("sshPublicKey"), &old.ssh_public_key, &new.ssh_public_key);
    immutable(&mut errs, spec.child("dnsServiceIP"), &old.dns_service_ip, &new.dns_service_ip);
    immutable(&mut errs, spec.child("networkPlugin"), &old.network_plugin, &new.network_plugin);
    immutable(&mut errs, spec.child("networkPolicy"), &old.network_policy, &new.network_policy);
    immutable(
        &mut errs,
        spec.child("networkDataplane"),
        &old.network_dataplane,
        &new.network_dataplane,
    );
    immutable(
        &mut errs,
        spec.child("loadBalancerSKU"),
        &old.load_balancer_sku,
        &new.load_balancer_sku,
    );
    immutable(
        &mut errs,
        spec.child("httpProxyConfig"),
        &old.http_proxy_config,
        &new.http_proxy_config,
    );
    immutable(
        &mut errs,
        spec.child("azureEnvironment"),
        &old.azure_environment,
        &new.azure_environment,
    );
    immutable(&mut errs, spec.child("outboundType"), &old.outbound_type, &new.outbound_type);
    immutable(&mut errs, spec.child("dnsPrefix"), &old.dns_prefix, &new.dns_prefix);

    errs.append(validate_virtual_network_update(&old.virtual_network, &new.virtual_network));

    let removed: Vec<(usize, &str)> = {
        let kept: HashSet<&str> = new.addon_profiles.iter().map(|a| a.name.as_str()).collect();
        old.addon_profiles
            .iter()
            .enumerate()
            .filter(|(_, a)| !kept.contains(a.name.as_str()))
            .map(|(i, a)| (i, a.name.as_str()))
            .collect()
    };
    for (i, addon) in removed {
        errs.push(FieldError::invalid(
            spec.child("addonProfiles"),
            &new.addon_profiles,
            format!(
                "cannot remove addonProfile {}, To disable this AddonProfile, update Spec.AddonProfiles[{}].Enabled to false",
                addon, i
            ),
        ));
    }

    let old_access =
        old.api_server_access_profile.clone().unwrap_or_default().without_authorized_ranges();
    let new_access =
        new.api_server_access_profile.clone().unwrap_or_default().without_authorized_ranges();
    if old_access != new_access {
        errs.push(FieldError::invalid(
            spec.child("apiServerAccessProfile"),
            &new.api_server_access_profile,
            "fields (except for AuthorizedIPRanges) are immutable",
        ));
    }

    let overlay = Some(NETWORK_PLUGIN_MODE_OVERLAY);
    if old.network_plugin_mode.as_deref() != overlay
        && new.network_plugin_mode.as_deref() == overlay
        && old.network_policy.is_some()
    {
        errs.push(FieldError::forbidden(
            spec.child("networkPluginMode"),
            format!(
                "{:?} NetworkPluginMode cannot be enabled when NetworkPolicy is set",
                NETWORK_PLUGIN_MODE_OVERLAY
            ),
        ));
    }

    errs.append(validate_aad_update(old, new, &spec));

    let old_channel = old.auto_upgrade_profile.as_ref().and_then(|p| p.upgrade_channel.as_ref());
    let new_channel = new.auto_upgrade_profile.as_ref().and_then(|p| p.upgrade_channel.as_ref());
    if let (Some(channel), None) = (old_channel, new_channel) {
        errs.push(FieldError::invalid(
            spec.child("autoUpgradeProfile").child("upgradeChannel"),
            channel,
            "field cannot be set to nil, to disable auto upgrades set the channel to none.",
        ));
    }

    if is_downgrade(&old.version, &new.version) {
        errs.push(FieldError::invalid(
            spec.child("version"),
            &new.version,
            "field version cannot be downgraded",
        ));
    }

    let old_oidc = old.oidc_issuer_profile.as_ref().and_then(|p| p.enabled);
    let new_oidc = new.oidc_issuer_profile.as_ref().and_then(|p| p.enabled);
    if old_oidc == Some(true) && new_oidc == Some(false) {
        errs.push(FieldError::forbidden(
            spec.child("oidcIssuerProfile").child("enabled"),
            "cannot be disabled",
        ));
    }

    if let (Some(old_member), Some(new_member)) = (&old.fleets_member, &new.fleets_member) {
        if !old_member.name.is_empty() && old_member.name != new_member.name {
            errs.push(FieldError::forbidden(
                spec.child("fleetsMember").child("name"),
                "Name is immutable",
            ));
        }
    }

    errs.append(validate_extensions_update(
        &old.extensions,
        &new.extensions,
        &spec.child("extensions"),
    ));
    errs.append(validate_security_profile_update(old, new, &spec.child("securityProfile")));

    errs
}

/// Extensions are matched by name. Type, plan, scope, release train, version
/// and identity of a kept extension cannot change; optional ones are only
/// compared when set on both sides.
fn validate_extensions_update(
    old: &[AksExtension],
    new: &[AksExtension],
    path: &FieldPath,
) -> ErrorList {
    let mut errs = ErrorList::new();
    let by_name: BTreeMap<&str, &AksExtension> = old.iter().map(|e| (e.name.as_str(), e)).collect();

    fn both_set<T: PartialEq>(old: &Option<T>, new: &Option<T>) -> bool {
        matches!((old, new), (Some(o), Some(n)) if o != n)
    }

    for (i, ext) in new.iter().enumerate() {
        let Some(prev) = by_name.get(ext.name.as_str()) else {
            continue;
        };
        let ext_path = path.index(i);
        if both_set(&prev.extension_type, &ext.extension_type) {
            errs.push(FieldError::invalid(
                ext_path.child("extensionType"),
                &ext.extension_type,
                IMMUTABLE,
            ));
        }
        if both_set(&prev.plan, &ext.plan) {
            errs.push(FieldError::invalid(ext_path.child("plan"), &ext.plan, IMMUTABLE));
        }
        if prev.scope != ext.scope {
            errs.push(FieldError::invalid(ext_path.child("scope"), &ext.scope, IMMUTABLE));
        }
        if both_set(&prev.release_train, &ext.release_train) {
            errs.push(FieldError::invalid(
                ext_path.child("releaseTrain"),
                &ext.release_train,
                IMMUTABLE,
            ));
        }
        if both_set(&prev.version, &ext.version) {
            errs.push(FieldError::invalid(ext_path.child("version"), &ext.version, IMMUTABLE));
        }
        if prev.identity != ext.identity {
            errs.push(FieldError::invalid(ext_path.child("identity"), &ext.identity, IMMUTABLE));
        }
    }

    errs
}

/// Security sub-profiles can be switched off but never removed.
fn validate_security_profile_update(
    old: &AzureManagedControlPlaneSpec,
    new: &AzureManagedControlPlaneSpec,
    path: &FieldPath,
) -> ErrorList {
    let mut errs = ErrorList::new();
    let Some(old_profile) = &old.security_profile else {
        return errs;
    };
    let new_profile = new.security_profile.clone().unwrap_or_default();

    let removals = [
        (
            "azureKeyVaultKms",
            old_profile.azure_key_vault_kms.is_some() && new_profile.azure_key_vault_kms.is_none(),
            "cannot unset Spec.SecurityProfile.AzureKeyVaultKms profile to disable the profile please set Spec.SecurityProfile.AzureKeyVaultKms.Enabled to false",
        ),
        (
            "workloadIdentity",
            old_profile.workload_identity.is_some() && new_profile.workload_identity.is_none(),
            "cannot unset Spec.SecurityProfile.WorkloadIdentity, to disable workloadIdentity please set Spec.SecurityProfile.WorkloadIdentity.Enabled to false",
        ),
        (
            "imageCleaner",
            old_profile.image_cleaner.is_some() && new_profile.image_cleaner.is_none(),
            "cannot unset Spec.SecurityProfile.ImageCleaner, to disable imageCleaner please set Spec.SecurityProfile.ImageCleaner.Enabled to false",
        ),
        (
            "defender",
            old_profile.defender.is_some() && new_profile.defender.is_none(),
            "cannot unset Spec.SecurityProfile.Defender, to disable defender please set Spec.SecurityProfile.Defender.SecurityMonitoring.Enabled to false",
        ),
    ];
    for (field, removed, detail) in removals {
        if removed {
            errs.push(FieldError::invalid(path.child(field), &serde_json::Value::Null, detail));
        }
    }

    errs
}

fn validate_virtual_network_update(
    old: &ManagedControlPlaneVirtualNetwork,
    new: &ManagedControlPlaneVirtualNetwork,
) -> ErrorList {
    let mut errs = ErrorList::new();
    let path = FieldPath::from_parts("spec", &["virtualNetwork"]);
    let checks = [
        (path.child("name"), &old.name, &new.name, "Virtual Network Name is immutable"),
        (
            path.child("cidrBlock"),
            &old.cidr_block,
            &new.cidr_block,
            "Virtual Network CIDRBlock is immutable",
        ),
        (
            path.child("subnet").child("name"),
            &old.subnet.name,
            &new.subnet.name,
            "Subnet Name is immutable",
        ),
        (
            path.child("subnet").child("cidrBlock"),
            &old.subnet.cidr_block,
            &new.subnet.cidr_block,
            "Subnet CIDRBlock is immutable",
        ),
        (
            path.child("resourceGroup"),
            &old.resource_group,
            &new.resource_group,
            "Virtual Network Resource Group is immutable",
        ),
    ];
    for (field, old, new, detail) in checks {
        if old != new {
            errs.push(FieldError::invalid(field, new, detail));
        }
    }
    errs
}

fn validate_aad_update(
    old: &AzureManagedControlPlaneSpec,
    new: &AzureManagedControlPlaneSpec,
    spec: &FieldPath,
) -> ErrorList {
    let mut errs = ErrorList::new();
    let aad = spec.child("aadProfile");

    if let Some(old_aad) = &old.aad_profile {
        match &new.aad_profile {
            None => errs.push(FieldError::invalid(
                aad,
                &new.aad_profile,
                "field cannot be nil, cannot disable AADProfile",
            )),
            Some(new_aad) => {
                if old_aad.managed && !new_aad.managed {
                    errs.push(FieldError::invalid(
                        aad.child("managed"),
                        &new_aad.managed,
                        "cannot set AADProfile.Managed to false",
                    ));
                }
                if new_aad.admin_group_object_ids.is_empty() {
                    errs.push(FieldError::invalid(
                        aad.child("adminGroupObjectIDs"),
                        &new_aad.admin_group_object_ids,
                        "length of AADProfile.AdminGroupObjectIDs cannot be zero",
                    ));
                }
            }
        }
    }

    let local_accounts = spec.child("disableLocalAccounts");
    if old.disable_local_accounts.is_none()
        && new.disable_local_accounts.is_some()
        && new.aad_profile.is_none()
    {
        errs.push(FieldError::invalid(
            local_accounts.clone(),
            &new.disable_local_accounts,
            "DisableLocalAccounts can be set only for AAD enabled clusters",
        ));
    }
    one_directional(
        &mut errs,
        local_accounts,
        &old.disable_local_accounts,
        &new.disable_local_accounts,
        &true,
    );

    errs
}
