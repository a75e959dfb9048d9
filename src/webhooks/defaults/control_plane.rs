//! AzureManagedControlPlane defaulting.

use kube::ResourceExt;
use tracing::warn;

use super::ssh::generate_public_key;
use super::{default_opt_string, default_string};
use crate::crd::{
    AksSku, AutoScalerProfile, AzureManagedControlPlane, AzureManagedControlPlaneSpec,
    AzureManagedControlPlaneTemplate, OidcIssuerProfile,
};

pub const DEFAULT_AKS_VNET_CIDR: &str = "10.0.0.0/8";
pub const DEFAULT_AKS_SUBNET_CIDR: &str = "10.240.0.0/16";

/// Default an AzureManagedControlPlane in place.
pub fn default_managed_control_plane(amcp: &mut AzureManagedControlPlane) {
    let name = amcp.name_any();
    default_control_plane_spec(&mut amcp.spec, &name);
}

pub fn default_managed_control_plane_template(template: &mut AzureManagedControlPlaneTemplate) {
    let name = template.name_any();
    default_control_plane_spec(&mut template.spec.template.spec, &name);
}

pub fn default_control_plane_spec(spec: &mut AzureManagedControlPlaneSpec, name: &str) {
    if !spec.version.is_empty() && !spec.version.starts_with('v') {
        spec.version = format!("v{}", spec.version);
    }

    spec.sku.get_or_insert_with(AksSku::default);

    // Some("") is a deliberate opt-out and stays untouched.
    if spec.ssh_public_key.is_none() {
        match generate_public_key() {
            Ok(key) => spec.ssh_public_key = Some(key),
            Err(e) => warn!(name, error = %e, "Failed to generate SSH key, leaving it unset"),
        }
    }

    let node_rg = format!("MC_{}_{}_{}", spec.resource_group_name, name, spec.location);
    default_opt_string(&mut spec.node_resource_group_name, || node_rg);

    let vnet = &mut spec.virtual_network;
    default_string(&mut vnet.name, || name.to_string());
    default_string(&mut vnet.cidr_block, || DEFAULT_AKS_VNET_CIDR.to_string());
    default_string(&mut vnet.resource_group, || spec.resource_group_name.clone());
    default_string(&mut vnet.subnet.name, || name.to_string());
    default_string(&mut vnet.subnet.cidr_block, || DEFAULT_AKS_SUBNET_CIDR.to_string());

    spec.oidc_issuer_profile
        .get_or_insert_with(OidcIssuerProfile::default)
        .enabled
        .get_or_insert(false);

    default_opt_string(&mut spec.dns_prefix, || name.to_string());

    if let Some(profile) = spec.auto_scaler_profile.as_mut() {
        default_auto_scaler_profile(profile);
    }
}

/// Fill the published cluster-autoscaler defaults.
pub fn default_auto_scaler_profile(profile: &mut AutoScalerProfile) {
    let fill = |field: &mut Option<String>, value: &str| {
        field.get_or_insert_with(|| value.to_string());
    };

    fill(&mut profile.balance_similar_node_groups, "false");
    fill(&mut profile.expander, "random");
    fill(&mut profile.max_empty_bulk_delete, "10");
    fill(&mut profile.max_graceful_termination_sec, "600");
    fill(&mut profile.max_node_provision_time, "15m");
    fill(&mut profile.max_total_unready_percentage, "45");
    fill(&mut profile.new_pod_scale_up_delay, "0s");
    fill(&mut profile.ok_total_unready_count, "3");
    fill(&mut profile.scan_interval, "10s");
    fill(&mut profile.scale_down_delay_after_add, "10m");
    // mirrors the scan interval
    let scan_interval = profile.scan_interval.clone().unwrap_or_default();
    fill(&mut profile.scale_down_delay_after_delete, &scan_interval);
    fill(&mut profile.scale_down_delay_after_failure, "3m");
    fill(&mut profile.scale_down_unneeded_time, "10m");
    fill(&mut profile.scale_down_unready_time, "20m");
    fill(&mut profile.scale_down_utilization_threshold, "0.5");
    fill(&mut profile.skip_nodes_with_local_storage, "false");
    fill(&mut profile.skip_nodes_with_system_pods, "true");
}
