//! AzureCluster validation policy.
//!
//! Validates:
//! - resource group, vnet and subnet naming and CIDR layout
//! - security rules and load balancer shapes
//! - which network fields may change after creation

use std::collections::HashSet;

use kube::ResourceExt;

use super::Validate;
use super::common::{
    is_dns_name, parse_cidr, validate_cidr, validate_resource_group, validate_subnet_name,
    validate_vnet_name,
};
use super::immutability::{immutable, immutable_once_set, keyed};
use crate::crd::{
    AzureCluster, AzureClusterSpec, AzureClusterTemplate, LoadBalancerSpec, LoadBalancerType,
    NetworkSpec, SubnetRole, SubnetSpec,
};
use crate::webhooks::defaults::cluster::default_cluster_spec;
use crate::webhooks::field::{ErrorList, FieldError, FieldPath};

pub const IDENTITY_KIND: &str = "AzureClusterIdentity";
const SUPPORTED_PROTOCOLS: &[&str] = &["*", "Tcp", "Udp", "Icmp"];
const MIN_RULE_PRIORITY: i32 = 100;
const MAX_RULE_PRIORITY: i32 = 4096;
const MIN_OUTBOUND_FRONTEND_IPS: i32 = 1;
const MAX_OUTBOUND_FRONTEND_IPS: i32 = 16;
const MIN_OUTBOUND_IDLE_TIMEOUT: i32 = 4;
const MAX_OUTBOUND_IDLE_TIMEOUT: i32 = 30;

impl Validate for AzureCluster {
    fn validate_fields(&self) -> ErrorList {
        validate_cluster_spec(&self.spec, &FieldPath::new("spec"))
    }

    fn validate_transition(&self, old: &Self) -> ErrorList {
        validate_cluster_update(&old.spec, &self.spec, &old.name_any())
    }
}

impl Validate for AzureClusterTemplate {
    fn validate_fields(&self) -> ErrorList {
        validate_cluster_spec(
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
                "AzureClusterTemplate spec.template.spec field is immutable. Please create new resource instead.",
            ));
        }
        errs
    }
}

pub fn validate_cluster_spec(spec: &AzureClusterSpec, root: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    if let Some(rg) = spec.resource_group.as_deref() {
        errs.extend(validate_resource_group(rg, root.child("resourceGroup")));
    }

    if let Some(identity) = &spec.identity_ref {
        if identity.kind != IDENTITY_KIND {
            errs.push(FieldError::not_supported(
                root.child("identityRef").child("kind"),
                &identity.kind,
                &[IDENTITY_KIND],
            ));
        }
    }

    errs.append(validate_network_spec(&spec.network_spec, &root.child("networkSpec")));
    errs
}

fn validate_network_spec(network: &NetworkSpec, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let vnet_path = path.child("vnet");

    if !network.vnet.name.is_empty() {
        errs.extend(validate_vnet_name(&network.vnet.name, vnet_path.child("name")));
    }
    if let Some(rg) = network.vnet.resource_group.as_deref() {
        errs.extend(validate_resource_group(rg, vnet_path.child("resourceGroup")));
    }
    for (i, cidr) in network.vnet.cidr_blocks.iter().enumerate() {
        errs.extend(validate_cidr(cidr, vnet_path.child("cidrBlocks").index(i)));
    }

    errs.append(validate_subnets(network, &path.child("subnets")));

    if let Some(lb) = &network.api_server_lb {
        errs.append(validate_api_server_lb(lb, &path.child("apiServerLB")));
    }
    if let Some(lb) = &network.node_outbound_lb {
        errs.append(validate_outbound_lb(lb, &path.child("nodeOutboundLB")));
    }
    if let Some(lb) = &network.control_plane_outbound_lb {
        let lb_path = path.child("controlPlaneOutboundLB");
        if !network.is_api_server_internal() {
            errs.push(FieldError::forbidden(
                lb_path.clone(),
                "Control plane outbound load balancer cannot be set for public clusters.",
            ));
        }
        errs.append(validate_outbound_lb(lb, &lb_path));
    }

    if let Some(zone) = network.private_dns_zone_name.as_deref() {
        let zone_path = path.child("privateDNSZoneName");
        if !network.is_api_server_internal() {
            errs.push(FieldError::invalid(
                zone_path.clone(),
                zone,
                "PrivateDNSZoneName is available only if APIServerLB.Type is Internal",
            ));
        }
        if !is_dns_name(zone) {
            errs.push(FieldError::invalid(
                zone_path,
                zone,
                "PrivateDNSZoneName can only contain alphanumeric characters, underscores and hyphens, cannot start with a hyphen or end with a period",
            ));
        }
    }

    errs
}

fn validate_subnets(network: &NetworkSpec, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let vnet_cidrs: Vec<_> =
        network.vnet.cidr_blocks.iter().filter_map(|c| parse_cidr(c)).collect();
    let mut names = HashSet::new();

    for (i, subnet) in network.subnets.iter().enumerate() {
        let subnet_path = path.index(i);

        if let Some(err) = validate_subnet_name(&subnet.name, subnet_path.child("name")) {
            errs.push(err);
        } else if !names.insert(subnet.name.as_str()) {
            errs.push(FieldError::duplicate(subnet_path.child("name"), &subnet.name));
        }

        for (j, cidr) in subnet.cidr_blocks.iter().enumerate() {
            let cidr_path = subnet_path.child("cidrBlocks").index(j);
            match parse_cidr(cidr) {
                None => errs.push(FieldError::invalid(cidr_path, cidr, "invalid CIDR format")),
                Some(net) if network.vnet.is_managed() && !vnet_cidrs.is_empty() => {
                    if !vnet_cidrs.iter().any(|v| v.contains(&net)) {
                        errs.push(FieldError::invalid(
                            cidr_path,
                            cidr,
                            "subnet CIDR not in vnet address space",
                        ));
                    }
                }
                Some(_) => {}
            }
        }

        let rules_path = subnet_path.child("securityGroup").child("securityRules");
        errs.append(validate_security_rules(subnet, &rules_path));
    }

    let control_planes = network.subnets_with_role(SubnetRole::ControlPlane).count();
    if control_planes == 0 {
        errs.push(FieldError::required(
            path.clone(),
            format!("required role {} not included in provided subnets", SubnetRole::ControlPlane),
        ));
    } else if control_planes > 1 {
        errs.push(FieldError::invalid(
            path.clone(),
            &control_planes,
            "only one control-plane subnet is allowed",
        ));
    }

    errs
}

fn validate_security_rules(subnet: &SubnetSpec, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let mut names = HashSet::new();

    for (i, rule) in subnet.security_group.security_rules.iter().enumerate() {
        let rule_path = path.index(i);
        if !(MIN_RULE_PRIORITY..=MAX_RULE_PRIORITY).contains(&rule.priority) {
            errs.push(FieldError::invalid(
                rule_path.child("priority"),
                &rule.priority,
                format!(
                    "security rule priorities should be between {} and {}",
                    MIN_RULE_PRIORITY, MAX_RULE_PRIORITY
                ),
            ));
        }
        if !names.insert(rule.name.as_str()) {
            errs.push(FieldError::duplicate(rule_path.child("name"), &rule.name));
        }
        if !SUPPORTED_PROTOCOLS.contains(&rule.protocol.as_str()) {
            errs.push(FieldError::not_supported(
                rule_path.child("protocol"),
                &rule.protocol,
                SUPPORTED_PROTOCOLS,
            ));
        }
    }

    errs
}

fn validate_api_server_lb(lb: &LoadBalancerSpec, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    if lb.name.is_empty() {
        errs.push(FieldError::required(
            path.child("name"),
            "API Server load balancer name should not be empty",
        ));
    }
    if lb.frontend_ips.len() != 1 {
        errs.push(FieldError::invalid(
            path.child("frontendIPs"),
            &lb.frontend_ips,
            "API Server Load balancer should have 1 Frontend IP",
        ));
    }

    for (i, frontend) in lb.frontend_ips.iter().enumerate() {
        let ip_path = path.child("frontendIPs").index(i).child("privateIP");
        match (lb.lb_type, frontend.private_ip_address.as_deref()) {
            (Some(LoadBalancerType::Internal), Some(ip)) => {
                if ip.parse::<std::net::IpAddr>().is_err() {
                    errs.push(FieldError::invalid(
                        ip_path,
                        ip,
                        "Internal LB IP address isn't a valid IPv4 or IPv6 address",
                    ));
                }
            }
            (Some(LoadBalancerType::Public), Some(_)) => {
                errs.push(FieldError::forbidden(
                    ip_path,
                    "Public Load Balancers cannot have a Private IP",
                ));
            }
            _ => {}
        }
    }

    errs
}

fn validate_outbound_lb(lb: &LoadBalancerSpec, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    if let Some(count) = lb.frontend_ips_count {
        if !(MIN_OUTBOUND_FRONTEND_IPS..=MAX_OUTBOUND_FRONTEND_IPS).contains(&count) {
            errs.push(FieldError::invalid(
                path.child("frontendIPsCount"),
                &count,
                format!(
                    "outbound load balancer frontend IP count must be between {} and {}",
                    MIN_OUTBOUND_FRONTEND_IPS, MAX_OUTBOUND_FRONTEND_IPS
                ),
            ));
        }
    }
    if let Some(timeout) = lb.idle_timeout_in_minutes {
        if !(MIN_OUTBOUND_IDLE_TIMEOUT..=MAX_OUTBOUND_IDLE_TIMEOUT).contains(&timeout) {
            errs.push(FieldError::invalid(
                path.child("idleTimeoutInMinutes"),
                &timeout,
                format!(
                    "outbound idle timeout should be between {} and {} minutes",
                    MIN_OUTBOUND_IDLE_TIMEOUT, MAX_OUTBOUND_IDLE_TIMEOUT
                ),
            ));
        }
    }

    errs
}

/// Transition rules between two AzureCluster specs.
/// Both specs with the current defaults applied, so a field whose default
/// rule postdates `old` compares equal.
fn update_baseline(
    old: &AzureClusterSpec,
    new: &AzureClusterSpec,
    name: &str,
) -> (AzureClusterSpec, AzureClusterSpec) {
    let mut old_spec = old.clone();
    default_cluster_spec(&mut old_spec, name);
    let mut new_spec = new.clone();
    default_cluster_spec(&mut new_spec, name);
    (old_spec, new_spec)
}

/// Transition rules between two AzureCluster specs. `name` is the object
/// name, which feeds the name-derived defaults.
pub fn validate_cluster_update(
    old: &AzureClusterSpec,
    new: &AzureClusterSpec,
    name: &str,
) -> ErrorList {
    let (old, new) = update_baseline(old, new, name);
    let (old, new) = (&old, &new);
    let mut errs = ErrorList::new();
    let spec = FieldPath::new("spec");
    let net = spec.child("networkSpec");
    let vnet = net.child("vnet");

    immutable(&mut errs, spec.child("resourceGroup"), &old.resource_group, &new.resource_group);
    immutable(&mut errs, spec.child("subscriptionID"), &old.subscription_id, &new.subscription_id);
    immutable(&mut errs, spec.child("location"), &old.location, &new.location);
    immutable(
        &mut errs,
        spec.child("azureEnvironment"),
        &old.azure_environment,
        &new.azure_environment,
    );

    let (o, n) = (&old.network_spec, &new.network_spec);
    immutable(
        &mut errs,
        net.child("privateDNSZoneName"),
        &o.private_dns_zone_name,
        &n.private_dns_zone_name,
    );
    immutable(&mut errs, vnet.child("name"), &o.vnet.name, &n.vnet.name);
    immutable(
        &mut errs,
        vnet.child("resourceGroup"),
        &o.vnet.resource_group,
        &n.vnet.resource_group,
    );
    immutable(&mut errs, vnet.child("cidrBlocks"), &o.vnet.cidr_blocks, &n.vnet.cidr_blocks);
    immutable(&mut errs, net.child("apiServerLB"), &o.api_server_lb, &n.api_server_lb);
    immutable(
        &mut errs,
        net.child("controlPlaneOutboundLB"),
        &o.control_plane_outbound_lb,
        &n.control_plane_outbound_lb,
    );
    immutable(&mut errs, net.child("nodeOutboundLB"), &o.node_outbound_lb, &n.node_outbound_lb);

    keyed(
        &mut errs,
        net.child("subnets"),
        &o.subnets,
        &n.subnets,
        |s| s.name.clone(),
        |errs, path, old, new| {
            immutable(errs, path.child("cidrBlocks"), &old.cidr_blocks, &new.cidr_blocks);
            immutable(
                errs,
                path.child("routeTable").child("name"),
                &old.route_table.name,
                &new.route_table.name,
            );
            if old.is_nat_gateway_enabled() {
                immutable(
                    errs,
                    path.child("natGateway").child("name"),
                    &old.nat_gateway.name,
                    &new.nat_gateway.name,
                );
            }
            immutable(
                errs,
                path.child("securityGroup").child("name"),
                &old.security_group.name,
                &new.security_group.name,
            );
        },
    );

    immutable_once_set(
        &mut errs,
        spec.child("bastionSpec").child("azureBastion"),
        &old.bastion_spec.azure_bastion,
        &new.bastion_spec.azure_bastion,
    );

    errs
}
