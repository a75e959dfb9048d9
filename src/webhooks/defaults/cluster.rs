//! AzureCluster defaulting.
//!
//! Defaults cascade top-down: the resource group feeds the vnet, the subnet
//! layout decides whether a node outbound load balancer is needed, and load
//! balancer names feed their frontend and backend pool names.

use kube::ResourceExt;

use super::{default_opt_string, default_string};
use crate::crd::{
    AzureBastion, AzureCluster, AzureClusterSpec, AzureClusterTemplate, BastionSpec,
    DEFAULT_AZURE_ENVIRONMENT, FrontendIp, LoadBalancerSku, LoadBalancerSpec, LoadBalancerType,
    NetworkSpec, PublicIpSpec, SecurityRule, SecurityRuleDirection, SubnetRole, SubnetSpec,
};

pub const DEFAULT_VNET_CIDR: &str = "10.0.0.0/8";
pub const DEFAULT_CONTROL_PLANE_SUBNET_CIDR: &str = "10.0.0.0/16";
pub const DEFAULT_NODE_SUBNET_CIDR: &str = "10.1.0.0/16";
pub const DEFAULT_BASTION_SUBNET_CIDR: &str = "10.1.255.0/24";
pub const DEFAULT_BASTION_SUBNET_NAME: &str = "AzureBastionSubnet";
pub const DEFAULT_BASTION_SKU: &str = "Basic";
pub const DEFAULT_INTERNAL_LB_IP: &str = "10.0.0.100";
pub const DEFAULT_LB_IDLE_TIMEOUT_MINUTES: i32 = 4;
pub const DEFAULT_OUTBOUND_FRONTEND_IPS: i32 = 1;

/// API server port opened by the default control-plane security rule.
const API_SERVER_PORT: &str = "6443";
const ALLOW_API_SERVER_PRIORITY: i32 = 2201;

/// Default an AzureCluster in place.
pub fn default_azure_cluster(cluster: &mut AzureCluster) {
    let name = cluster.name_any();
    default_cluster_spec(&mut cluster.spec, &name);
}

/// Default the inner spec of an AzureClusterTemplate using the template's name.
pub fn default_azure_cluster_template(template: &mut AzureClusterTemplate) {
    let name = template.name_any();
    default_cluster_spec(&mut template.spec.template.spec, &name);
}

pub fn default_cluster_spec(spec: &mut AzureClusterSpec, name: &str) {
    default_opt_string(&mut spec.resource_group, || name.to_string());
    default_opt_string(&mut spec.azure_environment, || DEFAULT_AZURE_ENVIRONMENT.to_string());

    let resource_group = spec.resource_group.clone().unwrap_or_default();
    let network = &mut spec.network_spec;

    default_vnet(network, name, &resource_group);
    default_subnets(network, name);
    default_api_server_lb(network, name, &spec.location);
    default_node_outbound_lb(network, name);
    default_control_plane_outbound_lb(network, name);
    default_bastion(&mut spec.bastion_spec, name);
}

fn default_vnet(network: &mut NetworkSpec, name: &str, resource_group: &str) {
    let vnet = &mut network.vnet;
    default_opt_string(&mut vnet.resource_group, || resource_group.to_string());
    default_string(&mut vnet.name, || format!("{}-vnet", name));
    if vnet.cidr_blocks.is_empty() {
        vnet.cidr_blocks = vec![DEFAULT_VNET_CIDR.to_string()];
    }
}

fn default_subnets(network: &mut NetworkSpec, name: &str) {
    for subnet in &mut network.subnets {
        subnet.role.get_or_insert(SubnetRole::Node);
    }

    if network.subnets_with_role(SubnetRole::ControlPlane).next().is_none() {
        network.subnets.push(SubnetSpec {
            role: Some(SubnetRole::ControlPlane),
            name: format!("{}-controlplane-subnet", name),
            ..Default::default()
        });
    }
    if network.subnets_with_role(SubnetRole::Node).next().is_none() {
        network.subnets.push(SubnetSpec {
            role: Some(SubnetRole::Node),
            name: format!("{}-node-subnet", name),
            ..Default::default()
        });
    }

    for subnet in &mut network.subnets {
        match subnet.role {
            Some(SubnetRole::ControlPlane) => {
                if subnet.cidr_blocks.is_empty() {
                    subnet.cidr_blocks = vec![DEFAULT_CONTROL_PLANE_SUBNET_CIDR.to_string()];
                }
                default_string(&mut subnet.security_group.name, || {
                    format!("{}-controlplane-nsg", name)
                });
                if subnet.security_group.security_rules.is_empty() {
                    subnet.security_group.security_rules.push(allow_api_server_rule());
                }
            }
            Some(SubnetRole::Node) => {
                if subnet.cidr_blocks.is_empty() {
                    subnet.cidr_blocks = vec![DEFAULT_NODE_SUBNET_CIDR.to_string()];
                }
                default_string(&mut subnet.security_group.name, || format!("{}-node-nsg", name));
                default_string(&mut subnet.route_table.name, || {
                    format!("{}-node-routetable", name)
                });
            }
            _ => {}
        }

        for rule in &mut subnet.security_group.security_rules {
            rule.direction.get_or_insert(SecurityRuleDirection::Inbound);
        }

        if subnet.is_nat_gateway_enabled() {
            let nat_name = subnet.nat_gateway.name.clone();
            default_string(&mut subnet.nat_gateway.nat_gateway_ip.name, || {
                format!("pip-{}", nat_name)
            });
        }
    }
}

fn allow_api_server_rule() -> SecurityRule {
    SecurityRule {
        name: "allow_apiserver".to_string(),
        description: "Allow K8s API Server".to_string(),
        protocol: "Tcp".to_string(),
        direction: Some(SecurityRuleDirection::Inbound),
        priority: ALLOW_API_SERVER_PRIORITY,
        source_ports: Some("*".to_string()),
        destination_ports: Some(API_SERVER_PORT.to_string()),
        source: Some("*".to_string()),
        destination: Some("*".to_string()),
    }
}

fn default_api_server_lb(network: &mut NetworkSpec, name: &str, location: &str) {
    let lb = network.api_server_lb.get_or_insert_with(LoadBalancerSpec::default);
    let lb_type = *lb.lb_type.get_or_insert(LoadBalancerType::Public);
    lb.sku.get_or_insert(LoadBalancerSku::Standard);
    lb.idle_timeout_in_minutes
        .get_or_insert(DEFAULT_LB_IDLE_TIMEOUT_MINUTES);

    default_string(&mut lb.name, || match lb_type {
        LoadBalancerType::Public => format!("{}-public-lb", name),
        LoadBalancerType::Internal => format!("{}-internal-lb", name),
    });

    if lb.frontend_ips.is_empty() {
        let frontend_name = format!("{}-frontEnd", lb.name);
        let frontend = match lb_type {
            LoadBalancerType::Public => FrontendIp {
                name: frontend_name,
                private_ip_address: None,
                public_ip: Some(PublicIpSpec {
                    name: format!("pip-{}-apiserver", name),
                    dns_name: Some(format!("{}-apiserver.{}.cloudapp.azure.com", name, location)),
                }),
            },
            LoadBalancerType::Internal => FrontendIp {
                name: frontend_name,
                private_ip_address: Some(DEFAULT_INTERNAL_LB_IP.to_string()),
                public_ip: None,
            },
        };
        lb.frontend_ips.push(frontend);
    }

    let lb_name = lb.name.clone();
    default_string(&mut lb.backend_pool.name, || format!("{}-backendPool", lb_name));
}

/// Whether any node subnet needs egress through a load balancer.
///
/// A node subnet without a NAT gateway has no other way out, and a dual-stack
/// subnet needs the load balancer for IPv6 even when NAT covers IPv4.
pub fn node_subnets_need_outbound_lb(network: &NetworkSpec) -> bool {
    network
        .subnets_with_role(SubnetRole::Node)
        .any(|s| !s.is_nat_gateway_enabled() || s.is_ipv6_enabled())
}

fn default_node_outbound_lb(network: &mut NetworkSpec, name: &str) {
    if network.is_api_server_internal() || !node_subnets_need_outbound_lb(network) {
        return;
    }
    let lb = network
        .node_outbound_lb
        .get_or_insert_with(LoadBalancerSpec::default);
    default_string(&mut lb.name, || name.to_string());
    default_outbound_lb(lb, &format!("pip-{}-node-outbound", name));
}

fn default_control_plane_outbound_lb(network: &mut NetworkSpec, name: &str) {
    let Some(lb) = network.control_plane_outbound_lb.as_mut() else {
        return;
    };
    default_string(&mut lb.name, || format!("{}-outbound-lb", name));
    default_outbound_lb(lb, &format!("pip-{}-controlplane-outbound", name));
}

fn default_outbound_lb(lb: &mut LoadBalancerSpec, public_ip_name: &str) {
    lb.lb_type.get_or_insert(LoadBalancerType::Public);
    lb.sku.get_or_insert(LoadBalancerSku::Standard);
    lb.frontend_ips_count
        .get_or_insert(DEFAULT_OUTBOUND_FRONTEND_IPS);
    lb.idle_timeout_in_minutes
        .get_or_insert(DEFAULT_LB_IDLE_TIMEOUT_MINUTES);

    if lb.frontend_ips.is_empty() {
        lb.frontend_ips.push(FrontendIp {
            name: format!("{}-frontEnd", lb.name),
            private_ip_address: None,
            public_ip: Some(PublicIpSpec {
                name: public_ip_name.to_string(),
                dns_name: None,
            }),
        });
    }

    let lb_name = lb.name.clone();
    default_string(&mut lb.backend_pool.name, || {
        format!("{}-outboundBackendPool", lb_name)
    });
}

fn default_bastion(bastion: &mut BastionSpec, name: &str) {
    let Some(AzureBastion {
        name: bastion_name,
        subnet,
        public_ip,
        sku,
        ..
    }) = bastion.azure_bastion.as_mut()
    else {
        return;
    };

    default_string(bastion_name, || format!("{}-azure-bastion", name));
    default_string(&mut subnet.name, || DEFAULT_BASTION_SUBNET_NAME.to_string());
    subnet.role.get_or_insert(SubnetRole::Bastion);
    if subnet.cidr_blocks.is_empty() {
        subnet.cidr_blocks = vec![DEFAULT_BASTION_SUBNET_CIDR.to_string()];
    }
    default_string(&mut public_ip.name, || format!("{}-bastionIP", name));
    default_opt_string(sku, || DEFAULT_BASTION_SKU.to_string());
}
