//! Rules shared by several kinds: key material, Azure resource IDs, CIDRs
//! and the name patterns Azure enforces.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ipnet::IpNet;
use regex::Regex;
use ssh_key::PublicKey;

use crate::crd::PrivateEndpointSpec;
use crate::webhooks::field::{ErrorList, FieldError, FieldPath};

/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}...`,
/// optionally with the `azure://` scheme of a provider ID.
static RESOURCE_ID: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(azure://)?/subscriptions/[^/]+/resourcegroups/[^/]+/providers/[^/]+/[^/]+/[^/]+.*$",
    )
    .ok()
});

static RESOURCE_GROUP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[-\w\._\(\)]+$").ok());

static NETWORK_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[-\w\._]+$").ok());

static DNS_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}$").ok()
});

/// A Go-style duration such as `0s`, `1m30s` or `250ms`.
static DURATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(0|([0-9]+(\.[0-9]+)?(ns|us|µs|ms|s|m|h))+)$").ok());

pub const MAX_RESOURCE_GROUP_LENGTH: usize = 90;
pub const MAX_SUBNET_NAME_LENGTH: usize = 80;

/// Match against a lazily compiled pattern. A pattern that failed to compile matches nothing.
pub(crate) fn matches(re: &LazyLock<Option<Regex>>, value: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(value))
}

pub fn is_resource_id(value: &str) -> bool {
    matches(&RESOURCE_ID, value)
}

pub fn is_dns_name(value: &str) -> bool {
    matches(&DNS_NAME, value)
}

pub fn is_duration(value: &str) -> bool {
    matches(&DURATION, value)
}

pub fn is_uuid(value: &str) -> bool {
    uuid::Uuid::parse_str(value).is_ok()
}

/// `-1` means "pay up to the on-demand price".
pub fn is_valid_max_price(price: &str) -> bool {
    price == "-1" || price.parse::<f64>().is_ok_and(|p| p.is_finite() && p > 0.0)
}

pub fn parse_cidr(value: &str) -> Option<IpNet> {
    value.parse().ok()
}

/// A base64-encoded OpenSSH public key.
pub fn validate_ssh_key(key: &str, path: FieldPath) -> ErrorList {
    let Ok(decoded) = STANDARD.decode(key.trim()) else {
        return FieldError::required(path, "the SSH public key is not properly base64 encoded")
            .into();
    };
    let parsed = String::from_utf8(decoded)
        .ok()
        .and_then(|line| PublicKey::from_openssh(line.trim()).ok());
    if parsed.is_none() {
        return FieldError::required(path, "the SSH public key is not valid").into();
    }
    ErrorList::new()
}

pub fn validate_resource_id(value: &str, path: FieldPath) -> Option<FieldError> {
    (!is_resource_id(value)).then(|| {
        FieldError::invalid(path, value, "must be a valid Azure resource ID")
    })
}

pub fn validate_resource_group(value: &str, path: FieldPath) -> Option<FieldError> {
    if value.len() > MAX_RESOURCE_GROUP_LENGTH {
        return Some(FieldError::invalid(
            path,
            value,
            format!("resource group name must be at most {} characters", MAX_RESOURCE_GROUP_LENGTH),
        ));
    }
    (!matches(&RESOURCE_GROUP, value)).then(|| {
        FieldError::invalid(
            path,
            value,
            r"resource group name may only contain alphanumerics, underscores, parentheses, hyphens and periods",
        )
    })
}

pub fn validate_vnet_name(value: &str, path: FieldPath) -> Option<FieldError> {
    (!matches(&NETWORK_NAME, value)).then(|| {
        FieldError::invalid(
            path,
            value,
            r"name of virtual network doesn't match regex ^[-\w\._]+$",
        )
    })
}

pub fn validate_subnet_name(value: &str, path: FieldPath) -> Option<FieldError> {
    if value.is_empty() {
        return Some(FieldError::required(path, "subnet name cannot be empty"));
    }
    if value.len() > MAX_SUBNET_NAME_LENGTH || !matches(&NETWORK_NAME, value) {
        return Some(FieldError::invalid(
            path,
            value,
            format!(
                r"name of subnet doesn't match regex ^[-\w\._]+$ or exceeds {} characters",
                MAX_SUBNET_NAME_LENGTH
            ),
        ));
    }
    None
}

pub fn validate_cidr(value: &str, path: FieldPath) -> Option<FieldError> {
    parse_cidr(value)
        .is_none()
        .then(|| FieldError::invalid(path, value, "invalid CIDR format"))
}

/// Private endpoints of a subnet: names, link service connections, and static
/// IPs that must fall inside one of `subnet_cidrs`.
pub fn validate_private_endpoints(
    endpoints: &[PrivateEndpointSpec],
    subnet_cidrs: &[&str],
    path: &FieldPath,
) -> ErrorList {
    let mut errs = ErrorList::new();
    let ranges: Vec<IpNet> = subnet_cidrs.iter().filter_map(|c| parse_cidr(c)).collect();

    for (i, endpoint) in endpoints.iter().enumerate() {
        let ep_path = path.index(i);
        if !matches(&NETWORK_NAME, &endpoint.name) {
            errs.push(FieldError::invalid(
                ep_path.child("name"),
                &endpoint.name,
                r"name of private endpoint doesn't match regex ^[-\w\._]+$",
            ));
        }

        let connections = ep_path.child("privateLinkServiceConnections");
        if endpoint.private_link_service_connections.is_empty() {
            errs.push(FieldError::invalid(
                connections.clone(),
                &endpoint.private_link_service_connections,
                "privateLinkServiceConnections cannot be empty",
            ));
        }
        for (j, connection) in endpoint.private_link_service_connections.iter().enumerate() {
            let conn_path = connections.index(j);
            if connection.private_link_service_id.is_empty() {
                errs.push(FieldError::required(
                    conn_path.child("privateLinkServiceID"),
                    "privateLinkServiceID is required",
                ));
            } else if let Some(err) = validate_resource_id(
                &connection.private_link_service_id,
                conn_path.child("privateLinkServiceID"),
            ) {
                errs.push(err);
            }
            if !connection.name.is_empty() && !matches(&NETWORK_NAME, &connection.name) {
                errs.push(FieldError::invalid(
                    conn_path.child("name"),
                    &connection.name,
                    r"name of private link service connection doesn't match regex ^[-\w\._]+$",
                ));
            }
        }

        for address in &endpoint.private_ip_addresses {
            let in_subnet = address
                .parse::<std::net::IpAddr>()
                .is_ok_and(|ip| ranges.iter().any(|r| r.contains(&ip)));
            if !in_subnet {
                errs.push(FieldError::invalid(
                    ep_path.child("privateIPAddresses"),
                    address,
                    format!(
                        "Private Endpoint IP address needs to be in subnet range ({})",
                        subnet_cidrs.join(", ")
                    ),
                ));
            }
        }
    }

    errs
}
