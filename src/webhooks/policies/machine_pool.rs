//! AzureManagedMachinePool validation policy.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use kube::ResourceExt;
use regex::Regex;

use super::Validate;
use super::common::{is_valid_max_price, matches, validate_subnet_name};
use super::immutability::{immutable, immutable_once_set, immutable_set};
use crate::crd::{
    AKS_RESERVED_LABEL_PREFIX, AzureManagedMachinePool, AzureManagedMachinePoolSpec,
    AzureManagedMachinePoolTemplate, KubeletConfig, LinuxOsConfig, NodePoolMode, SysctlConfig,
};
use crate::webhooks::defaults::machine_pool::default_machine_pool_spec;
use crate::webhooks::field::{ErrorList, FieldError, FieldPath};

pub const MIN_MAX_PODS: i32 = 10;
pub const MAX_MAX_PODS: i32 = 250;

const SCALE_DOWN_MODE_DEALLOCATE: &str = "Deallocate";

static LINUX_POOL_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new("^[a-z][a-z0-9]{0,11}$").ok());
static WINDOWS_POOL_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new("^[a-z][a-z0-9]{0,5}$").ok());

/// Unsafe sysctls AKS accepts. A trailing `*` matches any suffix.
const ALLOWED_UNSAFE_SYSCTLS: &[&str] =
    &["kernel.shm*", "kernel.msg*", "kernel.sem", "fs.mqueue.*", "net.*"];

impl Validate for AzureManagedMachinePool {
    fn validate_fields(&self) -> ErrorList {
        let name = self.spec.name.clone().unwrap_or_else(|| self.name_any());
        validate_pool_spec(&self.spec, &name, &FieldPath::new("spec"))
    }

    fn validate_transition(&self, old: &Self) -> ErrorList {
        validate_pool_update(&old.spec, &self.spec, &old.name_any())
    }
}

impl Validate for AzureManagedMachinePoolTemplate {
    fn validate_fields(&self) -> ErrorList {
        let spec = &self.spec.template.spec;
        let name = spec.name.clone().unwrap_or_else(|| self.name_any());
        validate_pool_spec(spec, &name, &FieldPath::from_parts("spec", &["template", "spec"]))
    }

    fn validate_transition(&self, old: &Self) -> ErrorList {
        let (old_spec, new_spec) =
            update_baseline(&old.spec.template.spec, &self.spec.template.spec, &old.name_any());

        let mut errs = ErrorList::new();
        if old_spec != new_spec {
            errs.push(FieldError::invalid(
                FieldPath::from_parts("spec", &["template", "spec"]),
                &self.spec.template.spec,
                "AzureManagedMachinePoolTemplate spec.template.spec field is immutable. Please create new resource instead.",
            ));
        }
        errs
    }
}

/// Field rules for one agent pool. `name` is the AKS pool name.
pub fn validate_pool_spec(
    spec: &AzureManagedMachinePoolSpec,
    name: &str,
    root: &FieldPath,
) -> ErrorList {
    let mut errs = ErrorList::new();
    let windows = spec.is_windows();

    let (pattern, limit) = if windows {
        (&WINDOWS_POOL_NAME, 6)
    } else {
        (&LINUX_POOL_NAME, 12)
    };
    if !matches(pattern, name) {
        errs.push(FieldError::invalid(
            root.child("name"),
            name,
            format!(
                "name must start with a lowercase letter, contain only lowercase letters and digits, and be at most {} characters for {} pools",
                limit,
                spec.os_type.as_deref().unwrap_or_default()
            ),
        ));
    }

    if windows {
        if spec.mode == NodePoolMode::System {
            errs.push(FieldError::forbidden(
                root.child("mode"),
                "Windows pools cannot be System pools",
            ));
        }
        if spec.linux_os_config.is_some() {
            errs.push(FieldError::forbidden(
                root.child("linuxOSConfig"),
                "linuxOSConfig can only be set for Linux pools",
            ));
        }
    }

    if let Some(max_pods) = spec.max_pods.filter(|m| !(MIN_MAX_PODS..=MAX_MAX_PODS).contains(m)) {
        errs.push(FieldError::invalid(
            root.child("maxPods"),
            &max_pods,
            format!("MaxPods must be between {} and {}", MIN_MAX_PODS, MAX_MAX_PODS),
        ));
    }

    let labels = root.child("nodeLabels");
    for key in spec.node_labels.keys().filter(|k| k.starts_with(AKS_RESERVED_LABEL_PREFIX)) {
        errs.push(FieldError::invalid(
            labels.key(key),
            key,
            format!("node labels with the {} prefix are reserved", AKS_RESERVED_LABEL_PREFIX),
        ));
    }

    if let Some(scaling) = &spec.scaling {
        if let (Some(min), Some(max)) = (scaling.min_size, scaling.max_size) {
            if min > max {
                errs.push(FieldError::invalid(
                    root.child("scaling").child("minSize"),
                    &min,
                    "minSize must not be greater than maxSize",
                ));
            }
        }
    }

    if let Some(subnet) = spec.subnet_name.as_deref() {
        errs.extend(validate_subnet_name(subnet, root.child("subnetName")));
    }

    if spec.node_public_ip_prefix_id.is_some() && spec.enable_node_public_ip != Some(true) {
        errs.push(FieldError::invalid(
            root.child("enableNodePublicIP"),
            &spec.enable_node_public_ip,
            "must be set to true when nodePublicIPPrefixID is set",
        ));
    }

    errs.append(validate_spot(spec, root));
    if let Some(kubelet) = &spec.kubelet_config {
        errs.append(validate_kubelet_config(kubelet, &root.child("kubeletConfig")));
    }
    if let Some(os_config) = &spec.linux_os_config {
        errs.append(validate_linux_os_config(os_config, spec.kubelet_config.as_ref(), root));
    }

    errs
}

fn validate_spot(spec: &AzureManagedMachinePoolSpec, root: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    if let Some(price) = spec.spot_max_price.as_deref() {
        let path = root.child("spotMaxPrice");
        if !spec.is_spot() {
            errs.push(FieldError::forbidden(
                path,
                "spotMaxPrice can only be set when scaleSetPriority is Spot",
            ));
        } else if !is_valid_max_price(price) {
            errs.push(FieldError::invalid(
                path,
                price,
                "spotMaxPrice must be -1 or a positive number",
            ));
        }
    }
    if spec.is_spot() && spec.scale_down_mode.as_deref() == Some(SCALE_DOWN_MODE_DEALLOCATE) {
        errs.push(FieldError::forbidden(
            root.child("scaleDownMode"),
            "scaleDownMode cannot be Deallocate for Spot pools",
        ));
    }
    errs
}

fn validate_kubelet_config(kubelet: &KubeletConfig, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    if let Some(period) = kubelet.cpu_cfs_quota_period.as_deref() {
        if !period.ends_with("ms") {
            errs.push(FieldError::invalid(
                path.child("cpuCfsQuotaPeriod"),
                period,
                "cpuCfsQuotaPeriod must be in milliseconds and end with 'ms'",
            ));
        }
    }

    let mut threshold = |field: &str, value: Option<i32>| {
        if let Some(v) = value.filter(|v| !(0..=100).contains(v)) {
            errs.push(FieldError::invalid(path.child(field), &v, "must be between 0 and 100"));
        }
    };
    threshold("imageGcHighThreshold", kubelet.image_gc_high_threshold);
    threshold("imageGcLowThreshold", kubelet.image_gc_low_threshold);
    if let (Some(low), Some(high)) =
        (kubelet.image_gc_low_threshold, kubelet.image_gc_high_threshold)
    {
        if low > high {
            errs.push(FieldError::invalid(
                path.child("imageGcLowThreshold"),
                &low,
                "imageGcLowThreshold must not be greater than imageGcHighThreshold",
            ));
        }
    }

    if let Some(files) = kubelet.container_log_max_files.filter(|f| *f < 2) {
        errs.push(FieldError::invalid(
            path.child("containerLogMaxFiles"),
            &files,
            "must be at least 2",
        ));
    }
    if let Some(pids) = kubelet.pod_max_pids.filter(|p| *p < -1) {
        errs.push(FieldError::invalid(path.child("podMaxPids"), &pids, "must be -1 or greater"));
    }

    let sysctls = path.child("allowedUnsafeSysctls");
    for (i, sysctl) in kubelet.allowed_unsafe_sysctls.iter().enumerate() {
        if !is_allowed_unsafe_sysctl(sysctl) {
            errs.push(FieldError::not_supported(sysctls.index(i), sysctl, ALLOWED_UNSAFE_SYSCTLS));
        }
    }

    errs
}

fn is_allowed_unsafe_sysctl(sysctl: &str) -> bool {
    ALLOWED_UNSAFE_SYSCTLS.iter().any(|allowed| match allowed.strip_suffix('*') {
        Some(prefix) => sysctl.starts_with(prefix),
        None => sysctl == *allowed,
    })
}

fn validate_linux_os_config(
    os_config: &LinuxOsConfig,
    kubelet: Option<&KubeletConfig>,
    root: &FieldPath,
) -> ErrorList {
    let mut errs = ErrorList::new();
    let path = root.child("linuxOSConfig");

    if os_config.swap_file_size_mb.is_some()
        && kubelet.and_then(|k| k.fail_swap_on) != Some(false)
    {
        errs.push(FieldError::invalid(
            path.child("swapFileSizeMB"),
            &os_config.swap_file_size_mb,
            "kubeletConfig.failSwapOn must be set to false to enable a swap file on nodes",
        ));
    }

    if let Some(sysctls) = &os_config.sysctls {
        errs.append(validate_sysctls(sysctls, &path.child("sysctls")));
    }
    errs
}

fn validate_sysctls(sysctls: &SysctlConfig, path: &FieldPath) -> ErrorList {
    let ranges = [
        ("fsAioMaxNr", sysctls.fs_aio_max_nr, 65_536, 6_553_500),
        ("fsFileMax", sysctls.fs_file_max, 8_192, 12_000_500),
        ("fsInotifyMaxUserWatches", sysctls.fs_inotify_max_user_watches, 781_250, 2_097_152),
        ("fsNrOpen", sysctls.fs_nr_open, 8_192, 20_000_500),
        ("kernelThreadsMax", sysctls.kernel_threads_max, 20, 513_785),
        ("netCoreSomaxconn", sysctls.net_core_somaxconn, 4_096, 3_240_000),
        ("netIpv4TcpFinTimeout", sysctls.net_ipv4_tcp_fin_timeout, 5, 120),
        ("netIpv4TcpKeepaliveProbes", sysctls.net_ipv4_tcp_keepalive_probes, 1, 15),
        ("netIpv4TcpMaxSynBacklog", sysctls.net_ipv4_tcp_max_syn_backlog, 128, 3_240_000),
        ("vmMaxMapCount", sysctls.vm_max_map_count, 65_530, 262_144),
        ("vmSwappiness", sysctls.vm_swappiness, 0, 100),
        ("vmVfsCachePressure", sysctls.vm_vfs_cache_pressure, 1, 500),
    ];

    ranges
        .into_iter()
        .filter_map(|(field, value, min, max)| {
            let v = value.filter(|v| !(min..=max).contains(v))?;
            Some(FieldError::invalid(
                path.child(field),
                &v,
                format!("must be between {} and {}", min, max),
            ))
        })
        .collect()
}

/// Both specs with the current defaults applied, so a field whose default
/// rule postdates `old` compares equal.
fn update_baseline(
    old: &AzureManagedMachinePoolSpec,
    new: &AzureManagedMachinePoolSpec,
    name: &str,
) -> (AzureManagedMachinePoolSpec, AzureManagedMachinePoolSpec) {
    let mut old_spec = old.clone();
    default_machine_pool_spec(&mut old_spec, name);
    let mut new_spec = new.clone();
    default_machine_pool_spec(&mut new_spec, name);
    (old_spec, new_spec)
}

/// Transition rules between two pool specs. `name` is the object name, the
/// default for `spec.name`.
pub fn validate_pool_update(
    old: &AzureManagedMachinePoolSpec,
    new: &AzureManagedMachinePoolSpec,
    name: &str,
) -> ErrorList {
    let (old, new) = update_baseline(old, new, name);
    let (old, new) = (&old, &new);
    let mut errs = ErrorList::new();
    let spec = FieldPath::new("spec");

    immutable(&mut errs, spec.child("name"), &old.name, &new.name);
    immutable(&mut errs, spec.child("osDiskSizeGB"), &old.os_disk_size_gb, &new.os_disk_size_gb);
    immutable(&mut errs, spec.child("sku"), &old.sku, &new.sku);
    immutable(&mut errs, spec.child("maxPods"), &old.max_pods, &new.max_pods);
    immutable(&mut errs, spec.child("osDiskType"), &old.os_disk_type, &new.os_disk_type);
    immutable(&mut errs, spec.child("osType"), &old.os_type, &new.os_type);
    immutable(
        &mut errs,
        spec.child("nodePublicIPPrefixID"),
        &old.node_public_ip_prefix_id,
        &new.node_public_ip_prefix_id,
    );
    immutable(&mut errs, spec.child("kubeletConfig"), &old.kubelet_config, &new.kubelet_config);
    immutable(
        &mut errs,
        spec.child("kubeletDiskType"),
        &old.kubelet_disk_type,
        &new.kubelet_disk_type,
    );
    immutable(&mut errs, spec.child("linuxOSConfig"), &old.linux_os_config, &new.linux_os_config);
    immutable(&mut errs, spec.child("subnetName"), &old.subnet_name, &new.subnet_name);

    immutable_set(
        &mut errs,
        spec.child("availabilityZones"),
        &old.availability_zones,
        &new.availability_zones,
    );

    immutable(
        &mut errs,
        spec.child("scaleSetPriority"),
        &old.scale_set_priority,
        &new.scale_set_priority,
    );

    immutable_once_set(
        &mut errs,
        spec.child("enableUltraSSD"),
        &old.enable_ultra_ssd,
        &new.enable_ultra_ssd,
    );
    immutable_once_set(
        &mut errs,
        spec.child("enableNodePublicIP"),
        &old.enable_node_public_ip,
        &new.enable_node_public_ip,
    );
    immutable_once_set(&mut errs, spec.child("enableFIPS"), &old.enable_fips, &new.enable_fips);
    immutable_once_set(
        &mut errs,
        spec.child("enableEncryptionAtHost"),
        &old.enable_encryption_at_host,
        &new.enable_encryption_at_host,
    );

    let reserved = |labels: &BTreeMap<String, String>| -> BTreeSet<String> {
        labels.keys().filter(|k| k.starts_with(AKS_RESERVED_LABEL_PREFIX)).cloned().collect()
    };
    let labels = spec.child("nodeLabels");
    for key in reserved(&old.node_labels).union(&reserved(&new.node_labels)) {
        immutable(&mut errs, labels.key(key), &old.node_labels.get(key), &new.node_labels.get(key));
    }

    errs
}
