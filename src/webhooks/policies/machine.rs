//! AzureMachine validation policy.

use std::collections::HashSet;

use super::Validate;
use super::common::{is_uuid, is_valid_max_price, validate_resource_id, validate_ssh_key};
use super::immutability::{immutable, immutable_once_set};
use crate::crd::{
    AzureMachine, AzureMachineSpec, AzureMachineTemplate, BootDiagnosticsStorage, CACHING_NONE,
    CACHING_READ_ONLY, CACHING_READ_WRITE, DataDisk, Image, OsDisk, ULTRA_SSD_STORAGE, VmIdentity,
};
use crate::webhooks::defaults::machine::default_template_spec;
use crate::webhooks::field::{ErrorList, FieldError, FieldPath};

pub const MIN_OS_DISK_SIZE_GB: i32 = 1;
pub const MAX_OS_DISK_SIZE_GB: i32 = 2048;
pub const MIN_DATA_DISK_SIZE_GB: i32 = 4;
pub const MAX_DATA_DISK_SIZE_GB: i32 = 32767;
/// Highest LUN Azure accepts on a data disk.
pub const MAX_LUN: i32 = 63;

const CACHING_TYPES: &[&str] = &[CACHING_NONE, CACHING_READ_ONLY, CACHING_READ_WRITE];
const CONFIDENTIAL_VM: &str = "ConfidentialVM";
const VM_GUEST_STATE_ENCRYPTION: &str = "DiskWithVMGuestState";

impl Validate for AzureMachine {
    fn validate_fields(&self) -> ErrorList {
        validate_machine_spec(&self.spec, &FieldPath::new("spec"))
    }

    fn validate_transition(&self, old: &Self) -> ErrorList {
        validate_machine_update(&old.spec, &self.spec)
    }
}

impl Validate for AzureMachineTemplate {
    fn validate_fields(&self) -> ErrorList {
        validate_machine_spec(
            &self.spec.template.spec,
            &FieldPath::from_parts("spec", &["template", "spec"]),
        )
    }

    fn validate_transition(&self, old: &Self) -> ErrorList {
        let path = FieldPath::from_parts("spec", &["template", "spec"]);
        let new_spec = &self.spec.template.spec;
        let baseline = update_baseline(&old.spec.template.spec, new_spec);
        let (old_baseline, new_baseline) = match baseline {
            Ok(baseline) => baseline,
            Err(err) => return FieldError::internal(path, err).into(),
        };

        let mut errs = ErrorList::new();
        if old_baseline != new_baseline {
            errs.push(FieldError::invalid(
                path,
                new_spec,
                "AzureMachineTemplate spec.template.spec field is immutable. Please create new resource instead.",
            ));
        }
        errs
    }
}

pub fn validate_machine_spec(spec: &AzureMachineSpec, root: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    errs.append(validate_image(spec.image.as_ref(), &root.child("image")));
    errs.append(validate_ssh_key(&spec.ssh_public_key, root.child("sshPublicKey")));
    errs.append(validate_os_disk(&spec.os_disk, &root.child("osDisk")));
    errs.append(validate_data_disks(&spec.data_disks, &root.child("dataDisks")));
    errs.append(validate_identity(spec, root));
    errs.append(validate_network_interfaces(spec, root));
    errs.append(validate_diagnostics(spec, &root.child("diagnostics")));

    if let Some(price) = spec.spot_vm_options.as_ref().and_then(|s| s.max_price.as_deref()) {
        if !is_valid_max_price(price) {
            errs.push(FieldError::invalid(
                root.child("spotVMOptions").child("maxPrice"),
                price,
                "maxPrice must be -1 or a positive decimal",
            ));
        }
    }

    if let Some(id) = spec.capacity_reservation_group_id.as_deref() {
        errs.extend(validate_resource_id(id, root.child("capacityReservationGroupID")));
    }

    errs.append(validate_security_profile(spec, &root.child("securityProfile")));
    errs.append(validate_vm_extensions(spec, &root.child("vmExtensions")));
    errs
}

fn validate_image(image: Option<&Image>, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let Some(image) = image.filter(|i| i.source_count() > 0) else {
        errs.push(FieldError::required(path.clone(), "an image source must be specified"));
        return errs;
    };
    if image.source_count() > 1 {
        errs.push(FieldError::forbidden(path.clone(), "more than one image source specified"));
        return errs;
    }

    let mut require = |field: FieldPath, value: &str| {
        if value.is_empty() {
            errs.push(FieldError::required(field, ""));
        }
    };

    if let Some(id) = image.id.as_deref() {
        require(path.child("id"), id);
    }
    if let Some(m) = &image.marketplace {
        let p = path.child("marketplace");
        require(p.child("publisher"), &m.publisher);
        require(p.child("offer"), &m.offer);
        require(p.child("sku"), &m.sku);
        require(p.child("version"), &m.version);
    }
    if let Some(g) = &image.shared_gallery {
        let p = path.child("sharedGallery");
        require(p.child("subscriptionID"), &g.subscription_id);
        require(p.child("resourceGroup"), &g.resource_group);
        require(p.child("gallery"), &g.gallery);
        require(p.child("name"), &g.name);
        require(p.child("version"), &g.version);
    }
    if let Some(g) = &image.compute_gallery {
        let p = path.child("computeGallery");
        require(p.child("gallery"), &g.gallery);
        require(p.child("name"), &g.name);
        require(p.child("version"), &g.version);
        if g.subscription_id.is_some() != g.resource_group.is_some() {
            errs.push(FieldError::invalid(
                p,
                g,
                "subscriptionID and resourceGroup must be set together",
            ));
        }
    }

    errs
}

fn validate_os_disk(disk: &OsDisk, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    if disk.os_type.is_empty() {
        errs.push(FieldError::required(path.child("osType"), "the OS type cannot be empty"));
    }
    if let Some(size) = disk.disk_size_gb {
        if !(MIN_OS_DISK_SIZE_GB..=MAX_OS_DISK_SIZE_GB).contains(&size) {
            errs.push(FieldError::invalid(
                path.child("diskSizeGB"),
                &size,
                format!(
                    "the OS disk size should be between {} and {} GB",
                    MIN_OS_DISK_SIZE_GB, MAX_OS_DISK_SIZE_GB
                ),
            ));
        }
    }
    if let Some(caching) = disk.caching_type.as_deref() {
        if !CACHING_TYPES.contains(&caching) {
            errs.push(FieldError::not_supported(path.child("cachingType"), caching, CACHING_TYPES));
        }
    }

    if disk.is_ephemeral() {
        if disk.caching_type.as_deref() == Some(CACHING_READ_WRITE) {
            errs.push(FieldError::invalid(
                path.child("cachingType"),
                CACHING_READ_WRITE,
                "cachingType cannot be set to ReadWrite when diffDiskSettings.option is Local",
            ));
        }
        if disk.managed_disk.as_ref().is_some_and(|m| m.disk_encryption_set.is_some()) {
            errs.push(FieldError::invalid(
                path.child("managedDisk").child("diskEncryptionSet"),
                &disk.managed_disk,
                "diskEncryptionSet is not supported when diffDiskSettings.option is Local",
            ));
        }
    }

    if let Some(managed) = &disk.managed_disk {
        if managed.storage_account_type == ULTRA_SSD_STORAGE {
            errs.push(FieldError::invalid(
                path.child("managedDisk").child("storageAccountType"),
                &managed.storage_account_type,
                format!("{} is not supported for the OS disk", ULTRA_SSD_STORAGE),
            ));
        }
    }

    errs
}

fn validate_data_disks(disks: &[DataDisk], path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let mut suffixes = HashSet::new();
    let mut luns = HashSet::new();

    for (i, disk) in disks.iter().enumerate() {
        let disk_path = path.index(i);

        if disk.name_suffix.is_empty() {
            errs.push(FieldError::required(
                disk_path.child("nameSuffix"),
                "the nameSuffix field is required",
            ));
        } else if !suffixes.insert(disk.name_suffix.as_str()) {
            errs.push(FieldError::duplicate(disk_path.child("nameSuffix"), &disk.name_suffix));
        }

        if !(MIN_DATA_DISK_SIZE_GB..=MAX_DATA_DISK_SIZE_GB).contains(&disk.disk_size_gb) {
            errs.push(FieldError::invalid(
                disk_path.child("diskSizeGB"),
                &disk.disk_size_gb,
                format!(
                    "the disk size should be a value between {} and {}",
                    MIN_DATA_DISK_SIZE_GB, MAX_DATA_DISK_SIZE_GB
                ),
            ));
        }

        match disk.lun {
            None => {
                errs.push(FieldError::required(disk_path.child("lun"), "LUN should not be nil"))
            }
            Some(lun) if !(0..=MAX_LUN).contains(&lun) => errs.push(FieldError::invalid(
                disk_path.child("lun"),
                &lun,
                format!("logical unit number must be between 0 and {}", MAX_LUN),
            )),
            Some(lun) => {
                if !luns.insert(lun) {
                    errs.push(FieldError::duplicate(disk_path.child("lun"), &lun));
                }
            }
        }

        if let Some(caching) = disk.caching_type.as_deref() {
            let caching_path = disk_path.child("cachingType");
            if !CACHING_TYPES.contains(&caching) {
                errs.push(FieldError::not_supported(caching_path, caching, CACHING_TYPES));
            } else if disk.is_ultra() && caching != CACHING_NONE {
                errs.push(FieldError::invalid(
                    caching_path,
                    caching,
                    format!(
                        "data disk {}: cachingType must be None for {} storage",
                        disk.name_suffix, ULTRA_SSD_STORAGE
                    ),
                ));
            }
        }
    }

    errs
}

fn validate_identity(spec: &AzureMachineSpec, root: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();

    if spec.identity == VmIdentity::UserAssigned {
        let path = root.child("userAssignedIdentities");
        if spec.user_assigned_identities.is_empty() {
            errs.push(FieldError::required(
                path.clone(),
                "must be specified for the 'UserAssigned' identity type",
            ));
        }
        for (i, identity) in spec.user_assigned_identities.iter().enumerate() {
            errs.extend(validate_resource_id(
                &identity.provider_id,
                path.index(i).child("providerID"),
            ));
        }
    }

    let role_path = root.child("systemAssignedIdentityRole");
    if let Some(role) = &spec.system_assigned_identity_role {
        if spec.identity != VmIdentity::SystemAssigned {
            errs.push(FieldError::forbidden(
                role_path.clone(),
                format!(
                    "systemAssignedIdentityRole can only be set when identity is {}",
                    VmIdentity::SystemAssigned
                ),
            ));
        }
        if !role.name.is_empty() && !is_uuid(&role.name) {
            errs.push(FieldError::invalid(
                role_path.child("name"),
                &role.name,
                "role assignment name must be a valid GUID",
            ));
        }
    }

    if let Some(legacy) = spec.role_assignment_name.as_deref().filter(|n| !n.is_empty()) {
        let path = root.child("roleAssignmentName");
        if spec.system_assigned_identity_role.as_ref().is_some_and(|r| !r.name.is_empty()) {
            errs.push(FieldError::forbidden(
                path,
                "cannot set both roleAssignmentName and systemAssignedIdentityRole.name",
            ));
        } else if !is_uuid(legacy) {
            errs.push(FieldError::invalid(
                path,
                legacy,
                "role assignment name must be a valid GUID",
            ));
        }
    }

    errs
}

fn validate_network_interfaces(spec: &AzureMachineSpec, root: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let path = root.child("networkInterfaces");

    if !spec.network_interfaces.is_empty() {
        let legacy_subnet = spec.subnet_name.as_deref().is_some_and(|s| !s.is_empty());
        if legacy_subnet || spec.accelerated_networking.is_some() {
            errs.push(FieldError::invalid(
                path.clone(),
                &spec.network_interfaces,
                "cannot set both networkInterfaces and machine subnetName/acceleratedNetworking",
            ));
        }
    }

    for (i, nic) in spec.network_interfaces.iter().enumerate() {
        if nic.private_ip_configs < 1 {
            errs.push(FieldError::invalid(
                path.index(i).child("privateIPConfigs"),
                &nic.private_ip_configs,
                "number of privateIPConfigs per interface must be greater than 0",
            ));
        }
    }

    let explicit: HashSet<bool> = spec
        .network_interfaces
        .iter()
        .filter_map(|n| n.accelerated_networking)
        .collect();
    if explicit.len() > 1 {
        errs.push(FieldError::invalid(
            path,
            &spec.network_interfaces,
            "network interfaces must agree on acceleratedNetworking",
        ));
    }

    errs
}

fn validate_diagnostics(spec: &AzureMachineSpec, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let Some(boot) = spec.diagnostics.as_ref().and_then(|d| d.boot.as_ref()) else {
        return errs;
    };
    let path = path.child("boot");
    let uri = boot.user_managed.as_ref().map(|u| u.storage_account_uri.as_str());

    match boot.storage_account_type {
        BootDiagnosticsStorage::UserManaged => {
            if uri.is_none_or(str::is_empty) {
                errs.push(FieldError::required(
                    path.child("userManaged").child("storageAccountURI"),
                    "storageAccountURI cannot be empty when storageAccountType is UserManaged",
                ));
            }
        }
        other => {
            if boot.user_managed.is_some() {
                errs.push(FieldError::forbidden(
                    path.child("userManaged"),
                    format!("userManaged must not be set when storageAccountType is {:?}", other),
                ));
            }
        }
    }

    errs
}

fn validate_security_profile(spec: &AzureMachineSpec, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let Some(profile) = &spec.security_profile else {
        return errs;
    };

    if profile.security_type.as_deref() == Some(CONFIDENTIAL_VM) {
        let vtpm = profile.uefi_settings.as_ref().and_then(|u| u.v_tpm_enabled);
        if vtpm != Some(true) {
            errs.push(FieldError::invalid(
                path.child("uefiSettings").child("vTpmEnabled"),
                &vtpm,
                "vTpmEnabled must be true when securityType is ConfidentialVM",
            ));
        }
    }

    let guest_state = spec
        .os_disk
        .managed_disk
        .as_ref()
        .and_then(|m| m.security_profile.as_ref())
        .and_then(|s| s.security_encryption_type.as_deref())
        == Some(VM_GUEST_STATE_ENCRYPTION);
    if profile.encryption_at_host == Some(true) && guest_state {
        errs.push(FieldError::invalid(
            path.child("encryptionAtHost"),
            &true,
            format!(
                "encryptionAtHost cannot be enabled when the OS disk securityEncryptionType is {}",
                VM_GUEST_STATE_ENCRYPTION
            ),
        ));
    }

    errs
}

fn validate_vm_extensions(spec: &AzureMachineSpec, path: &FieldPath) -> ErrorList {
    let mut errs = ErrorList::new();
    let mut names = HashSet::new();

    for (i, ext) in spec.vm_extensions.iter().enumerate() {
        let ext_path = path.index(i);
        let required = [
            ("name", &ext.name),
            ("publisher", &ext.publisher),
            ("version", &ext.version),
        ];
        for (field, value) in required {
            if value.is_empty() {
                errs.push(FieldError::required(ext_path.child(field), ""));
            }
        }
        if !ext.name.is_empty() && !names.insert(ext.name.as_str()) {
            errs.push(FieldError::duplicate(ext_path.child("name"), &ext.name));
        }
    }

    errs
}

/// Re-apply the current defaults to `old`, borrowing key material from `new`
/// so a spec created before a default rule existed compares cleanly.
fn redefault(
    old: &AzureMachineSpec,
    new: &AzureMachineSpec,
) -> crate::webhooks::error::Result<AzureMachineSpec> {
    let mut spec = old.clone();
    if spec.ssh_public_key.is_empty() {
        spec.ssh_public_key = new.ssh_public_key.clone();
    }
    default_template_spec(&mut spec)?;

    // role names are random, so an unset field can only be filled from new
    if let (Some(new_role), VmIdentity::SystemAssigned) =
        (&new.system_assigned_identity_role, spec.identity)
    {
        let legacy = spec.role_assignment_name.take().filter(|n| !n.is_empty());
        let role = spec.system_assigned_identity_role.get_or_insert_with(Default::default);
        if role.name.is_empty() {
            role.name = legacy.unwrap_or_else(|| new_role.name.clone());
        }
        if role.scope.is_empty() {
            role.scope = new_role.scope.clone();
        }
        if role.definition_id.is_empty() {
            role.definition_id = new_role.definition_id.clone();
        }
    }

    Ok(spec)
}

/// Both specs with the current defaults applied. Generated values missing
/// from `old` are taken from the defaulted `new`.
fn update_baseline(
    old: &AzureMachineSpec,
    new: &AzureMachineSpec,
) -> crate::webhooks::error::Result<(AzureMachineSpec, AzureMachineSpec)> {
    let mut new_spec = new.clone();
    default_template_spec(&mut new_spec)?;
    let old_spec = redefault(old, &new_spec)?;
    Ok((old_spec, new_spec))
}

/// Transition rules between two AzureMachine specs.
pub fn validate_machine_update(old: &AzureMachineSpec, new: &AzureMachineSpec) -> ErrorList {
    let mut errs = ErrorList::new();
    let spec = FieldPath::new("spec");

    immutable_once_set(&mut errs, spec.child("providerID"), &old.provider_id, &new.provider_id);

    let (o, n) = match update_baseline(old, new) {
        Ok(baseline) => baseline,
        Err(err) => {
            errs.push(FieldError::internal(spec, err));
            return errs;
        }
    };
    let (o, n) = (&o, &n);

    immutable(&mut errs, spec.child("vmSize"), &o.vm_size, &n.vm_size);
    immutable(&mut errs, spec.child("image"), &o.image, &n.image);
    immutable(&mut errs, spec.child("osDisk"), &o.os_disk, &n.os_disk);
    immutable(&mut errs, spec.child("dataDisks"), &o.data_disks, &n.data_disks);
    immutable(&mut errs, spec.child("sshPublicKey"), &o.ssh_public_key, &n.ssh_public_key);

    immutable(&mut errs, spec.child("identity"), &o.identity, &n.identity);
    immutable(
        &mut errs,
        spec.child("userAssignedIdentities"),
        &o.user_assigned_identities,
        &n.user_assigned_identities,
    );
    immutable(
        &mut errs,
        spec.child("systemAssignedIdentityRole"),
        &o.system_assigned_identity_role,
        &n.system_assigned_identity_role,
    );
    immutable(
        &mut errs,
        spec.child("roleAssignmentName"),
        &o.role_assignment_name,
        &n.role_assignment_name,
    );

    immutable(
        &mut errs,
        spec.child("allocatePublicIP"),
        &o.allocate_public_ip,
        &n.allocate_public_ip,
    );
    immutable(
        &mut errs,
        spec.child("enableIPForwarding"),
        &o.enable_ip_forwarding,
        &n.enable_ip_forwarding,
    );
    immutable(
        &mut errs,
        spec.child("acceleratedNetworking"),
        &o.accelerated_networking,
        &n.accelerated_networking,
    );
    immutable(&mut errs, spec.child("subnetName"), &o.subnet_name, &n.subnet_name);
    immutable(
        &mut errs,
        spec.child("networkInterfaces"),
        &o.network_interfaces,
        &n.network_interfaces,
    );
    immutable(&mut errs, spec.child("dnsServers"), &o.dns_servers, &n.dns_servers);

    immutable(&mut errs, spec.child("spotVMOptions"), &o.spot_vm_options, &n.spot_vm_options);
    immutable(&mut errs, spec.child("securityProfile"), &o.security_profile, &n.security_profile);
    immutable(
        &mut errs,
        spec.child("capacityReservationGroupID"),
        &o.capacity_reservation_group_id,
        &n.capacity_reservation_group_id,
    );

    if old.diagnostics.is_some() {
        immutable(&mut errs, spec.child("diagnostics"), &o.diagnostics, &n.diagnostics);
    }

    errs
}
