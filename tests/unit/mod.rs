// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for capz-webhooks.
//!
//! These tests run without a Kubernetes cluster and exercise the defaulting
//! and store-free validation of each kind through the public API.

mod crd_tests {
    use capz_webhooks::crd::capi::{CapiClusterSpec, cluster_resource};
    use capz_webhooks::crd::{
        DataDisk, DiffDiskSettings, EPHEMERAL_DIFF_DISK, Image, ManagedDiskParameters, NodePoolMode,
        OsDisk, ULTRA_SSD_STORAGE, VmIdentity,
    };
    use kube::core::DynamicObject;

    #[test]
    fn test_enum_display() {
        assert_eq!(NodePoolMode::System.to_string(), "System");
        assert_eq!(NodePoolMode::User.to_string(), "User");
        assert_eq!(VmIdentity::SystemAssigned.to_string(), "SystemAssigned");
    }

    #[test]
    fn test_enum_defaults() {
        assert_eq!(NodePoolMode::default(), NodePoolMode::User);
        assert_eq!(VmIdentity::default(), VmIdentity::None);
    }

    #[test]
    fn test_image_source_count() {
        assert_eq!(Image::default().source_count(), 0);
        let image = Image {
            id: Some(
                "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/images/img"
                    .to_string(),
            ),
            marketplace: Some(Default::default()),
            ..Default::default()
        };
        assert_eq!(image.source_count(), 2);
    }

    #[test]
    fn test_disk_helpers() {
        let ultra = DataDisk {
            managed_disk: Some(ManagedDiskParameters {
                storage_account_type: ULTRA_SSD_STORAGE.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(ultra.is_ultra());
        assert!(!DataDisk::default().is_ultra());

        let ephemeral = OsDisk {
            diff_disk_settings: Some(DiffDiskSettings {
                option: EPHEMERAL_DIFF_DISK.to_string(),
            }),
            ..Default::default()
        };
        assert!(ephemeral.is_ephemeral());
        assert!(!OsDisk::default().is_ephemeral());
    }

    #[test]
    fn test_cluster_without_spec_decodes_empty() {
        let obj = DynamicObject::new("c1", &cluster_resource()).within("default");
        assert_eq!(CapiClusterSpec::from_dynamic(&obj).unwrap(), CapiClusterSpec::default());
    }
}

mod config_tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use capz_webhooks::WebhookConfig;
    use capz_webhooks::webhooks::FeatureGates;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = WebhookConfig::from_lookup(lookup(&[]));
        assert_eq!(config, WebhookConfig::default());
        assert!(config.feature_gates().enabled("MachinePool"));
        assert_eq!(config.retry_policy().attempts, 3);
    }

    #[test]
    fn test_values_from_lookup() {
        let config = WebhookConfig::from_lookup(lookup(&[
            ("FEATURE_GATES", "MachinePool=false"),
            ("OWNER_LOOKUP_ATTEMPTS", "5"),
            ("OWNER_LOOKUP_DELAY_MS", "250"),
        ]));
        assert!(!config.feature_gates().enabled("MachinePool"));
        assert_eq!(config.retry_policy().attempts, 5);
        assert_eq!(config.retry_policy().delay, Duration::from_millis(250));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = WebhookConfig::from_lookup(lookup(&[
            ("OWNER_LOOKUP_ATTEMPTS", "many"),
            ("OWNER_LOOKUP_DELAY_MS", "-1"),
        ]));
        assert_eq!(config.owner_lookup_attempts, 3);
        assert_eq!(config.owner_lookup_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_attempts_still_reads_once() {
        let config = WebhookConfig::from_lookup(lookup(&[("OWNER_LOOKUP_ATTEMPTS", "0")]));
        assert_eq!(config.owner_lookup_attempts, 1);
    }
}

mod error_tests {
    use capz_webhooks::AdmissionError;
    use capz_webhooks::webhooks::{ErrorList, FieldError, FieldPath, StoreError};

    #[test]
    fn test_reasons() {
        let invalid = AdmissionError::Invalid {
            kind: "AzureMachine".to_string(),
            name: "m1".to_string(),
            errors: FieldError::required(FieldPath::new("spec"), "").into(),
        };
        assert_eq!(invalid.reason(), "Invalid");
        assert!(invalid.field_errors().is_some());

        let lookup = AdmissionError::OwnerLookup {
            kind: "AzureMachine".to_string(),
            name: "m1".to_string(),
            attempts: 3,
            source: StoreError::Unavailable("timeout".to_string()),
        };
        assert_eq!(lookup.reason(), "InternalError");
        assert!(lookup.field_errors().is_none());
        assert_eq!(
            lookup.to_string(),
            "failed to get owner cluster of AzureMachine m1 after 3 attempts: store unavailable: timeout"
        );
    }

    #[test]
    fn test_error_list_rendering() {
        let path = FieldPath::from_parts("spec", &["dataDisks"]);
        let mut errs = ErrorList::new();
        errs.push(FieldError::required(path.index(0).child("lun"), "LUN should not be nil"));
        assert_eq!(
            errs.to_string(),
            "spec.dataDisks[0].lun: Required value: LUN should not be nil"
        );

        errs.push(FieldError::forbidden(path.index(1), "too many disks"));
        let rendered = errs.to_string();
        assert!(rendered.starts_with('['));
        assert!(rendered.contains("spec.dataDisks[1]: Forbidden: too many disks"));
        assert!(errs.has_field("spec.dataDisks[1]"));
        assert!(!errs.has_field("spec.dataDisks[2]"));
    }
}

mod cluster_tests {
    use capz_webhooks::crd::{AzureCluster, AzureClusterTemplate};
    use capz_webhooks::webhooks::defaults::cluster::{
        DEFAULT_VNET_CIDR, default_azure_cluster, default_azure_cluster_template,
    };
    use capz_webhooks::webhooks::policies::validate_all;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn create_cluster() -> AzureCluster {
        AzureCluster {
            metadata: ObjectMeta {
                name: Some("c1".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
        }
    }

    #[test]
    fn test_defaulted_cluster_is_valid() {
        let mut cluster = create_cluster();
        cluster.spec.location = "westus2".to_string();
        default_azure_cluster(&mut cluster);

        assert_eq!(cluster.spec.resource_group.as_deref(), Some("c1"));
        assert_eq!(cluster.spec.network_spec.vnet.cidr_blocks, vec![DEFAULT_VNET_CIDR.to_string()]);
        assert!(validate_all(&cluster, None).is_empty());
    }

    #[test]
    fn test_location_is_immutable() {
        let mut old = create_cluster();
        old.spec.location = "westus2".to_string();
        default_azure_cluster(&mut old);

        let mut new = old.clone();
        new.spec.location = "eastus".to_string();
        let errs = validate_all(&new, Some(&old));
        assert!(errs.has_field("spec.location"));
    }

    #[test]
    fn test_template_stored_before_defaults_can_be_updated() {
        let old = AzureClusterTemplate {
            metadata: ObjectMeta {
                name: Some("tmpl".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
        };
        let mut new = old.clone();
        default_azure_cluster_template(&mut new);
        assert!(validate_all(&new, Some(&old)).is_empty());

        new.spec.template.spec.location = "eastus".to_string();
        let errs = validate_all(&new, Some(&old));
        assert!(errs.has_field("spec.template.spec"));
    }
}

mod control_plane_tests {
    use capz_webhooks::crd::AzureManagedControlPlane;
    use capz_webhooks::webhooks::defaults::control_plane::default_managed_control_plane;
    use capz_webhooks::webhooks::policies::validate_all;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn create_control_plane(name: &str) -> AzureManagedControlPlane {
        let mut cp = AzureManagedControlPlane {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
        };
        cp.spec.version = "1.29.2".to_string();
        cp.spec.resource_group_name = "rg".to_string();
        cp.spec.location = "eastus".to_string();
        default_managed_control_plane(&mut cp);
        cp
    }

    #[test]
    fn test_defaulted_control_plane_is_valid() {
        let cp = create_control_plane("aks1");
        assert_eq!(cp.spec.version, "v1.29.2");
        assert_eq!(cp.spec.dns_prefix.as_deref(), Some("aks1"));
        assert_eq!(cp.spec.node_resource_group_name.as_deref(), Some("MC_rg_aks1_eastus"));
        assert!(validate_all(&cp, None).is_empty());
    }

    #[test]
    fn test_reserved_words_in_name() {
        let cp = create_control_plane("my-windows-cluster");
        let errs = validate_all(&cp, None);
        assert!(errs.has_field("metadata.name"));
    }

    #[test]
    fn test_version_cannot_go_backwards() {
        let old = create_control_plane("aks1");
        let mut new = old.clone();
        new.spec.version = "v1.28.5".to_string();

        let errs = validate_all(&new, Some(&old));
        assert!(errs.has_field("spec.version"));
        assert!(errs.to_string().contains("field version cannot be downgraded"));

        new.spec.version = "v1.30.0".to_string();
        assert!(validate_all(&new, Some(&old)).is_empty());
    }
}

mod machine_pool_tests {
    use capz_webhooks::crd::{
        AzureManagedMachinePool, AzureManagedMachinePoolTemplate, NodePoolMode, OS_TYPE_WINDOWS,
    };
    use capz_webhooks::webhooks::defaults::machine_pool::{
        default_managed_machine_pool, default_managed_machine_pool_template,
    };
    use capz_webhooks::webhooks::policies::validate_all;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn create_pool(name: &str) -> AzureManagedMachinePool {
        AzureManagedMachinePool {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
        }
    }

    #[test]
    fn test_windows_pool_name_limit() {
        let mut pool = create_pool("winpool");
        pool.spec.os_type = Some(OS_TYPE_WINDOWS.to_string());
        default_managed_machine_pool(&mut pool);
        assert!(validate_all(&pool, None).has_field("spec.name"));

        let mut pool = create_pool("win1");
        pool.spec.os_type = Some(OS_TYPE_WINDOWS.to_string());
        default_managed_machine_pool(&mut pool);
        assert!(validate_all(&pool, None).is_empty());
    }

    #[test]
    fn test_windows_system_pool_forbidden() {
        let mut pool = create_pool("win1");
        pool.spec.os_type = Some(OS_TYPE_WINDOWS.to_string());
        pool.spec.mode = NodePoolMode::System;
        default_managed_machine_pool(&mut pool);
        assert!(validate_all(&pool, None).has_field("spec.mode"));
    }

    #[test]
    fn test_template_update_after_redefault() {
        let old = AzureManagedMachinePoolTemplate {
            metadata: ObjectMeta {
                name: Some("pooltmpl".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
        };
        let mut new = old.clone();
        default_managed_machine_pool_template(&mut new);
        assert!(validate_all(&new, Some(&old)).is_empty());

        new.spec.template.spec.max_pods = Some(50);
        assert!(validate_all(&new, Some(&old)).has_field("spec.template.spec"));
    }
}
