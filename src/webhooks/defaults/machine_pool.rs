//! AzureManagedMachinePool defaulting.

use kube::ResourceExt;

use super::default_opt_string;
use crate::crd::{
    AGENT_POOL_MODE_LABEL, AzureManagedMachinePool, AzureManagedMachinePoolSpec,
    AzureManagedMachinePoolTemplate, OS_TYPE_LINUX, SCALE_SET_PRIORITY_REGULAR,
};

pub const DEFAULT_OS_DISK_TYPE: &str = "Managed";

/// Pay up to the on-demand price.
pub const DEFAULT_SPOT_MAX_PRICE: &str = "-1";

/// Default an AzureManagedMachinePool in place and refresh its mode label.
pub fn default_managed_machine_pool(pool: &mut AzureManagedMachinePool) {
    let name = pool.name_any();
    default_machine_pool_spec(&mut pool.spec, &name);
    sync_mode_label(pool);
}

/// Mirror `spec.mode` into the agent pool mode label.
pub fn sync_mode_label(pool: &mut AzureManagedMachinePool) {
    let mode = pool.spec.mode.to_string();
    pool.labels_mut().insert(AGENT_POOL_MODE_LABEL.to_string(), mode);
}

pub fn default_managed_machine_pool_template(template: &mut AzureManagedMachinePoolTemplate) {
    let name = template.name_any();
    default_machine_pool_spec(&mut template.spec.template.spec, &name);
}

pub fn default_machine_pool_spec(spec: &mut AzureManagedMachinePoolSpec, name: &str) {
    default_opt_string(&mut spec.name, || name.to_string());
    default_opt_string(&mut spec.os_type, || OS_TYPE_LINUX.to_string());
    default_opt_string(&mut spec.scale_set_priority, || SCALE_SET_PRIORITY_REGULAR.to_string());
    default_opt_string(&mut spec.os_disk_type, || DEFAULT_OS_DISK_TYPE.to_string());

    if spec.is_spot() {
        default_opt_string(&mut spec.spot_max_price, || DEFAULT_SPOT_MAX_PRICE.to_string());
    }
}
