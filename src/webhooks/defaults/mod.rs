//! Defaulting engine.
//!
//! Every function here fills unset fields only and is safe to run more than
//! once on the same object: a second pass over an already-defaulted tree
//! changes nothing.

pub mod cluster;
pub mod control_plane;
pub mod machine;
pub mod machine_pool;
pub mod ssh;

/// Fill an empty string.
pub(crate) fn default_string(field: &mut String, value: impl FnOnce() -> String) {
    if field.is_empty() {
        *field = value();
    }
}

/// Fill an absent or empty optional string.
pub(crate) fn default_opt_string(field: &mut Option<String>, value: impl FnOnce() -> String) {
    if field.as_deref().unwrap_or_default().is_empty() {
        *field = Some(value());
    }
}
