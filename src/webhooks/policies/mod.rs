//! Validation policies for the Azure infrastructure kinds.
//!
//! Policies are organized into tiers:
//! - Tier 1 (Fields): always enforced, over one object
//! - Tier 2 (Transitions): only enforced on UPDATE, old against new
//!
//! Rules that read sibling objects through the store are run by the registry
//! on top of these.

pub mod cluster;
pub mod common;
pub mod control_plane;
pub mod immutability;
pub mod machine;
pub mod machine_pool;

use crate::webhooks::field::ErrorList;

/// Store-free admission rules of one kind.
pub trait Validate {
    /// Field and structural rules over a single object.
    fn validate_fields(&self) -> ErrorList;

    /// Transition rules from `old` to `self`.
    fn validate_transition(&self, old: &Self) -> ErrorList;
}

/// Run all store-free policies. `old` is set on UPDATE.
pub fn validate_all<K: Validate>(new: &K, old: Option<&K>) -> ErrorList {
    // Tier 1: Field validations (always enforced)
    let mut errs = new.validate_fields();

    // Tier 2: Transition validations (only for UPDATE operations)
    if let Some(old) = old {
        errs.append(new.validate_transition(old));
    }

    errs
}
