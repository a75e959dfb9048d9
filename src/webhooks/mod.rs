//! Admission core for the Azure infrastructure kinds.
//!
//! Requests flow through three stages:
//! - Defaulting: fill unset fields (`defaults`)
//! - Store-free policies: field rules, then transition rules on UPDATE (`policies`)
//! - Cross-resource checks: rules that read sibling objects (`system_pool`, cluster network)
//!
//! [`AdmissionRegistry`] ties the stages together per kind.

pub mod defaults;
pub mod error;
pub mod feature_gates;
pub mod field;
pub mod policies;
pub mod registry;
pub mod store;
pub mod system_pool;

pub use error::{AdmissionError, Result, StoreError};
pub use feature_gates::{FeatureGates, StaticFeatureGates};
pub use field::{ErrorList, ErrorType, FieldError, FieldPath};
pub use registry::{AdmissionObject, AdmissionRegistry};
pub use store::{KubeStore, ResourceStore, RetryPolicy};

// Re-export kube-rs admission types for callers wiring up a transport
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
