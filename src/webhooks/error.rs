//! Error types for admission decisions.
//!
//! Field and immutability problems are aggregated into a single
//! `AdmissionError::Invalid`. Everything else is a precondition failure that
//! short-circuits the remaining checks.

use thiserror::Error;

use super::field::ErrorList;

/// Error raised by a resource store read.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The stored object could not be decoded into the expected type
    #[error("failed to decode {kind} {name}: {source}")]
    Decode {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Kube(kube::Error::Api(e)) if e.code == 404)
    }
}

/// Error type for admission decisions
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// One or more field or immutability errors
    #[error("{kind} {name:?} is invalid: {errors}")]
    Invalid {
        kind: String,
        name: String,
        errors: ErrorList,
    },

    /// Creation of a feature-gated kind while its gate is off
    #[error("can be set only if the {feature} feature flag is enabled; {kind} creation is not allowed")]
    FeatureGateDisabled { kind: String, feature: String },

    /// The owner could not be read within the retry budget
    #[error("failed to get owner cluster of {kind} {name} after {attempts} attempts: {source}")]
    OwnerLookup {
        kind: String,
        name: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// Malformed admission request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// SSH key generation failed
    #[error("failed to generate SSH key: {0}")]
    KeyGeneration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource store error outside the owner lookup
    #[error("resource store error: {0}")]
    Store(#[from] StoreError),
}

impl AdmissionError {
    /// Kubernetes status reason for this error
    pub fn reason(&self) -> &'static str {
        match self {
            AdmissionError::Invalid { .. } => "Invalid",
            AdmissionError::FeatureGateDisabled { .. } => "Forbidden",
            AdmissionError::OwnerLookup { .. }
            | AdmissionError::KeyGeneration(_)
            | AdmissionError::Store(_) => "InternalError",
            AdmissionError::BadRequest(_) | AdmissionError::Serialization(_) => "BadRequest",
        }
    }

    /// Field errors carried by an `Invalid` rejection
    pub fn field_errors(&self) -> Option<&ErrorList> {
        match self {
            AdmissionError::Invalid { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

/// Result type alias for admission operations
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Turn an error list into `Ok(())` when empty, or an `Invalid` rejection.
pub fn into_result(kind: &str, name: &str, errors: ErrorList) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AdmissionError::Invalid {
            kind: kind.to_string(),
            name: name.to_string(),
            errors,
        })
    }
}
