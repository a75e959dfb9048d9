//! capz-webhooks library crate
//!
//! Defaulting and validation for Azure Cluster API infrastructure resources:
//! CRD types, the admission registry, and its configuration, metrics and
//! tracing setup.

pub mod config;
pub mod crd;
pub mod metrics;
pub mod telemetry;
pub mod webhooks;

pub use config::WebhookConfig;
pub use metrics::Metrics;
pub use webhooks::{AdmissionError, AdmissionObject, AdmissionRegistry};
