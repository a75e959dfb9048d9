//! Runtime configuration for the admission core.
//!
//! Read once at process start from the environment:
//! - `FEATURE_GATES`: `Name=true,Other=false`
//! - `OWNER_LOOKUP_ATTEMPTS`: reads made before an owner lookup gives up (default 3)
//! - `OWNER_LOOKUP_DELAY_MS`: pause between those reads (default 1000)

use std::time::Duration;

use tracing::warn;

use crate::webhooks::feature_gates::StaticFeatureGates;
use crate::webhooks::store::RetryPolicy;

pub const FEATURE_GATES_ENV: &str = "FEATURE_GATES";
pub const OWNER_LOOKUP_ATTEMPTS_ENV: &str = "OWNER_LOOKUP_ATTEMPTS";
pub const OWNER_LOOKUP_DELAY_MS_ENV: &str = "OWNER_LOOKUP_DELAY_MS";

const DEFAULT_OWNER_LOOKUP_ATTEMPTS: u32 = 3;
const DEFAULT_OWNER_LOOKUP_DELAY_MS: u64 = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Raw feature-gate string
    pub feature_gates: String,
    pub owner_lookup_attempts: u32,
    pub owner_lookup_delay: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            feature_gates: String::new(),
            owner_lookup_attempts: DEFAULT_OWNER_LOOKUP_ATTEMPTS,
            owner_lookup_delay: Duration::from_millis(DEFAULT_OWNER_LOOKUP_DELAY_MS),
        }
    }
}

impl WebhookConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let feature_gates = lookup(FEATURE_GATES_ENV).unwrap_or_default();

        let owner_lookup_attempts = parse_or_default(
            OWNER_LOOKUP_ATTEMPTS_ENV,
            lookup(OWNER_LOOKUP_ATTEMPTS_ENV),
            DEFAULT_OWNER_LOOKUP_ATTEMPTS,
        )
        .max(1);

        let delay_ms = parse_or_default(
            OWNER_LOOKUP_DELAY_MS_ENV,
            lookup(OWNER_LOOKUP_DELAY_MS_ENV),
            DEFAULT_OWNER_LOOKUP_DELAY_MS,
        );

        Self {
            feature_gates,
            owner_lookup_attempts,
            owner_lookup_delay: Duration::from_millis(delay_ms),
        }
    }

    pub fn feature_gates(&self) -> StaticFeatureGates {
        StaticFeatureGates::parse(&self.feature_gates)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.owner_lookup_attempts,
            delay: self.owner_lookup_delay,
        }
    }
}

fn parse_or_default<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match raw {
        None => default,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!(
                key,
                value = %value,
                default = %default,
                "Invalid configuration value, using default"
            );
            default
        }),
    }
}
