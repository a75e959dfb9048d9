//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::TryInitError;

/// Errors from installing the global subscriber
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log directive: {0}")]
    Directive(#[from] ParseError),

    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Install a JSON subscriber filtered by `RUST_LOG` plus `default_directive`.
///
/// Returns an error rather than panicking when a subscriber already exists.
pub fn init_tracing(default_directive: &str) -> Result<(), TelemetryError> {
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::from_default_env()
        .add_directive(default_directive.parse()?)
        .add_directive("kube=info".parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .finish()
        .try_init()?;
    Ok(())
}
