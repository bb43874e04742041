use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

/// Runtime toggle for verbose telemetry export
///
/// Lives in the shared server state rather than in a global so handlers
/// receive it explicitly.
#[derive(Debug, Default)]
pub struct Telemetry {
    enabled: AtomicBool,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch telemetry on; logs once on the first transition
    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            tracing::info!("Telemetry enabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins when set; otherwise the level follows the verbose flag.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
