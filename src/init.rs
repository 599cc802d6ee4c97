use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Configuration of the diagnostics subscriber.
///
/// Diagnostics are the crate's own messages about itself (dropped records,
/// sink and notifier failures, sink selection). They are written to stderr
/// so they never interleave with the JSON records a stdout sink produces.
///
/// **Fields**
/// - `default_filter`: filter directive used when `RUST_LOG` is unset.
/// - `ansi`: colorize the output.
#[derive(Clone, Debug)]
pub struct DiagnosticsConfig {
    pub default_filter: String,
    pub ansi: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            ansi: false,
        }
    }
}

/// Install a global `tracing` subscriber for diagnostics.
///
/// **Returns**
/// - `Err(..)` if a global subscriber was already installed.
pub fn init_diagnostics_with_config(config: DiagnosticsConfig) -> Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(false);

    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
}

/// Install diagnostics with [`DiagnosticsConfig::default`].
pub fn init_diagnostics() -> Result<(), SetGlobalDefaultError> {
    init_diagnostics_with_config(DiagnosticsConfig::default())
}
