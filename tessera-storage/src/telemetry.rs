//! Tracing subscriber setup for binaries and tests.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: false,
            default_filter: "tessera_storage=info,tessera::audit=info,warn".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read `TESSERA_LOG_JSON` and `TESSERA_LOG_FILTER`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            json: std::env::var("TESSERA_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.json),
            default_filter: std::env::var("TESSERA_LOG_FILTER")
                .unwrap_or(defaults.default_filter),
        }
    }
}

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.default_filter`. Fails if a global subscriber
/// is already set.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let json_layer = config.json.then(|| fmt::layer().json());
    let text_layer = (!config.json).then(fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    tracing::info!(json = config.json, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = TelemetryConfig::default();
        assert!(!cfg.json);
        assert!(cfg.default_filter.contains("tessera::audit"));
    }

    #[test]
    fn test_second_init_fails() {
        let cfg = TelemetryConfig::default();
        let _ = init_tracing(&cfg);
        assert!(init_tracing(&cfg).is_err());
    }
}
