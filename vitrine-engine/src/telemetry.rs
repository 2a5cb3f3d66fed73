//! Tracing bootstrap.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` read from
//! `RUST_LOG` and either a human-readable or a JSON fmt layer. Safe to call
//! more than once; only the first call installs anything.

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vitrine_core::EngineConfig;

const DEFAULT_FILTER: &str = "vitrine_engine=info,vitrine_storage=info,warn";

static INSTALLED: OnceCell<bool> = OnceCell::new();

/// Install the global subscriber.
///
/// Returns `true` when this call (or an earlier one) installed the vitrine
/// subscriber, `false` when another global subscriber was already set.
pub fn init_tracing(json: bool) -> bool {
    *INSTALLED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()
        };

        match result {
            Ok(()) => {
                tracing::info!(json, "tracing initialized");
                true
            }
            Err(_) => false,
        }
    })
}

/// Install the subscriber `config` asks for. Returns `None` when the
/// configuration leaves logging to the host.
pub fn init_from_config(config: &EngineConfig) -> Option<bool> {
    config.log_json.then(|| init_tracing(true))
}

/// Outcome of the first install attempt, if one was made.
pub fn installed() -> Option<bool> {
    INSTALLED.get().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        let first = init_tracing(false);
        let second = init_tracing(true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_init_from_config_follows_log_json() {
        assert_eq!(init_from_config(&EngineConfig::default()), None);
        let installed = init_from_config(&EngineConfig::default().with_log_json(true));
        assert!(installed.is_some());
        assert_eq!(super::installed(), installed);
    }
}
