//! # Logging
//!
//! Environment-aware console logging using the tracing ecosystem. Logs go to
//! stdout; containers and supervisors collect them from there.
//!
//! - `RUST_LOG` wins when set; otherwise the level follows the environment
//!   (`debug` for development and test, `info` for production)
//! - `FORM_LOG_FORMAT=json` switches to one JSON object per line
//! - ANSI colors only when stdout is a terminal

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ConfigManager;

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("FORM_LOG_FORMAT").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber once; later calls are no-ops.
///
/// An already-installed global subscriber (for example from a test harness)
/// is left in place.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let filter = build_filter(&environment);
        let format = LogFormat::from_env();
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let installed = match format {
            LogFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(false)
                    .with_filter(filter);
                tracing_subscriber::registry().with(layer).try_init()
            }
            LogFormat::Pretty => {
                let layer = fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(use_ansi)
                    .with_filter(filter);
                tracing_subscriber::registry().with(layer).try_init()
            }
        };

        if installed.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                ansi_colors = use_ansi,
                format = ?format,
                "🔧 Console logging initialized"
            );
        }
    });
}

fn build_filter(environment: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_level(environment)))
}

/// Log level used when `RUST_LOG` is unset
fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}
