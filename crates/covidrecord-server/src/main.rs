use std::env;
use std::sync::Arc;

use covidrecord_providers::StateStore;
use covidrecord_server::config::loader::load_config;
use covidrecord_server::{AppState, CovidRecordServer};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From COVIDRECORD_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (covidrecord.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (COVIDRECORD_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; anything else is worth a warning.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    covidrecord_server::observability::init_tracing(&cfg.logging.level);

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    let state = match AppState::from_config(&cfg) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Provider initialization failed: {e}");
            std::process::exit(2);
        }
    };

    if cfg.demo.enabled {
        tracing::info!(patients = cfg.demo.patients.len(), "Demo mode enabled");
    }

    spawn_state_purge(state.states.clone(), cfg.state.ttl);

    if let Err(err) = CovidRecordServer::new(&cfg, state).run().await {
        eprintln!("Server error: {err}");
    }
}

/// Drops expired authorization states once per TTL.
fn spawn_state_purge(states: Arc<dyn StateStore>, ttl: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ttl);
        interval.tick().await;
        loop {
            interval.tick().await;
            let purged = states.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired authorization states");
            }
        }
    });
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: COVIDRECORD_CONFIG
/// 3. Default: covidrecord.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("COVIDRECORD_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    ("covidrecord.toml".to_string(), ConfigSource::Default)
}
