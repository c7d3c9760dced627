//! Recorder binary: monitors every configured room until Ctrl-C.

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use livecut_recorder::config::config_path;
use livecut_recorder::logging::crate_directives;
use livecut_recorder::{metrics, RecorderConfig, Supervisor};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let path = config_path(std::env::args().nth(1));
    let config = RecorderConfig::load(&path).await;
    let level = config
        .as_ref()
        .map(|c| c.root.logger.log_level.clone())
        .unwrap_or_else(|_| "INFO".to_string());
    init_tracing(&level);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load {}: {}", path.display(), e);
            std::process::exit(1);
        }
    };
    info!("Starting livecut-recorder with {}", path.display());

    let metrics_handle = match metrics::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus metrics disabled: {}", e);
            None
        }
    };

    let supervisor = match Supervisor::new(config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = supervisor.run(metrics_handle).await {
        error!("Recorder stopped with error: {}", e);
        std::process::exit(1);
    }
}

/// Colored output for terminals, JSON when `LOG_FORMAT=json`.
fn init_tracing(level: &str) {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in crate_directives(level) {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}
