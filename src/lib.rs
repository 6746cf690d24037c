pub mod api;
pub mod config;
pub mod pipeline;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use pipeline::analysis::{default_engine, DocumentAnalyzer};

/// Install the global fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Load and validate configuration, then serve the HTTP API until ctrl-c.
pub async fn run() -> Result<(), String> {
    init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AnalyzerConfig::load_from_env().map_err(|e| e.to_string())?;
    tracing::info!(
        profiles = config.profiles.len(),
        checks = config.checks.enabled_names().len(),
        ocr_timeout_ms = config.ocr_timeout_ms,
        "Analyzer configuration loaded"
    );

    let addr: SocketAddr = config::bind_addr()
        .parse()
        .map_err(|e| format!("Invalid {}: {e}", config::ADDR_ENV))?;

    let analyzer = Arc::new(DocumentAnalyzer::new(Arc::new(config), default_engine()));
    api::run_until_ctrl_c(analyzer, addr).await
}
