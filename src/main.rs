// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

use agentbridge::config;
use agentbridge::engine;
use agentbridge::proxy;
use agentbridge::registry::{CredentialRegistry, CredentialResolver};
use clap::Parser;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "agentbridge",
    about = "Chat-completions gateway for conversational-agent APIs"
)]
struct Cli {
    /// Path to the agentbridge.yaml config file
    #[arg(long, default_value = "agentbridge.yaml", env = "AGENTBRIDGE_CONFIG")]
    config: PathBuf,

    /// Address to listen on
    #[arg(long, default_value = proxy::DEFAULT_BIND_ADDR, env = "AGENTBRIDGE_BIND")]
    bind: SocketAddr,

    /// Re-read model credentials from the config file every N seconds (0 disables)
    #[arg(long, default_value_t = 0, env = "AGENTBRIDGE_RELOAD_SECS")]
    reload_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!(addr = %cli.bind, "agentbridge starting");

    let source = config::FileSource {
        path: cli.config.clone(),
    };
    let config = match config::load_config(&source) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = %config.version,
        upstream = %config.upstream.base_url,
        mode = config.conversation.mode.as_str(),
        models = config.models.len(),
        upload = config.files.upload,
        "config loaded"
    );

    let registry = Arc::new(CredentialRegistry::new(config.models.clone()));
    if cli.reload_secs > 0 {
        spawn_credential_reload(source, registry.clone(), Duration::from_secs(cli.reload_secs));
    }

    let credentials: Arc<dyn CredentialResolver> = registry;
    let gateway = match engine::build_gateway(config, credentials) {
        Ok(g) => g,
        Err(e) => {
            tracing::error!("failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };
    let upstream: Arc<dyn proxy::UpstreamClient> = Arc::new(gateway);

    let app = proxy::build_router(upstream);

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .expect("failed to bind to address");

    tracing::info!(addr = %cli.bind, "agentbridge listening");

    axum::serve(listener, app).await.expect("server error");
}

/// Periodically refresh model credentials; other settings need a restart.
fn spawn_credential_reload(
    source: config::FileSource,
    registry: Arc<CredentialRegistry>,
    every: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match config::load_config(&source) {
                Ok(fresh) => registry.refresh(fresh.models),
                Err(e) => {
                    tracing::warn!(error = %e, "config reload failed, keeping previous credentials")
                }
            }
        }
    });
}
