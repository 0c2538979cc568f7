//! Bootstrap: assembles configuration, constructs the `AIManager`, and
//! runs the Transport Server until a shutdown signal arrives (spec §4.H,
//! §6 exit codes).

mod cli;
mod transport;

use std::process::ExitCode;
use std::sync::Arc;

use ai_common::AppConfig;
use ai_manager::AIManager;
use ai_rpc::Dispatcher;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::transport::TransportConfig;

const EXIT_CONFIG_FAILURE: u8 = 1;
const EXIT_TRANSPORT_BIND_FAILURE: u8 = 2;
const EXIT_MANAGER_INIT_FAILURE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = AppConfig::default();
    if let Some(socket_path) = cli.socket_path {
        config.server.socket_path = socket_path;
    }
    if let Some(listen_address) = cli.listen_address {
        config.server.listen_address = listen_address;
    }
    if let Some(max_connections) = cli.max_connections {
        config.server.max_connections = max_connections;
    }
    ai_common::apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    if let Err(err) = config.validate() {
        tracing::error!(%err, "invalid configuration");
        return ExitCode::from(EXIT_CONFIG_FAILURE);
    }

    let manager = match AIManager::new(config.ai.clone()).await {
        Ok(manager) => Arc::new(manager),
        Err(err) => {
            tracing::error!(%err, "manager initialization failed");
            return ExitCode::from(EXIT_MANAGER_INIT_FAILURE);
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(manager.clone()));
    let transport_config = TransportConfig {
        socket_path: config.server.socket_path.clone(),
        listen_address: config.server.listen_address.clone(),
        max_connections: config.server.max_connections,
        call_timeout: config.server.timeout,
        shutdown_timeout: config.server.shutdown_timeout,
    };

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            shutdown_signal.cancel();
        }
    });

    let result = transport::serve(dispatcher, transport_config, shutdown).await;
    let _ = manager.close().await;

    match result {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            tracing::error!(%err, "transport failure");
            ExitCode::from(EXIT_TRANSPORT_BIND_FAILURE)
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
