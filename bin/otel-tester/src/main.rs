//! Telemetry simulation tester.
//!
//! Serves an HTTP API that simulates a fleet of instrumented services: a single simulation request can fan out across
//! an arbitrary tree of other tester instances, and test runs repeat sequences of simulations in the background.

use std::{path::PathBuf, sync::Arc};

use otel_tester_core::prelude::*;
use tokio::{net::TcpListener, select};
use tracing::{error, info};

mod api;
use self::api::{APIBuilder, SimulationAPIHandler, TestsAPIHandler};

mod config;
use self::config::TesterConfiguration;

mod logging;
use self::logging::{fatal_and_exit, initialize_logging};

#[tokio::main]
async fn main() {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match TesterConfiguration::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => fatal_and_exit(format!("failed to load configuration: {}", e)),
    };

    if let Err(e) = initialize_logging(&config.log_level, config.log_format_json) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    match run(config).await {
        Ok(()) => info!("otel-tester stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

async fn run(config: TesterConfiguration) -> Result<(), GenericError> {
    info!("otel-tester starting...");

    let client = Arc::new(HttpHopClient::new(config.hop_timeout(), config.default_hop_scheme.clone())?);
    let executor = ChainExecutor::new(client.clone()).with_fan_out(config.fan_out());
    let orchestrator = Orchestrator::new(TestRegistry::new(), client, config.max_running_tests);

    let listener = TcpListener::bind(config.listen_address).await?;
    info!(
        max_running_tests = orchestrator.max_running(),
        fan_out = ?config.fan_out(),
        "otel-tester started: listening on {}",
        listener.local_addr()?
    );

    APIBuilder::new()
        .with_handler(SimulationAPIHandler::new(executor))
        .with_handler(TestsAPIHandler::new(orchestrator.clone()))
        .serve(listener, shutdown_signal())
        .await?;

    info!("Waiting for running tests to stop...");
    orchestrator.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal.");
}
