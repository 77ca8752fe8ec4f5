use anyhow::Context;
use shutdown_manager::config::{init_logging, ServiceConfig};
use shutdown_manager::power::CommandExecutor;
use shutdown_manager::server::{
    bind_listener, build_router, spawn_signal_watcher, AppState, Supervisor,
};
use shutdown_manager::telemetry::TracerHandle;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Signals first, so a SIGTERM during startup still drains
    let shutdown = spawn_signal_watcher().context("Failed to register signal handlers")?;

    let config = ServiceConfig::from_env().context("Failed to load config")?;

    // Built before logging; a failure is reported once logging is up
    let tracer = TracerHandle::from_env();
    init_logging(&config, tracer.as_ref().ok().map(TracerHandle::tracer))
        .context("Failed to initialize logging")?;

    info!(
        port = config.port,
        log_level = %config.log_level,
        log_type = ?config.log_format,
        "Starting shutdown manager"
    );

    let tracer = match tracer {
        Ok(tracer) => tracer,
        Err(e) => {
            error!(error = %e, "Failed to create tracer provider");
            return Err(e.into());
        }
    };

    let app = build_router(AppState::new(Arc::new(CommandExecutor::default())));

    let listener = match bind_listener(config.listen_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "Failed to start server");
            if let Err(e) = tracer.shutdown().await {
                error!(error = %e, "Failed to shutdown tracer provider");
            }
            return Err(e.into());
        }
    };

    info!(port = config.port, "Server is running");

    Supervisor::new(listener, app, tracer).run(shutdown).await?;
    Ok(())
}
