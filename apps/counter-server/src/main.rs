//! # Folio Counter Server
//!
//! Serves per-key counter actors over HTTP with Actix-web.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

#[cfg(feature = "sweeper")]
mod background;
mod config;
mod handlers;
mod middleware;
mod state;
mod telemetry;

use config::AppConfig;
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    telemetry::init_telemetry(&TelemetryConfig::from_env());

    // Load configuration
    let config = AppConfig::from_env();

    tracing::info!(
        "Starting Folio counter server on {}:{}",
        config.host,
        config.port
    );

    // Build application state
    let state = AppState::new(&config)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    #[cfg(feature = "sweeper")]
    let mut sweeper = start_sweeper(&config, &state).await;

    // Start HTTP server
    let app_state = state.clone();
    let result = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(app_state.clone()))
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await;

    #[cfg(feature = "sweeper")]
    if let Some(sweeper) = sweeper.as_mut() {
        if let Err(e) = sweeper.shutdown().await {
            tracing::warn!(error = %e, "Expiry sweeper did not stop cleanly");
        }
    }

    result
}

#[cfg(feature = "sweeper")]
async fn start_sweeper(config: &AppConfig, state: &AppState) -> Option<background::ExpirySweeper> {
    use std::sync::Arc;

    use folio_core::ports::SystemClock;

    if !config.sweeper.enabled {
        tracing::info!("Expiry sweeper disabled");
        return None;
    }

    let started = async {
        let sweeper = background::ExpirySweeper::new(config.sweeper.clone()).await?;
        sweeper
            .register(state.storage.clone(), Arc::new(SystemClock))
            .await?;
        sweeper.start().await?;
        Ok::<_, tokio_cron_scheduler::JobSchedulerError>(sweeper)
    };

    match started.await {
        Ok(sweeper) => Some(sweeper),
        Err(e) => {
            tracing::error!(error = %e, "Failed to start expiry sweeper");
            None
        }
    }
}
