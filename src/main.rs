use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use stoneserver::core::config::AppConfig;
use stoneserver::core::shared::state::AppState;
use stoneserver::core::shared::utils::{create_conn, run_migrations};
use stoneserver::drive::DriveClient;
use stoneserver::main_module::{bootstrap_admin, init_logging, run_server, spawn_session_purge};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    init_logging();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    let pool = create_conn(&config.database).map_err(|e| {
        error!("Failed to create database pool: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let migrate_pool = pool.clone();
    tokio::task::spawn_blocking(move || run_migrations(&migrate_pool))
        .await
        .map_err(std::io::Error::other)?
        .map_err(|e| {
            error!("Migrations failed: {}", e);
            std::io::Error::other(e.to_string())
        })?;
    info!("Database migrations applied");

    let mut state = AppState::new(config.clone(), pool);
    if let Some(drive) = &config.drive {
        state = state.with_drive(DriveClient::connect(drive).await);
        info!("File storage bucket {}", drive.bucket);
    }
    let state = Arc::new(state);

    bootstrap_admin(&state).await;
    spawn_session_purge(state.clone());

    info!("Starting stoneserver {}", env!("CARGO_PKG_VERSION"));
    run_server(state).await
}
