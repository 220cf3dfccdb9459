//! Process startup: logging, first administrator, housekeeping

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::companies::bootstrap_superuser;
use crate::core::shared::state::AppState;
use crate::security::session::purge_expired;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// `RUST_LOG` overrides the default filter. `log` records are bridged.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stoneserver=info,tower_http=info"));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Logging already initialized: {e}");
    }
}

/// Creates the first company and its superuser when the users table is empty.
pub async fn bootstrap_admin(state: &Arc<AppState>) {
    let (Ok(email), Ok(password)) = (
        std::env::var("BOOTSTRAP_ADMIN_EMAIL"),
        std::env::var("BOOTSTRAP_ADMIN_PASSWORD"),
    ) else {
        return;
    };
    let company = std::env::var("BOOTSTRAP_COMPANY").unwrap_or_else(|_| "Main Shop".to_string());

    match state
        .run(move |conn| bootstrap_superuser(conn, &company, &email, &password))
        .await
    {
        Ok(true) => info!("Bootstrap administrator created"),
        Ok(false) => {}
        Err(e) => warn!("Bootstrap administrator not created: {}", e),
    }
}

pub fn spawn_session_purge(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match state.run(|conn| Ok(purge_expired(conn)?)).await {
                Ok(0) => {}
                Ok(n) => info!("Purged {} expired sessions", n),
                Err(e) => error!("Session purge failed: {}", e),
            }
        }
    });
}
