//! HTTP server initialization and routing

use axum::extract::DefaultBodyLimit;
use axum::{middleware, routing::get, Router};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::security::{require_csrf, CorsConfig};

use super::{health_check, health_check_simple};

/// Uploads carry slab photos and PDFs.
pub const MAX_BODY_BYTES: usize = 30 * 1024 * 1024;

/// Every API route with the full middleware stack, ready to serve.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route(ApiUrls::HEALTH, get(health_check_simple))
        .route(ApiUrls::API_HEALTH, get(health_check))
        .merge(crate::web::configure_auth_routes())
        .merge(crate::companies::configure_company_routes())
        .merge(crate::drive::documents::configure_document_routes())
        .merge(crate::inventory::configure_inventory_routes())
        .merge(crate::cutting::configure_cutting_routes())
        .merge(crate::contacts::configure_contacts_routes())
        .merge(crate::sales::configure_sales_routes())
        .merge(crate::payroll::configure_payroll_routes())
        .merge(crate::calendar::configure_calendar_routes())
        .merge(crate::suppliers::configure_supplier_routes())
        .merge(crate::instructions::configure_instruction_routes())
        .merge(crate::checklists::configure_checklist_routes())
        .merge(crate::qbo::configure_qbo_routes())
        .merge(crate::billing::configure_billing_routes());

    let cors = CorsConfig::new(
        &app_state.config.server.cors_origins,
        &app_state.config.server.base_url,
    )
    .build();

    // Layers run last-added first: cookies must be parsed before the CSRF check.
    api_router
        .layer(middleware::from_fn_with_state(app_state.clone(), require_csrf))
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

pub async fn run_server(app_state: Arc<AppState>) -> std::io::Result<()> {
    let host = app_state.config.server.host.clone();
    let port = app_state.config.server.port;
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{host}:{port}: {e}")))?;

    let app = build_router(app_state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {} - is another instance running?", addr, e);
            return Err(e);
        }
    };
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down HTTP server...");
}
