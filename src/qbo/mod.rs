//! QuickBooks Online: OAuth connection, customer sync and invoicing.

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub mod api;
pub mod client;
pub mod oauth;

pub use client::{QboClient, QboError};

pub fn configure_qbo_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::QBO, delete(api::disconnect))
        .route(ApiUrls::QBO_CONNECT, get(api::connect))
        .route(ApiUrls::QBO_CALLBACK, get(api::callback))
        .route(ApiUrls::QBO_STATUS, get(api::status))
        .route(ApiUrls::QBO_CUSTOMER_SYNC, post(api::sync_customer))
        .route(ApiUrls::QBO_SALE_INVOICE, post(api::create_sale_invoice))
}
