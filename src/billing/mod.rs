//! Card payments for sales through Stripe Checkout.

use axum::{routing::post, Router};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub mod api;
pub mod stripe_integration;

pub use stripe_integration::{StripeClient, StripeError};

pub fn configure_billing_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::SALE_CHECKOUT, post(api::create_checkout))
        .route(ApiUrls::STRIPE_WEBHOOK, post(api::webhook))
}
