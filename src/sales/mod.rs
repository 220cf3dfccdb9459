//! Sales: slabs and fixture units sold to a customer.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub mod handlers;
pub mod service;
pub mod types;

pub use service::{find_sale, mark_paid};
pub use types::{Sale, STATUS_CANCELLED, STATUS_INSTALLED, STATUS_PENDING};

pub fn configure_sales_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::SALES, get(handlers::list_sales).post(handlers::create_sale))
        .route(
            ApiUrls::SALE_BY_ID,
            get(handlers::get_sale).put(handlers::update_sale),
        )
        .route(ApiUrls::SALE_CANCEL, post(handlers::cancel_sale))
        .route(ApiUrls::SALE_UNSELL_SLAB, post(handlers::unsell_slab))
        .route(ApiUrls::SALE_PAID, post(handlers::mark_paid))
        .route(ApiUrls::SALE_INSTALLED, post(handlers::mark_installed))
}
