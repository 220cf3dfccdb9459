//! Customers, showroom check-in and the deals pipeline.

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub mod board;
pub mod check_in;
pub mod customers;
pub mod deals;

pub use customers::{find_customer, Customer};

pub fn configure_contacts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::CUSTOMERS,
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(ApiUrls::CUSTOMER_SEARCH, get(customers::search_customers))
        .route(
            ApiUrls::CUSTOMER_BY_ID,
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        )
        .route(ApiUrls::CHECK_IN, post(check_in::check_in))
        .route(ApiUrls::DEALS, get(deals::get_board).post(deals::create_deal))
        .route(
            ApiUrls::DEAL_LISTS,
            get(deals::list_deal_lists).post(deals::create_deal_list),
        )
        .route(ApiUrls::DEAL_LISTS_ORDER, put(deals::reorder_deal_lists))
        .route(
            ApiUrls::DEAL_LIST_BY_ID,
            put(deals::rename_deal_list).delete(deals::delete_deal_list),
        )
        .route(
            ApiUrls::DEAL_BY_ID,
            get(deals::get_deal)
                .put(deals::update_deal)
                .delete(deals::delete_deal),
        )
        .route(ApiUrls::DEAL_MOVE, post(deals::move_deal))
}
