//! Authentication, sessions and user administration.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;

pub mod auth;
pub mod auth_handlers;
pub mod users;

pub use auth::{AdminUser, AuthenticatedUser, EmployeeUser, SuperUser};

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::AUTH_LOGIN, post(auth_handlers::login))
        .route(ApiUrls::AUTH_LOGOUT, post(auth_handlers::logout))
        .route(ApiUrls::AUTH_ME, get(auth_handlers::me))
        .route(ApiUrls::AUTH_PASSWORD, post(auth_handlers::change_password))
        .route(ApiUrls::USERS, get(users::list_users).post(users::create_user))
        .route(
            ApiUrls::USER_BY_ID,
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
}
