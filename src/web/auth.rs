//! Session-backed authentication extractors.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use diesel::prelude::*;
use log::error;
use std::sync::Arc;
use tower_cookies::cookie::{time::Duration as CookieDuration, SameSite};
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::core::config::SessionConfig;
use crate::core::shared::schema::{companies, users};
use crate::core::shared::state::AppState;
use crate::core::shared::AppError;
use crate::security::session::{hash_token, resolve_session};
use crate::web::users::User;

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| {
            if auth.len() > 7 && auth[..7].eq_ignore_ascii_case("bearer ") {
                Some(auth[7..].trim().to_string())
            } else {
                None
            }
        })
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

pub fn login_redirect(path_and_query: &str) -> String {
    format!("/login?redirectTo={}", urlencoding::encode(path_and_query))
}

#[derive(Debug)]
pub enum AuthRejection {
    /// `redirect` is set for browser navigations.
    Unauthenticated { redirect: Option<String> },
    Forbidden(&'static str),
    Internal(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated {
                redirect: Some(location),
            } => Redirect::to(&location).into_response(),
            Self::Unauthenticated { redirect: None } => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Authentication required" })),
            )
                .into_response(),
            Self::Forbidden(message) => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": message })),
            )
                .into_response(),
            Self::Internal(e) => e.into_response(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    /// The company the session currently acts for. Superusers may switch it.
    pub company_id: Uuid,
    pub name: String,
    pub email: String,
    pub is_employee: bool,
    pub is_admin: bool,
    pub is_superuser: bool,
    #[serde(skip)]
    pub session_id: Uuid,
    /// Hash of the presented token; CSRF tokens are bound to it.
    #[serde(skip)]
    pub token_hash: String,
}

impl AuthenticatedUser {
    pub fn is_staff(&self) -> bool {
        self.is_employee || self.is_admin || self.is_superuser
    }

    pub fn can_admin(&self) -> bool {
        self.is_admin || self.is_superuser
    }
}

async fn load_user(state: &AppState, token: String) -> Result<Option<AuthenticatedUser>, AppError> {
    let session_config = state.config.session.clone();
    state
        .run(move |conn| {
            let Some(session) = resolve_session(conn, &token, &session_config)? else {
                return Ok(None);
            };
            let user: Option<User> = users::table
                .inner_join(companies::table)
                .filter(users::id.eq(session.user_id))
                .filter(users::is_deleted.eq(false))
                .filter(companies::is_deleted.eq(false))
                .select(User::as_select())
                .first(conn)
                .optional()?;
            let company_live: i64 = companies::table
                .find(session.company_id)
                .filter(companies::is_deleted.eq(false))
                .count()
                .get_result(conn)?;
            if company_live == 0 {
                return Ok(None);
            }

            Ok(user.map(|user| AuthenticatedUser {
                user_id: user.id,
                company_id: session.company_id,
                name: user.name,
                email: user.email,
                is_employee: user.is_employee,
                is_admin: user.is_admin,
                is_superuser: user.is_superuser,
                session_id: session.id,
                token_hash: hash_token(&token),
            }))
        })
        .await
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        let redirect = wants_html(&parts.headers).then(|| {
            let target = parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| parts.uri.path().to_string());
            login_redirect(&target)
        });
        let unauthenticated = move || AuthRejection::Unauthenticated {
            redirect: redirect.clone(),
        };

        let token = match extract_bearer_token(&parts.headers) {
            Some(token) => Some(token),
            None => Cookies::from_request_parts(parts, state)
                .await
                .ok()
                .and_then(|cookies| {
                    cookies
                        .get(&state.config.session.cookie_name)
                        .map(|c| c.value().to_string())
                }),
        };

        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Err(unauthenticated());
        };

        match load_user(state, token).await {
            Ok(Some(user)) => {
                parts.extensions.insert(user.clone());
                Ok(user)
            }
            Ok(None) => Err(unauthenticated()),
            Err(e) => {
                error!("Failed to resolve session: {}", e);
                Err(AuthRejection::Internal(e))
            }
        }
    }
}

/// Employees, admins and superusers.
#[derive(Debug, Clone)]
pub struct EmployeeUser(pub AuthenticatedUser);

#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

#[derive(Debug, Clone)]
pub struct SuperUser(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for EmployeeUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if user.is_staff() {
            Ok(Self(user))
        } else {
            Err(AuthRejection::Forbidden("Employee access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if user.can_admin() {
            Ok(Self(user))
        } else {
            Err(AuthRejection::Forbidden("Admin access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SuperUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if user.is_superuser {
            Ok(Self(user))
        } else {
            Err(AuthRejection::Forbidden("Superuser access required"))
        }
    }
}

pub fn create_session_cookie(config: &SessionConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookie)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::hours(config.absolute_timeout_hours))
        .build()
}

pub fn clear_session_cookie(cookies: &Cookies, config: &SessionConfig) {
    let removal = Cookie::build((config.cookie_name.clone(), ""))
        .path("/")
        .build();
    cookies.remove(removal);
}
