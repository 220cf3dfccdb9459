//! Login, logout and session introspection.

use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_cookies::Cookies;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::shared::schema::{companies, users};
use crate::core::shared::state::AppState;
use crate::core::shared::{AppError, AppResult};
use crate::security::password::{check_password_policy, hash_password, verify_password};
use crate::security::session::{create_session, hash_token, revoke_session, revoke_user_sessions};
use crate::security::validation::{Validate, ValidationResult, Validator};
use crate::web::auth::{clear_session_cookie, create_session_cookie, AuthenticatedUser};
use crate::web::users::User;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

impl Validate for LoginRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .email(&self.email, "email")
            .string_required(&self.password, "password")
            .result()
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: AuthenticatedUser,
    pub csrf_token: String,
    #[serde(rename = "redirectTo", skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl Validate for ChangePasswordRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .string_required(&self.current_password, "current_password")
            .check(check_password_policy(&self.new_password, "new_password"))
            .result()
    }
}

/// Only same-origin absolute paths are accepted as post-login targets.
pub fn safe_redirect(target: Option<&str>) -> String {
    match target {
        Some(t) if t.starts_with('/') && !t.starts_with("//") && !t.contains('\\') => t.to_string(),
        _ => "/".to_string(),
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<SessionResponse>> {
    let req = req.validated()?;
    let email = req.email.trim().to_lowercase();
    let session_config = state.config.session.clone();
    let attempted = email.clone();

    let (token, user, session_id) = state
        .run(move |conn| {
            let user: Option<User> = users::table
                .inner_join(companies::table)
                .filter(users::email.eq(&email))
                .filter(users::is_deleted.eq(false))
                .filter(companies::is_deleted.eq(false))
                .select(User::as_select())
                .first(conn)
                .optional()?;

            let Some(user) = user else {
                return Err(AppError::InvalidCredentials);
            };

            let valid = verify_password(&req.password, &user.password_hash)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            if !valid {
                return Err(AppError::InvalidCredentials);
            }

            let (token, session) = create_session(conn, user.id, user.company_id, &session_config)?;
            Ok((token, user, session.id))
        })
        .await
        .inspect_err(|e| {
            if matches!(e, AppError::InvalidCredentials) {
                warn!("Failed login attempt for {}", attempted);
            }
        })?;

    let token_hash = hash_token(&token);
    let csrf_token = state.csrf.issue(&token_hash);
    cookies.add(create_session_cookie(&state.config.session, token));

    info!("User {} logged in", user.id);

    Ok(Json(SessionResponse {
        user: AuthenticatedUser {
            user_id: user.id,
            company_id: user.company_id,
            name: user.name,
            email: user.email,
            is_employee: user.is_employee,
            is_admin: user.is_admin,
            is_superuser: user.is_superuser,
            session_id,
            token_hash,
        },
        csrf_token,
        redirect_to: Some(safe_redirect(req.redirect_to.as_deref())),
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    cookies: Cookies,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let session_id = user.session_id;
    state
        .run(move |conn| {
            revoke_session(conn, session_id)?;
            Ok(())
        })
        .await?;

    clear_session_cookie(&cookies, &state.config.session);
    info!("User {} logged out", user.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Json<SessionResponse> {
    let csrf_token = state.csrf.issue(&user.token_hash);
    Json(SessionResponse {
        user,
        csrf_token,
        redirect_to: None,
    })
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    let req = req.validated()?;
    let user_id: Uuid = user.user_id;
    let keep = user.session_id;

    state
        .run(move |conn| {
            let current: String = users::table
                .find(user_id)
                .select(users::password_hash)
                .first(conn)?;

            let valid = verify_password(&req.current_password, &current)
                .map_err(|e| AppError::Internal(e.to_string()))?;
            if !valid {
                return Err(AppError::field("current_password", "is incorrect"));
            }

            let new_hash =
                hash_password(&req.new_password).map_err(|e| AppError::Internal(e.to_string()))?;
            diesel::update(users::table.find(user_id))
                .set((
                    users::password_hash.eq(new_hash),
                    users::updated_at.eq(chrono::Utc::now()),
                ))
                .execute(conn)?;
            revoke_user_sessions(conn, user_id, Some(keep))?;
            Ok(())
        })
        .await?;

    info!("User {} changed password", user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_redirect() {
        assert_eq!(safe_redirect(Some("/deals")), "/deals");
        assert_eq!(safe_redirect(Some("/stones?type=quartz")), "/stones?type=quartz");
        assert_eq!(safe_redirect(Some("//evil.example")), "/");
        assert_eq!(safe_redirect(Some("https://evil.example")), "/");
        assert_eq!(safe_redirect(Some("/\\evil.example")), "/");
        assert_eq!(safe_redirect(None), "/");
    }

    #[test]
    fn test_login_validation() {
        let req = LoginRequest {
            email: "not-an-email".into(),
            password: "".into(),
            redirect_to: None,
        };
        let fields = req.validate().field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_change_password_validation() {
        let req = ChangePasswordRequest {
            current_password: "old-pass1".into(),
            new_password: "weak".into(),
        };
        assert!(req.validate().field_errors().contains_key("new_password"));
    }
}
