use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::users;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::ListQuery;
use crate::core::shared::{AppError, AppResult};
use crate::security::password::{check_password_policy, hash_password};
use crate::security::session::revoke_user_sessions;
use crate::security::validation::{Validate, ValidationResult, Validator};
use crate::web::auth::AdminUser;

#[derive(Debug, Clone, Serialize, Queryable, Selectable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_employee: bool,
    pub is_admin: bool,
    pub is_superuser: bool,
    pub position: Option<String>,
    pub commission_rate: BigDecimal,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
struct NewUser {
    id: Uuid,
    company_id: Uuid,
    name: String,
    email: String,
    phone: Option<String>,
    password_hash: String,
    is_employee: bool,
    is_admin: bool,
    is_superuser: bool,
    position: Option<String>,
    commission_rate: BigDecimal,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    #[serde(default = "default_true")]
    pub is_employee: bool,
    #[serde(default)]
    pub is_admin: bool,
    pub position: Option<String>,
    pub commission_rate: Option<BigDecimal>,
}

fn default_true() -> bool {
    true
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .name(&self.name, "name", 255)
            .email(&self.email, "email")
            .optional_phone(self.phone.as_deref(), "phone")
            .check(check_password_policy(&self.password, "password"))
            .optional_length(self.position.as_deref(), "position", 100)
            .check(commission_in_range(self.commission_rate.as_ref()))
            .result()
    }
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = users)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_employee: Option<bool>,
    pub is_admin: Option<bool>,
    pub position: Option<String>,
    pub commission_rate: Option<BigDecimal>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> ValidationResult {
        let mut v = Validator::new()
            .optional_phone(self.phone.as_deref(), "phone")
            .optional_length(self.position.as_deref(), "position", 100)
            .check(commission_in_range(self.commission_rate.as_ref()));
        if let Some(name) = &self.name {
            v = v.name(name, "name", 255);
        }
        if let Some(email) = &self.email {
            v = v.email(email, "email");
        }
        v.result()
    }
}

fn commission_in_range(
    rate: Option<&BigDecimal>,
) -> Result<(), crate::security::validation::ValidationError> {
    match rate {
        Some(rate) => crate::security::validation::validate_range(
            rate.clone(),
            "commission_rate",
            Some(BigDecimal::from(0)),
            Some(BigDecimal::from(100)),
        ),
        None => Ok(()),
    }
}

/// Only a superuser may change or remove another superuser.
pub fn ensure_can_manage(actor_is_superuser: bool, target: &User) -> AppResult<()> {
    if target.is_superuser && !actor_is_superuser {
        return Err(AppError::Forbidden(
            "Only a superuser can manage a superuser account".to_string(),
        ));
    }
    Ok(())
}

pub fn find_user(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<User> {
    users::table
        .find(id)
        .filter(users::company_id.eq(company_id))
        .filter(users::is_deleted.eq(false))
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("User".to_string()))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<User>>> {
    let users = state
        .run(move |conn| {
            let mut q = users::table
                .filter(users::company_id.eq(admin.company_id))
                .filter(users::is_deleted.eq(false))
                .select(User::as_select())
                .into_boxed();

            if let Some(pattern) = query.pattern() {
                q = q.filter(
                    users::name
                        .ilike(pattern.clone())
                        .or(users::email.ilike(pattern)),
                );
            }

            Ok(q.order(users::name.asc())
                .limit(query.limit())
                .offset(query.offset())
                .load(conn)?)
        })
        .await?;

    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let user = state
        .run(move |conn| find_user(conn, admin.company_id, id))
        .await?;
    Ok(Json(user))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let req = req.validated()?;
    let password_hash = hash_password(&req.password)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let now = Utc::now();

    let new_user = NewUser {
        id: Uuid::new_v4(),
        company_id: admin.company_id,
        name: req.name.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        phone: req.phone,
        password_hash,
        is_employee: req.is_employee,
        is_admin: req.is_admin,
        is_superuser: false,
        position: req.position,
        commission_rate: req.commission_rate.unwrap_or_default(),
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    let user = state
        .run(move |conn| {
            let user = diesel::insert_into(users::table)
                .values(&new_user)
                .returning(User::as_returning())
                .get_result(conn)?;
            Ok(user)
        })
        .await?;

    info!("User {} created in company {}", user.id, user.company_id);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(mut req): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    req.email = req.email.map(|e| e.trim().to_lowercase());
    req.name = req.name.map(|n| n.trim().to_string());
    let req = req.validated()?;

    let user = state
        .run(move |conn| {
            let target = find_user(conn, admin.company_id, id)?;
            ensure_can_manage(admin.is_superuser, &target)?;
            diesel::update(users::table.find(id))
                .set((&req, users::updated_at.eq(Utc::now())))
                .execute(conn)?;
            find_user(conn, admin.company_id, id)
        })
        .await?;

    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if id == admin.user_id {
        return Err(AppError::Conflict("You cannot delete your own account".to_string()));
    }

    state
        .run(move |conn| {
            let target = find_user(conn, admin.company_id, id)?;
            ensure_can_manage(admin.is_superuser, &target)?;
            conn.transaction(|conn| {
                diesel::update(users::table.find(id))
                    .set((users::is_deleted.eq(true), users::updated_at.eq(Utc::now())))
                    .execute(conn)?;
                revoke_user_sessions(conn, id, None)?;
                Ok::<_, AppError>(())
            })
        })
        .await?;

    info!("User {} deleted by {}", id, admin.user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn create_request() -> CreateUserRequest {
        CreateUserRequest {
            name: "Marco".into(),
            email: "marco@example.com".into(),
            phone: Some("(555) 010-2030".into()),
            password: "fabricate9".into(),
            is_employee: true,
            is_admin: false,
            position: Some("Sales".into()),
            commission_rate: Some(BigDecimal::from_str("7.5").unwrap()),
        }
    }

    #[test]
    fn test_create_user_validation_passes() {
        assert!(create_request().validate().is_valid());
    }

    #[test]
    fn test_create_user_rejects_bad_fields() {
        let mut req = create_request();
        req.email = "marco".into();
        req.password = "short".into();
        req.commission_rate = Some(BigDecimal::from(150));

        let fields = req.validate().field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("commission_rate"));
    }

    #[test]
    fn test_update_user_partial_validation() {
        let req = UpdateUserRequest {
            name: Some("  ".into()),
            email: None,
            phone: None,
            is_employee: None,
            is_admin: None,
            position: None,
            commission_rate: None,
        };
        let fields = req.validate().field_errors();
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn test_admin_cannot_manage_superuser() {
        let now = Utc::now();
        let mut target = User {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            name: "Owner".into(),
            email: "owner@example.com".into(),
            phone: None,
            password_hash: String::new(),
            is_employee: true,
            is_admin: true,
            is_superuser: true,
            position: None,
            commission_rate: BigDecimal::from(0),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(
            ensure_can_manage(false, &target),
            Err(AppError::Forbidden(_))
        ));
        assert!(ensure_can_manage(true, &target).is_ok());

        target.is_superuser = false;
        assert!(ensure_can_manage(false, &target).is_ok());
    }
}
