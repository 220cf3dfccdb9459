//! Tenants. Every other table is keyed by `company_id`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::{companies, users};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::ListQuery;
use crate::core::shared::{AppError, AppResult};
use crate::core::urls::ApiUrls;
use crate::security::password::hash_password;
use crate::security::session::{revoke_company_sessions, switch_company};
use crate::security::validation::{Validate, ValidationResult, Validator};
use crate::web::SuperUser;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = companies)]
pub struct CompanyRequest {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Validate for CompanyRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .name(&self.name, "name", 255)
            .optional_phone(self.phone.as_deref(), "phone")
            .optional_email(self.email.as_deref(), "email")
            .result()
    }
}

pub fn find_company(conn: &mut PgConnection, id: Uuid) -> AppResult<Company> {
    companies::table
        .find(id)
        .filter(companies::is_deleted.eq(false))
        .select(Company::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Company".to_string()))
}

pub async fn list_companies(
    State(state): State<Arc<AppState>>,
    _user: SuperUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Company>>> {
    let rows = state
        .run(move |conn| {
            let mut q = companies::table
                .filter(companies::is_deleted.eq(false))
                .select(Company::as_select())
                .into_boxed();
            if let Some(pattern) = query.pattern() {
                q = q.filter(companies::name.ilike(pattern));
            }
            Ok(q.order(companies::name.asc())
                .limit(query.limit())
                .offset(query.offset())
                .load(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

pub async fn get_company(
    State(state): State<Arc<AppState>>,
    _user: SuperUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Company>> {
    Ok(Json(state.run(move |conn| find_company(conn, id)).await?))
}

pub async fn create_company(
    State(state): State<Arc<AppState>>,
    SuperUser(user): SuperUser,
    Json(req): Json<CompanyRequest>,
) -> AppResult<(StatusCode, Json<Company>)> {
    let req = req.validated()?;
    let now = Utc::now();
    let company = Company {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        address: req.address,
        phone: req.phone,
        email: req.email,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    let company = state
        .run(move |conn| {
            diesel::insert_into(companies::table)
                .values(&company)
                .execute(conn)?;
            Ok(company)
        })
        .await?;

    info!("Company {} created by {}", company.id, user.user_id);
    Ok((StatusCode::CREATED, Json(company)))
}

pub async fn update_company(
    State(state): State<Arc<AppState>>,
    _user: SuperUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CompanyRequest>,
) -> AppResult<Json<Company>> {
    let req = req.validated()?;
    let company = state
        .run(move |conn| {
            find_company(conn, id)?;
            diesel::update(companies::table.find(id))
                .set((&req, companies::updated_at.eq(Utc::now())))
                .execute(conn)?;
            find_company(conn, id)
        })
        .await?;
    Ok(Json(company))
}

pub async fn delete_company(
    State(state): State<Arc<AppState>>,
    SuperUser(user): SuperUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if id == user.company_id {
        return Err(AppError::Conflict(
            "Switch to another company before deleting this one".to_string(),
        ));
    }
    let revoked = state
        .run(move |conn| {
            conn.transaction(|conn| {
                find_company(conn, id)?;
                diesel::update(companies::table.find(id))
                    .set((companies::is_deleted.eq(true), companies::updated_at.eq(Utc::now())))
                    .execute(conn)?;
                Ok::<_, AppError>(revoke_company_sessions(conn, id)?)
            })
        })
        .await?;
    info!("Company {} deleted by {}, {} sessions revoked", id, user.user_id, revoked);
    Ok(StatusCode::NO_CONTENT)
}

/// Moves the caller's current session to another company.
pub async fn switch_to_company(
    State(state): State<Arc<AppState>>,
    SuperUser(user): SuperUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Company>> {
    let session_id = user.session_id;
    let company = state
        .run(move |conn| {
            let company = find_company(conn, id)?;
            switch_company(conn, session_id, id)?;
            Ok(company)
        })
        .await?;
    info!("Superuser {} switched to company {}", user.user_id, id);
    Ok(Json(company))
}

/// Creates the first company and superuser on an empty database.
pub fn bootstrap_superuser(
    conn: &mut PgConnection,
    company_name: &str,
    email: &str,
    password: &str,
) -> AppResult<bool> {
    let existing: i64 = users::table.count().get_result(conn)?;
    if existing > 0 {
        return Ok(false);
    }

    let password_hash = hash_password(password).map_err(|e| AppError::Internal(e.to_string()))?;
    let now = Utc::now();
    let company_id = Uuid::new_v4();

    conn.transaction(|conn| {
        diesel::insert_into(companies::table)
            .values(&Company {
                id: company_id,
                name: company_name.to_string(),
                address: None,
                phone: None,
                email: Some(email.to_string()),
                is_deleted: false,
                created_at: now,
                updated_at: now,
            })
            .execute(conn)?;

        diesel::insert_into(users::table)
            .values((
                users::id.eq(Uuid::new_v4()),
                users::company_id.eq(company_id),
                users::name.eq("Administrator"),
                users::email.eq(email.trim().to_lowercase()),
                users::password_hash.eq(password_hash),
                users::is_employee.eq(true),
                users::is_admin.eq(true),
                users::is_superuser.eq(true),
                users::commission_rate.eq(BigDecimal::from(0)),
                users::is_deleted.eq(false),
                users::created_at.eq(now),
                users::updated_at.eq(now),
            ))
            .execute(conn)?;
        Ok::<_, AppError>(())
    })?;

    info!("Bootstrapped company {} with superuser {}", company_id, email);
    Ok(true)
}

pub fn configure_company_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::COMPANIES, get(list_companies).post(create_company))
        .route(
            ApiUrls::COMPANY_BY_ID,
            get(get_company).put(update_company).delete(delete_company),
        )
        .route(ApiUrls::COMPANY_SWITCH, post(switch_to_company))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_validation() {
        let ok = CompanyRequest {
            name: "Granite Depot".into(),
            address: None,
            phone: Some("555-867-5309".into()),
            email: Some("office@granitedepot.com".into()),
        };
        assert!(ok.validate().is_valid());

        let bad = CompanyRequest {
            name: "".into(),
            address: None,
            phone: Some("12".into()),
            email: Some("office".into()),
        };
        let fields = bad.validate().field_errors();
        assert_eq!(fields.len(), 3);
    }
}
