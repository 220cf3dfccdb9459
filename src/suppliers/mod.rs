//! Stone and fixture suppliers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::suppliers;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::ListQuery;
use crate::core::shared::{AppError, AppResult};
use crate::core::urls::ApiUrls;
use crate::drive::documents::{list_for_owner, Document};
use crate::security::validation::{Validate, ValidationResult, Validator};
use crate::web::EmployeeUser;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = suppliers)]
pub struct Supplier {
    pub id: Uuid,
    pub company_id: Uuid,
    pub supplier_name: String,
    pub website: Option<String>,
    pub manager: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, AsChangeset)]
#[diesel(table_name = suppliers, treat_none_as_null = true)]
pub struct SupplierRequest {
    pub supplier_name: String,
    pub website: Option<String>,
    pub manager: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

impl Validate for SupplierRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .name(&self.supplier_name, "supplier_name", 255)
            .optional_url(self.website.as_deref(), "website")
            .optional_length(self.manager.as_deref(), "manager", 255)
            .optional_phone(self.phone.as_deref(), "phone")
            .optional_email(self.email.as_deref(), "email")
            .optional_length(self.notes.as_deref(), "notes", 5000)
            .result()
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SupplierRequest {
    fn normalized(self) -> Self {
        Self {
            supplier_name: self.supplier_name.trim().to_string(),
            website: blank_to_none(self.website),
            manager: blank_to_none(self.manager),
            phone: blank_to_none(self.phone),
            email: blank_to_none(self.email).map(|e| e.to_lowercase()),
            notes: blank_to_none(self.notes),
        }
    }
}

pub fn find_supplier(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Supplier> {
    suppliers::table
        .find(id)
        .filter(suppliers::company_id.eq(company_id))
        .filter(suppliers::is_deleted.eq(false))
        .select(Supplier::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Supplier".to_string()))
}

pub async fn list_suppliers(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Supplier>>> {
    let rows = state
        .run(move |conn| {
            let mut q = suppliers::table
                .filter(suppliers::company_id.eq(user.company_id))
                .filter(suppliers::is_deleted.eq(false))
                .select(Supplier::as_select())
                .into_boxed();
            if let Some(pattern) = query.pattern() {
                q = q.filter(
                    suppliers::supplier_name
                        .ilike(pattern.clone())
                        .or(suppliers::manager.ilike(pattern)),
                );
            }
            Ok(q.order(suppliers::supplier_name.asc())
                .limit(query.limit())
                .offset(query.offset())
                .load(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

pub async fn get_supplier(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Supplier>> {
    let supplier = state
        .run(move |conn| find_supplier(conn, user.company_id, id))
        .await?;
    Ok(Json(supplier))
}

pub async fn create_supplier(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Json(req): Json<SupplierRequest>,
) -> AppResult<(StatusCode, Json<Supplier>)> {
    let req = req.validated()?.normalized();
    let now = Utc::now();
    let supplier = Supplier {
        id: Uuid::new_v4(),
        company_id: user.company_id,
        supplier_name: req.supplier_name,
        website: req.website,
        manager: req.manager,
        phone: req.phone,
        email: req.email,
        notes: req.notes,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    let supplier = state
        .run(move |conn| {
            diesel::insert_into(suppliers::table)
                .values(&supplier)
                .execute(conn)?;
            Ok(supplier)
        })
        .await?;

    info!("Supplier {} created by {}", supplier.id, user.user_id);
    Ok((StatusCode::CREATED, Json(supplier)))
}

pub async fn update_supplier(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SupplierRequest>,
) -> AppResult<Json<Supplier>> {
    let req = req.validated()?.normalized();
    let supplier = state
        .run(move |conn| {
            find_supplier(conn, user.company_id, id)?;
            diesel::update(suppliers::table.find(id))
                .set((&req, suppliers::updated_at.eq(Utc::now())))
                .execute(conn)?;
            find_supplier(conn, user.company_id, id)
        })
        .await?;
    Ok(Json(supplier))
}

pub async fn delete_supplier(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .run(move |conn| {
            find_supplier(conn, user.company_id, id)?;
            diesel::update(suppliers::table.find(id))
                .set((suppliers::is_deleted.eq(true), suppliers::updated_at.eq(Utc::now())))
                .execute(conn)?;
            Ok(())
        })
        .await?;
    info!("Supplier {} deleted by {}", id, user.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn supplier_documents(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Document>>> {
    let rows = state
        .run(move |conn| {
            find_supplier(conn, user.company_id, id)?;
            Ok(list_for_owner(conn, user.company_id, Some("supplier"), Some(id))?)
        })
        .await?;
    Ok(Json(rows))
}

pub fn configure_supplier_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::SUPPLIERS, get(list_suppliers).post(create_supplier))
        .route(
            ApiUrls::SUPPLIER_BY_ID,
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
        .route(ApiUrls::SUPPLIER_DOCUMENTS, get(supplier_documents))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SupplierRequest {
        SupplierRequest {
            supplier_name: "  MSI Surfaces ".to_string(),
            website: Some("https://www.msisurfaces.com".to_string()),
            manager: Some(" ".to_string()),
            phone: Some("(555) 201-3344".to_string()),
            email: Some("Orders@MSI.example".to_string()),
            notes: None,
        }
    }

    #[test]
    fn test_valid_supplier() {
        assert!(request().validate().is_valid());
    }

    #[test]
    fn test_normalized_trims_and_lowercases() {
        let req = request().normalized();
        assert_eq!(req.supplier_name, "MSI Surfaces");
        assert_eq!(req.manager, None);
        assert_eq!(req.email.as_deref(), Some("orders@msi.example"));
    }

    #[test]
    fn test_invalid_supplier_fields() {
        let mut req = request();
        req.supplier_name = String::new();
        req.website = Some("not a url".to_string());
        req.email = Some("nope".to_string());
        let fields = req.validate().field_errors();
        assert!(fields.contains_key("supplier_name"));
        assert!(fields.contains_key("website"));
        assert!(fields.contains_key("email"));
    }
}
