use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::customers;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{search_pattern, ListQuery};
use crate::core::shared::{AppError, AppResult};
use crate::security::validation::{Validate, ValidationResult, Validator};
use crate::web::EmployeeUser;

pub const SOURCE_CHECK_IN: &str = "check-in";
pub const SOURCE_USER_INPUT: &str = "user-input";
pub const SOURCE_LEADS: &str = "leads";
pub const CUSTOMER_SOURCES: &[&str] = &[SOURCE_CHECK_IN, SOURCE_USER_INPUT, SOURCE_LEADS];

const SUGGESTION_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = customers)]
pub struct Customer {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub company_name: Option<String>,
    pub referral_source: Option<String>,
    pub source: String,
    pub from_check_in: bool,
    pub qbo_id: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub company_name: Option<String>,
    pub referral_source: Option<String>,
    pub source: Option<String>,
}

impl Validate for CustomerRequest {
    fn validate(&self) -> ValidationResult {
        let mut v = Validator::new()
            .name(&self.name, "name", 255)
            .optional_email(self.email.as_deref(), "email")
            .optional_phone(self.phone.as_deref(), "phone")
            .optional_length(self.address.as_deref(), "address", 500)
            .optional_length(self.postal_code.as_deref(), "postal_code", 20)
            .optional_length(self.company_name.as_deref(), "company_name", 255)
            .optional_length(self.referral_source.as_deref(), "referral_source", 255);
        if let Some(source) = &self.source {
            v = v.one_of(source, "source", CUSTOMER_SOURCES);
        }
        v.result()
    }
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = customers)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub company_name: Option<String>,
    pub referral_source: Option<String>,
}

impl Validate for UpdateCustomerRequest {
    fn validate(&self) -> ValidationResult {
        let mut v = Validator::new()
            .optional_email(self.email.as_deref(), "email")
            .optional_phone(self.phone.as_deref(), "phone")
            .optional_length(self.address.as_deref(), "address", 500)
            .optional_length(self.postal_code.as_deref(), "postal_code", 20);
        if let Some(name) = &self.name {
            v = v.name(name, "name", 255);
        }
        v.result()
    }
}

#[derive(Debug, Serialize, Queryable)]
pub struct CustomerSuggestion {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    pub term: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CustomerRequest {
    pub fn into_customer(self, company_id: Uuid, source: &str) -> Customer {
        let now = Utc::now();
        Customer {
            id: Uuid::new_v4(),
            company_id,
            name: self.name.trim().to_string(),
            email: blank_to_none(self.email).map(|e| e.to_lowercase()),
            phone: blank_to_none(self.phone),
            address: blank_to_none(self.address),
            postal_code: blank_to_none(self.postal_code),
            company_name: blank_to_none(self.company_name),
            referral_source: blank_to_none(self.referral_source),
            source: source.to_string(),
            from_check_in: source == SOURCE_CHECK_IN,
            qbo_id: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn insert_customer(conn: &mut PgConnection, customer: &Customer) -> AppResult<()> {
    diesel::insert_into(customers::table)
        .values(customer)
        .execute(conn)?;
    Ok(())
}

pub fn find_customer(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Customer> {
    customers::table
        .find(id)
        .filter(customers::company_id.eq(company_id))
        .filter(customers::is_deleted.eq(false))
        .select(Customer::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Customer".to_string()))
}

pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Customer>>> {
    let rows = state
        .run(move |conn| {
            let mut q = customers::table
                .filter(customers::company_id.eq(user.company_id))
                .filter(customers::is_deleted.eq(false))
                .select(Customer::as_select())
                .into_boxed();
            if let Some(pattern) = query.pattern() {
                q = q.filter(
                    customers::name
                        .ilike(pattern.clone())
                        .or(customers::email.ilike(pattern.clone()))
                        .or(customers::phone.ilike(pattern)),
                );
            }
            Ok(q.order(customers::created_at.desc())
                .limit(query.limit())
                .offset(query.offset())
                .load(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

/// Autocomplete for the sale form.
pub async fn search_customers(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Query(query): Query<SuggestionQuery>,
) -> AppResult<Json<Vec<CustomerSuggestion>>> {
    let Some(pattern) = search_pattern(query.term.as_deref()) else {
        return Ok(Json(Vec::new()));
    };
    let rows = state
        .run(move |conn| {
            Ok(customers::table
                .filter(customers::company_id.eq(user.company_id))
                .filter(customers::is_deleted.eq(false))
                .filter(
                    customers::name
                        .ilike(pattern.clone())
                        .or(customers::email.ilike(pattern.clone()))
                        .or(customers::phone.ilike(pattern)),
                )
                .select((
                    customers::id,
                    customers::name,
                    customers::email,
                    customers::phone,
                ))
                .order(customers::name.asc())
                .limit(SUGGESTION_LIMIT)
                .load::<CustomerSuggestion>(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Customer>> {
    let customer = state
        .run(move |conn| find_customer(conn, user.company_id, id))
        .await?;
    Ok(Json(customer))
}

pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Json(req): Json<CustomerRequest>,
) -> AppResult<(StatusCode, Json<Customer>)> {
    let req = req.validated()?;
    let source = req
        .source
        .clone()
        .unwrap_or_else(|| SOURCE_USER_INPUT.to_string());
    let customer = req.into_customer(user.company_id, &source);

    let customer = state
        .run(move |conn| {
            insert_customer(conn, &customer)?;
            Ok(customer)
        })
        .await?;

    info!("Customer {} created by {}", customer.id, user.user_id);
    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCustomerRequest>,
) -> AppResult<Json<Customer>> {
    let mut req = req.validated()?;
    req.email = req.email.map(|e| e.trim().to_lowercase());
    let customer = state
        .run(move |conn| {
            find_customer(conn, user.company_id, id)?;
            diesel::update(customers::table.find(id))
                .set((&req, customers::updated_at.eq(Utc::now())))
                .execute(conn)?;
            find_customer(conn, user.company_id, id)
        })
        .await?;
    Ok(Json(customer))
}

pub async fn delete_customer(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .run(move |conn| {
            find_customer(conn, user.company_id, id)?;
            let now = Utc::now();
            diesel::update(customers::table.find(id))
                .set((
                    customers::is_deleted.eq(true),
                    customers::deleted_at.eq(now),
                    customers::updated_at.eq(now),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await?;
    info!("Customer {} deleted by {}", id, user.user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CustomerRequest {
        CustomerRequest {
            name: "  Dana Whitfield ".into(),
            email: Some(" Dana@Example.com ".into()),
            phone: Some("(555) 201-3344".into()),
            address: Some("".into()),
            postal_code: None,
            company_name: None,
            referral_source: Some("Google".into()),
            source: None,
        }
    }

    #[test]
    fn test_customer_normalization() {
        let customer = request().into_customer(Uuid::nil(), SOURCE_USER_INPUT);
        assert_eq!(customer.name, "Dana Whitfield");
        assert_eq!(customer.email.as_deref(), Some("dana@example.com"));
        assert_eq!(customer.address, None);
        assert!(!customer.from_check_in);
    }

    #[test]
    fn test_check_in_source_sets_flag() {
        let customer = request().into_customer(Uuid::nil(), SOURCE_CHECK_IN);
        assert!(customer.from_check_in);
        assert_eq!(customer.source, "check-in");
    }

    #[test]
    fn test_source_must_be_known() {
        let mut req = request();
        req.source = Some("walk-in".into());
        assert!(req.validate().field_errors().contains_key("source"));
        req.source = Some(SOURCE_LEADS.into());
        assert!(req.validate().is_valid());
    }
}
