use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::client::{EmailAddr, PhoneNumber, PhysicalAddress, QboCustomer, QboInvoice, QboTokenResponse};
use super::oauth::QboState;
use crate::contacts::customers::{find_customer, Customer};
use crate::core::shared::schema::{customers, qbo_tokens};
use crate::core::shared::state::AppState;
use crate::core::shared::{AppError, AppResult};
use crate::sales::find_sale;
use crate::web::{AdminUser, EmployeeUser};

/// Access tokens closer than this to expiry are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 60;
/// Upper bound on any lifetime Intuit reports, about ten years.
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 10 * 365 * 24 * 3600;

fn lifetime(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(0, MAX_TOKEN_LIFETIME_SECS))
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = qbo_tokens)]
pub struct QboToken {
    pub company_id: Uuid,
    pub realm_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QboToken {
    pub fn from_response(
        company_id: Uuid,
        realm_id: String,
        tokens: QboTokenResponse,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            company_id,
            realm_id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_expires_at: now + lifetime(tokens.expires_in),
            refresh_expires_at: now + lifetime(tokens.x_refresh_token_expires_in),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.access_expires_at - now < Duration::seconds(REFRESH_MARGIN_SECS)
    }

    pub fn refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at <= now
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "realmId")]
    pub realm_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QboStatus {
    pub connected: bool,
    pub realm_id: Option<String>,
    pub company_name: Option<String>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CustomerSyncResponse {
    pub customer_id: Uuid,
    pub qbo_id: String,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub sale_id: Uuid,
    pub invoice_id: String,
    pub doc_number: Option<String>,
}

fn load_token(conn: &mut PgConnection, company_id: Uuid) -> QueryResult<Option<QboToken>> {
    qbo_tokens::table
        .find(company_id)
        .select(QboToken::as_select())
        .first(conn)
        .optional()
}

fn store_token(conn: &mut PgConnection, token: &QboToken) -> QueryResult<()> {
    diesel::insert_into(qbo_tokens::table)
        .values(token)
        .on_conflict(qbo_tokens::company_id)
        .do_update()
        .set((
            qbo_tokens::realm_id.eq(&token.realm_id),
            qbo_tokens::access_token.eq(&token.access_token),
            qbo_tokens::refresh_token.eq(&token.refresh_token),
            qbo_tokens::access_expires_at.eq(token.access_expires_at),
            qbo_tokens::refresh_expires_at.eq(token.refresh_expires_at),
            qbo_tokens::updated_at.eq(token.updated_at),
        ))
        .execute(conn)?;
    Ok(())
}

/// Returns `(realm_id, access_token)`, refreshing and persisting new tokens
/// when the current access token is about to expire.
pub async fn valid_access_token(state: &AppState, company_id: Uuid) -> AppResult<(String, String)> {
    let qbo = state.qbo()?;
    let token = state
        .run(move |conn| Ok(load_token(conn, company_id)?))
        .await?
        .ok_or_else(|| AppError::Conflict("QuickBooks is not connected".to_string()))?;

    let now = Utc::now();
    if !token.needs_refresh(now) {
        return Ok((token.realm_id, token.access_token));
    }
    if token.refresh_expired(now) {
        return Err(AppError::Conflict(
            "QuickBooks authorization expired, reconnect".to_string(),
        ));
    }

    let refreshed = qbo.refresh(&token.refresh_token).await?;
    let mut renewed = QboToken::from_response(company_id, token.realm_id, refreshed, now);
    renewed.created_at = token.created_at;
    let result = (renewed.realm_id.clone(), renewed.access_token.clone());
    state
        .run(move |conn| Ok(store_token(conn, &renewed)?))
        .await?;
    info!("Refreshed QuickBooks token for company {}", company_id);
    Ok(result)
}

pub async fn connect(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
) -> AppResult<Redirect> {
    let qbo = state.qbo()?;
    let signed = QboState::new(user.company_id, user.session_id).encode(&state.csrf);
    Ok(Redirect::to(&qbo.authorize_url(&signed)))
}

pub async fn callback(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Redirect> {
    let qbo = state.qbo()?;
    if let Some(error) = query.error {
        warn!("QuickBooks authorization denied for company {}: {}", user.company_id, error);
        return Ok(Redirect::to("/?qbo=denied"));
    }

    let encoded = query
        .state
        .ok_or_else(|| AppError::BadRequest("Missing state".to_string()))?;
    QboState::verify_for(&encoded, &state.csrf, user.company_id, user.session_id)
        .map_err(|e| AppError::BadRequest(format!("Invalid OAuth state: {e}")))?;

    let code = query
        .code
        .ok_or_else(|| AppError::BadRequest("Missing code".to_string()))?;
    let realm_id = query
        .realm_id
        .ok_or_else(|| AppError::BadRequest("Missing realmId".to_string()))?;

    let tokens = qbo.exchange_code(&code).await?;
    let token = QboToken::from_response(user.company_id, realm_id, tokens, Utc::now());
    let realm = token.realm_id.clone();
    state.run(move |conn| Ok(store_token(conn, &token)?)).await?;

    info!("Company {} connected QuickBooks realm {}", user.company_id, realm);
    Ok(Redirect::to("/?qbo=connected"))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
) -> AppResult<Json<QboStatus>> {
    state.qbo()?;
    let company_id = user.company_id;
    let token = state
        .run(move |conn| Ok(load_token(conn, company_id)?))
        .await?;

    let Some(token) = token else {
        return Ok(Json(QboStatus {
            connected: false,
            realm_id: None,
            company_name: None,
            refresh_expires_at: None,
        }));
    };

    let company_name = match valid_access_token(&state, company_id).await {
        Ok((realm, access)) => match state.qbo()?.company_info(&realm, &access).await {
            Ok(info) => Some(info.company_name),
            Err(e) => {
                warn!("QuickBooks company info unavailable: {}", e);
                None
            }
        },
        Err(e) => {
            warn!("QuickBooks token unusable for company {}: {}", company_id, e);
            None
        }
    };

    Ok(Json(QboStatus {
        connected: !token.refresh_expired(Utc::now()),
        realm_id: Some(token.realm_id),
        company_name,
        refresh_expires_at: Some(token.refresh_expires_at),
    }))
}

pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
) -> AppResult<Json<QboStatus>> {
    let company_id = user.company_id;
    state
        .run(move |conn| {
            diesel::delete(qbo_tokens::table.find(company_id)).execute(conn)?;
            Ok(())
        })
        .await?;
    info!("Company {} disconnected QuickBooks", company_id);
    Ok(Json(QboStatus {
        connected: false,
        realm_id: None,
        company_name: None,
        refresh_expires_at: None,
    }))
}

pub fn to_qbo_customer(customer: &Customer) -> QboCustomer {
    let bill_addr = (customer.address.is_some() || customer.postal_code.is_some()).then(|| {
        PhysicalAddress {
            line1: customer.address.clone(),
            postal_code: customer.postal_code.clone(),
        }
    });
    QboCustomer {
        id: None,
        display_name: customer.name.clone(),
        company_name: customer.company_name.clone(),
        primary_email_addr: customer.email.clone().map(|address| EmailAddr { address }),
        primary_phone: customer
            .phone
            .clone()
            .map(|free_form_number| PhoneNumber { free_form_number }),
        bill_addr,
    }
}

/// Idempotent: a customer that already has a `qbo_id` is returned as is.
pub async fn sync_customer(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CustomerSyncResponse>> {
    let company_id = user.company_id;
    let customer = state
        .run(move |conn| find_customer(conn, company_id, id))
        .await?;
    if let Some(qbo_id) = customer.qbo_id.clone() {
        return Ok(Json(CustomerSyncResponse {
            customer_id: id,
            qbo_id,
            created: false,
        }));
    }

    let (realm, access) = valid_access_token(&state, company_id).await?;
    let created = state
        .qbo()?
        .create_customer(&realm, &access, &to_qbo_customer(&customer))
        .await?;
    let qbo_id = created
        .id
        .ok_or_else(|| AppError::External("QuickBooks returned a customer without an Id".to_string()))?;

    let stored = qbo_id.clone();
    state
        .run(move |conn| {
            diesel::update(customers::table.find(id))
                .set((
                    customers::qbo_id.eq(Some(stored)),
                    customers::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await?;

    info!("Customer {} synced to QuickBooks as {}", id, qbo_id);
    Ok(Json(CustomerSyncResponse {
        customer_id: id,
        qbo_id,
        created: true,
    }))
}

pub async fn create_sale_invoice(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<InvoiceResponse>> {
    let company_id = user.company_id;
    let (sale, customer) = state
        .run(move |conn| {
            let sale = find_sale(conn, company_id, id)?;
            let customer = find_customer(conn, company_id, sale.customer_id)?;
            Ok((sale, customer))
        })
        .await?;

    if sale.is_cancelled() {
        return Err(AppError::Conflict("A cancelled sale cannot be invoiced".to_string()));
    }
    let qbo_customer = customer.qbo_id.ok_or_else(|| {
        AppError::Conflict("Sync the customer to QuickBooks before invoicing".to_string())
    })?;

    let description = match sale.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(notes) => format!("Countertops, {:.2} sq ft. {}", sale.square_feet, notes),
        None => format!("Countertops, {:.2} sq ft", sale.square_feet),
    };
    let invoice = QboInvoice::single_line(
        &qbo_customer,
        &sale.price,
        description,
        sale.sale_date.date_naive(),
    );

    let (realm, access) = valid_access_token(&state, company_id).await?;
    let created = state.qbo()?.create_invoice(&realm, &access, &invoice).await?;

    info!("Sale {} invoiced in QuickBooks as {}", id, created.id);
    Ok(Json(InvoiceResponse {
        sale_id: id,
        invoice_id: created.id,
        doc_number: created.doc_number,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(access_in: i64, refresh_in: i64) -> QboToken {
        token_at(Utc::now(), access_in, refresh_in)
    }

    fn token_at(now: DateTime<Utc>, access_in: i64, refresh_in: i64) -> QboToken {
        QboToken::from_response(
            Uuid::nil(),
            "123145".to_string(),
            QboTokenResponse {
                access_token: "a".into(),
                refresh_token: "r".into(),
                expires_in: access_in,
                x_refresh_token_expires_in: refresh_in,
            },
            now,
        )
    }

    #[test]
    fn test_refresh_window() {
        let now = Utc::now();
        assert!(!token(3600, 86400).needs_refresh(now));
        assert!(token(30, 86400).needs_refresh(now));
        assert!(token(-10, 86400).needs_refresh(now));
        assert!(token_at(now, 30, -1).refresh_expired(now));
        assert!(!token(30, 86400).refresh_expired(now));
    }

    #[test]
    fn test_extreme_lifetimes_are_clamped() {
        let now = Utc::now();
        let t = token_at(now, i64::MAX, i64::MIN);
        assert_eq!(t.access_expires_at, now + Duration::seconds(MAX_TOKEN_LIFETIME_SECS));
        assert_eq!(t.refresh_expires_at, now);
        assert!(t.refresh_expired(now));
    }

    #[test]
    fn test_to_qbo_customer() {
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            name: "Dana Ortiz".into(),
            email: Some("dana@example.com".into()),
            phone: None,
            address: Some("12 Quarry Rd".into()),
            postal_code: None,
            company_name: None,
            referral_source: None,
            source: "user-input".into(),
            from_check_in: false,
            qbo_id: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        let qbo = to_qbo_customer(&customer);
        assert_eq!(qbo.display_name, "Dana Ortiz");
        assert_eq!(qbo.primary_email_addr.unwrap().address, "dana@example.com");
        assert!(qbo.primary_phone.is_none());
        assert_eq!(qbo.bill_addr.unwrap().line1.as_deref(), Some("12 Quarry Rd"));
    }
}
