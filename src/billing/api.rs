use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::stripe_integration::{CreateCheckoutSessionParams, StripeCheckoutSession, WebhookEventType};
use crate::core::shared::schema::stripe_checkouts;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::money_to_cents;
use crate::core::shared::{AppError, AppResult};
use crate::sales::{self, find_sale, Sale};
use crate::web::EmployeeUser;

pub const CHECKOUT_OPEN: &str = "open";
pub const CHECKOUT_PAID: &str = "paid";
pub const CHECKOUT_EXPIRED: &str = "expired";

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = stripe_checkouts)]
pub struct StripeCheckout {
    pub id: Uuid,
    pub company_id: Uuid,
    pub sale_id: Uuid,
    pub session_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    pub amount: Option<BigDecimal>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

/// What is still owed on `price` after the completed checkouts in `paid`.
pub fn outstanding(price: &BigDecimal, paid: &[BigDecimal]) -> BigDecimal {
    let total = paid.iter().fold(BigDecimal::zero(), |acc, a| acc + a);
    let left = price - total;
    if left < BigDecimal::zero() {
        BigDecimal::zero()
    } else {
        left
    }
}

pub fn fully_paid(price: &BigDecimal, paid: &[BigDecimal]) -> bool {
    outstanding(price, paid).is_zero()
}

/// Charges the remaining balance unless a partial amount is given.
pub fn checkout_amount(
    sale: &Sale,
    paid: &[BigDecimal],
    requested: Option<BigDecimal>,
) -> AppResult<BigDecimal> {
    if sale.is_cancelled() {
        return Err(AppError::Conflict("A cancelled sale cannot be paid".to_string()));
    }
    let balance = outstanding(&sale.price, paid);
    if sale.paid_date.is_some() || balance.is_zero() {
        return Err(AppError::Conflict("This sale is already paid".to_string()));
    }
    let amount = requested.unwrap_or_else(|| balance.clone());
    if amount <= BigDecimal::zero() {
        return Err(AppError::field("amount", "must be greater than zero"));
    }
    if amount > balance {
        return Err(AppError::field("amount", "cannot exceed the outstanding balance"));
    }
    Ok(amount)
}

fn paid_amounts(conn: &mut PgConnection, sale_id: Uuid) -> QueryResult<Vec<BigDecimal>> {
    stripe_checkouts::table
        .filter(stripe_checkouts::sale_id.eq(sale_id))
        .filter(stripe_checkouts::status.eq(CHECKOUT_PAID))
        .select(stripe_checkouts::amount)
        .load(conn)
}

pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    body: Option<Json<CheckoutRequest>>,
) -> AppResult<Json<CheckoutResponse>> {
    let stripe = state.stripe()?.clone();
    let company_id = user.company_id;
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let (sale, paid) = state
        .run(move |conn| {
            let sale = find_sale(conn, company_id, id)?;
            let paid = paid_amounts(conn, id)?;
            Ok((sale, paid))
        })
        .await?;
    let amount = checkout_amount(&sale, &paid, req.amount)?;
    let amount_cents = money_to_cents(&amount)
        .ok_or_else(|| AppError::field("amount", "is out of range"))?;

    let base_url = state.config.server.base_url.trim_end_matches('/');
    let mut metadata = HashMap::new();
    metadata.insert("sale_id".to_string(), id.to_string());
    metadata.insert("company_id".to_string(), company_id.to_string());

    let session = stripe
        .create_checkout_session(CreateCheckoutSessionParams {
            amount_cents,
            currency: stripe.currency().to_string(),
            name: format!("Countertop installation, sale {}", &id.simple().to_string()[..8]),
            success_url: format!("{base_url}/sales/{id}?checkout=success"),
            cancel_url: format!("{base_url}/sales/{id}?checkout=cancelled"),
            metadata,
        })
        .await?;
    let url = session
        .url
        .clone()
        .ok_or_else(|| AppError::External("Stripe returned no checkout URL".to_string()))?;

    let now = Utc::now();
    let row = StripeCheckout {
        id: Uuid::new_v4(),
        company_id,
        sale_id: id,
        session_id: session.id.clone(),
        amount,
        currency: stripe.currency().to_string(),
        status: CHECKOUT_OPEN.to_string(),
        created_at: now,
        updated_at: now,
    };
    state
        .run(move |conn| {
            diesel::insert_into(stripe_checkouts::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await?;

    info!("Checkout {} opened for sale {} by {}", session.id, id, user.user_id);
    Ok(Json(CheckoutResponse {
        url,
        session_id: session.id,
    }))
}

fn find_checkout(conn: &mut PgConnection, session_id: &str) -> AppResult<Option<StripeCheckout>> {
    Ok(stripe_checkouts::table
        .filter(stripe_checkouts::session_id.eq(session_id))
        .select(StripeCheckout::as_select())
        .for_update()
        .first(conn)
        .optional()?)
}

fn set_status(conn: &mut PgConnection, id: Uuid, status: &str) -> AppResult<()> {
    diesel::update(stripe_checkouts::table.find(id))
        .set((
            stripe_checkouts::status.eq(status),
            stripe_checkouts::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

/// Applies a completed session. Replays of the same event are no-ops. The
/// sale is marked paid only once its completed checkouts cover the price.
pub fn complete_checkout(conn: &mut PgConnection, session: &StripeCheckoutSession) -> AppResult<bool> {
    conn.transaction(|conn| {
        let Some(checkout) = find_checkout(conn, &session.id)? else {
            warn!("Stripe session {} has no matching checkout", session.id);
            return Ok(false);
        };
        if checkout.status == CHECKOUT_PAID {
            return Ok(false);
        }
        if !session.is_paid() {
            return Ok(false);
        }
        set_status(conn, checkout.id, CHECKOUT_PAID)?;

        let sale = find_sale(conn, checkout.company_id, checkout.sale_id)?;
        let paid = paid_amounts(conn, checkout.sale_id)?;
        if !fully_paid(&sale.price, &paid) {
            info!(
                "Partial payment of {} recorded for sale {}, {} outstanding",
                checkout.amount,
                checkout.sale_id,
                outstanding(&sale.price, &paid)
            );
            return Ok(true);
        }
        match sales::mark_paid(conn, checkout.company_id, checkout.sale_id, Utc::now()) {
            Ok(_) => {}
            Err(AppError::Conflict(msg)) => {
                warn!("Sale {} paid through Stripe but not updated: {}", checkout.sale_id, msg);
            }
            Err(e) => return Err(e),
        }
        Ok(true)
    })
}

pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: String,
) -> AppResult<Json<serde_json::Value>> {
    let stripe = state.stripe()?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    let event = stripe.verify_webhook_signature(&payload, signature)?;
    match stripe.parse_webhook_event(&event)? {
        WebhookEventType::CheckoutCompleted(session) => {
            let session_id = session.id.clone();
            let applied = state.run(move |conn| complete_checkout(conn, &session)).await?;
            if applied {
                info!("Stripe checkout {} paid", session_id);
            }
        }
        WebhookEventType::CheckoutExpired(session) => {
            state
                .run(move |conn| {
                    if let Some(checkout) = find_checkout(conn, &session.id)? {
                        if checkout.status == CHECKOUT_OPEN {
                            set_status(conn, checkout.id, CHECKOUT_EXPIRED)?;
                        }
                    }
                    Ok(())
                })
                .await?;
        }
        WebhookEventType::Unknown(kind) => {
            log::debug!("Ignoring Stripe event {}", kind);
        }
    }

    Ok(Json(serde_json::json!({ "received": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sales::{STATUS_CANCELLED, STATUS_PENDING};
    use std::str::FromStr;

    fn sale(price: &str) -> Sale {
        let now = Utc::now();
        Sale {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            sale_date: now,
            price: BigDecimal::from_str(price).unwrap(),
            notes: None,
            square_feet: 42.5,
            status: STATUS_PENDING.to_string(),
            paid_date: None,
            installed_date: None,
            cancelled_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_checkout_amount_defaults_to_price() {
        let s = sale("2450.00");
        assert_eq!(checkout_amount(&s, &[], None).unwrap(), s.price);
        let deposit = BigDecimal::from_str("500").unwrap();
        assert_eq!(checkout_amount(&s, &[], Some(deposit.clone())).unwrap(), deposit);
        assert_eq!(
            checkout_amount(&s, &[deposit], None).unwrap(),
            BigDecimal::from_str("1950.00").unwrap()
        );
    }

    #[test]
    fn test_checkout_amount_bounds() {
        let s = sale("100");
        assert!(matches!(
            checkout_amount(&s, &[], Some(BigDecimal::zero())),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            checkout_amount(&s, &[], Some(BigDecimal::from(101))),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            checkout_amount(&s, &[BigDecimal::from(60)], Some(BigDecimal::from(41))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_checkout_rejects_closed_sales() {
        let mut cancelled = sale("100");
        cancelled.status = STATUS_CANCELLED.to_string();
        assert!(matches!(checkout_amount(&cancelled, &[], None), Err(AppError::Conflict(_))));

        let mut paid = sale("100");
        paid.paid_date = Some(Utc::now());
        assert!(matches!(checkout_amount(&paid, &[], None), Err(AppError::Conflict(_))));

        let settled = sale("100");
        assert!(matches!(
            checkout_amount(&settled, &[BigDecimal::from(100)], None),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_deposit_does_not_settle_the_sale() {
        let price = BigDecimal::from(1000);
        let deposit = BigDecimal::from(100);
        assert!(!fully_paid(&price, &[deposit.clone()]));
        assert_eq!(outstanding(&price, &[deposit.clone()]), BigDecimal::from(900));

        let rest = BigDecimal::from(900);
        assert!(fully_paid(&price, &[deposit.clone(), rest]));
        assert!(fully_paid(&price, &[BigDecimal::from(1200)]));
        assert_eq!(outstanding(&price, &[BigDecimal::from(1200)]), BigDecimal::zero());
    }
}
