//! Public showroom check-in form.

use diesel::Connection;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::companies::find_company;
use crate::contacts::customers::{insert_customer, Customer, CustomerRequest, SOURCE_CHECK_IN};
use crate::contacts::deals::{append_deal, ensure_default_lists};
use crate::core::shared::state::AppState;
use crate::core::shared::{AppError, AppResult};
use crate::security::validation::{Validate, ValidationError, ValidationResult, Validator};

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub referral_source: Option<String>,
    pub notes: Option<String>,
}

impl Validate for CheckInRequest {
    fn validate(&self) -> ValidationResult {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        Validator::new()
            .name(&self.name, "name", 255)
            .optional_email(self.email.as_deref(), "email")
            .optional_phone(self.phone.as_deref(), "phone")
            .optional_length(self.notes.as_deref(), "notes", 2000)
            .custom(|| {
                (blank(&self.email) && blank(&self.phone))
                    .then(|| ValidationError::Required("phone".to_string()))
            })
            .result()
    }
}

#[derive(Debug, Serialize)]
pub struct CheckInResponse {
    pub customer_id: Uuid,
    pub message: String,
}

fn notification_body(customer: &Customer, notes: Option<&str>) -> String {
    let mut body = format!("{} just checked in at the showroom.\n\n", customer.name);
    if let Some(email) = &customer.email {
        body.push_str(&format!("Email: {email}\n"));
    }
    if let Some(phone) = &customer.phone {
        body.push_str(&format!("Phone: {phone}\n"));
    }
    if let Some(source) = &customer.referral_source {
        body.push_str(&format!("Heard about us: {source}\n"));
    }
    if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
        body.push_str(&format!("\n{}\n", notes.trim()));
    }
    body
}

pub async fn check_in(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
    Json(req): Json<CheckInRequest>,
) -> AppResult<(StatusCode, Json<CheckInResponse>)> {
    let req = req.validated()?;
    let notes = req.notes.clone();
    let customer = CustomerRequest {
        name: req.name,
        email: req.email,
        phone: req.phone,
        address: req.address,
        postal_code: req.postal_code,
        company_name: None,
        referral_source: req.referral_source,
        source: None,
    }
    .into_customer(company_id, SOURCE_CHECK_IN);

    let deal_notes = notes.clone();
    let (customer, company_email) = state
        .run(move |conn| {
            let company = find_company(conn, company_id)?;
            conn.transaction(|conn| {
                insert_customer(conn, &customer)?;
                let lists = ensure_default_lists(conn, company_id)?;
                let first = lists
                    .first()
                    .ok_or_else(|| AppError::Conflict("Company has no deal lists".to_string()))?;
                append_deal(conn, company_id, customer.id, first.id, None, deal_notes, None)?;
                Ok::<_, AppError>(())
            })?;
            Ok((customer, company.email))
        })
        .await?;

    info!("Check-in {} for company {}", customer.id, company_id);

    if let (Some(mailer), Some(to)) = (state.mailer.clone(), company_email) {
        let subject = format!("New check-in: {}", customer.name);
        let body = notification_body(&customer, notes.as_deref());
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&to, &subject, body, None).await {
                warn!("Check-in notification not sent: {}", e);
            }
        });
    }

    Ok((
        StatusCode::CREATED,
        Json(CheckInResponse {
            customer_id: customer.id,
            message: "Thanks for checking in. Someone will be with you shortly.".to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: Option<&str>, phone: Option<&str>) -> CheckInRequest {
        CheckInRequest {
            name: "Lee Park".into(),
            email: email.map(String::from),
            phone: phone.map(String::from),
            address: None,
            postal_code: None,
            referral_source: Some("Instagram".into()),
            notes: Some("Looking at white quartz".into()),
        }
    }

    #[test]
    fn test_requires_a_way_to_reach_the_customer() {
        assert!(!request(None, Some(" ")).validate().is_valid());
        assert!(request(Some("lee@example.com"), None).validate().is_valid());
        assert!(request(None, Some("5551234567")).validate().is_valid());
    }

    #[test]
    fn test_notification_body() {
        let req = request(Some("lee@example.com"), None);
        let customer = CustomerRequest {
            name: req.name,
            email: req.email,
            phone: None,
            address: None,
            postal_code: None,
            company_name: None,
            referral_source: req.referral_source,
            source: None,
        }
        .into_customer(Uuid::nil(), SOURCE_CHECK_IN);
        let body = notification_body(&customer, Some("Looking at white quartz"));
        assert!(body.starts_with("Lee Park just checked in"));
        assert!(body.contains("Email: lee@example.com"));
        assert!(body.contains("Heard about us: Instagram"));
        assert!(body.ends_with("Looking at white quartz\n"));
    }
}
