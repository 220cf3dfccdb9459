use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;

use crate::core::config::StripeConfig;
use crate::core::shared::AppError;
use crate::security::csrf::constant_time_compare;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeClient {
    api_key: String,
    webhook_secret: String,
    currency: String,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeCheckoutSession {
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutSessionParams {
    pub amount_cents: i64,
    pub currency: String,
    pub name: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeWebhookData,
    pub created: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeWebhookData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum WebhookEventType {
    CheckoutCompleted(StripeCheckoutSession),
    CheckoutExpired(StripeCheckoutSession),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StripeError {
    ApiError(String),
    NetworkError(String),
    InvalidWebhook(String),
    ParseError(String),
}

impl std::fmt::Display for StripeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiError(e) => write!(f, "Stripe API error: {e}"),
            Self::NetworkError(e) => write!(f, "Network error: {e}"),
            Self::InvalidWebhook(e) => write!(f, "Invalid webhook: {e}"),
            Self::ParseError(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for StripeError {}

impl From<StripeError> for AppError {
    fn from(e: StripeError) -> Self {
        match e {
            StripeError::InvalidWebhook(_) => AppError::BadRequest(e.to_string()),
            other => AppError::External(other.to_string()),
        }
    }
}

/// Hex HMAC-SHA256 of `{timestamp}.{payload}`, as Stripe signs webhooks.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

impl StripeClient {
    pub fn new(api_key: String, webhook_secret: String, currency: String) -> Self {
        Self {
            api_key,
            webhook_secret,
            currency,
            client: reqwest::Client::new(),
            base_url: "https://api.stripe.com/v1".to_string(),
        }
    }

    pub fn from_config(config: &StripeConfig) -> Self {
        Self::new(
            config.secret_key.clone(),
            config.webhook_secret.clone(),
            config.currency.clone(),
        )
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// One-off payment for a single line item.
    pub async fn create_checkout_session(
        &self,
        params: CreateCheckoutSessionParams,
    ) -> Result<StripeCheckoutSession, StripeError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), params.success_url),
            ("cancel_url".to_string(), params.cancel_url),
            (
                "line_items[0][price_data][currency]".to_string(),
                params.currency,
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                params.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                params.name,
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
        ];

        for (key, value) in params.metadata {
            form.push((format!("metadata[{key}]"), value));
        }

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await
            .map_err(|e| StripeError::NetworkError(e.to_string()))?;

        self.handle_response(response).await
    }

    pub fn verify_webhook_signature(&self, payload: &str, signature: &str) -> Result<StripeWebhookEvent, StripeError> {
        self.verify_webhook_signature_at(payload, signature, chrono::Utc::now().timestamp())
    }

    pub fn verify_webhook_signature_at(
        &self,
        payload: &str,
        signature: &str,
        now: i64,
    ) -> Result<StripeWebhookEvent, StripeError> {
        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in signature.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| StripeError::InvalidWebhook("Missing timestamp".to_string()))?;
        if candidates.is_empty() {
            return Err(StripeError::InvalidWebhook("Missing signature".to_string()));
        }
        let timestamp_i64: i64 = timestamp
            .parse()
            .map_err(|_| StripeError::InvalidWebhook("Invalid timestamp".to_string()))?;

        let expected_sig = sign_payload(&self.webhook_secret, timestamp_i64, payload)
            .ok_or_else(|| StripeError::InvalidWebhook("Invalid webhook secret".to_string()))?;
        if !candidates
            .iter()
            .any(|candidate| constant_time_compare(&expected_sig, candidate))
        {
            return Err(StripeError::InvalidWebhook("Signature mismatch".to_string()));
        }

        if (now - timestamp_i64).abs() > WEBHOOK_TOLERANCE_SECS {
            return Err(StripeError::InvalidWebhook("Timestamp too old".to_string()));
        }

        serde_json::from_str(payload).map_err(|e| StripeError::ParseError(e.to_string()))
    }

    pub fn parse_webhook_event(&self, event: &StripeWebhookEvent) -> Result<WebhookEventType, StripeError> {
        match event.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                let session: StripeCheckoutSession = serde_json::from_value(event.data.object.clone())
                    .map_err(|e| StripeError::ParseError(e.to_string()))?;
                Ok(WebhookEventType::CheckoutCompleted(session))
            }
            "checkout.session.expired" => {
                let session: StripeCheckoutSession = serde_json::from_value(event.data.object.clone())
                    .map_err(|e| StripeError::ParseError(e.to_string()))?;
                Ok(WebhookEventType::CheckoutExpired(session))
            }
            _ => Ok(WebhookEventType::Unknown(event.event_type.clone())),
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, StripeError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StripeError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            #[derive(Deserialize)]
            struct StripeApiError {
                error: StripeApiErrorDetail,
            }

            #[derive(Deserialize)]
            struct StripeApiErrorDetail {
                message: String,
            }

            if let Ok(error) = serde_json::from_str::<StripeApiError>(&body) {
                return Err(StripeError::ApiError(error.error.message));
            }

            return Err(StripeError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        serde_json::from_str(&body).map_err(|e| StripeError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn client() -> StripeClient {
        StripeClient::new("sk_test_123".into(), SECRET.into(), "usd".into())
    }

    fn completed_payload() -> String {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "created": 1_700_000_000,
            "data": { "object": {
                "id": "cs_test_1",
                "url": null,
                "status": "complete",
                "payment_status": "paid",
                "amount_total": 125000,
                "currency": "usd",
                "metadata": { "sale_id": "abc" }
            }}
        })
        .to_string()
    }

    #[test]
    fn test_valid_signature() {
        let payload = completed_payload();
        let ts = 1_700_000_100;
        let sig = sign_payload(SECRET, ts, &payload).unwrap();
        let header = format!("t={ts},v1=deadbeef,v1={sig}");

        let event = client()
            .verify_webhook_signature_at(&payload, &header, ts + 10)
            .unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");

        match client().parse_webhook_event(&event).unwrap() {
            WebhookEventType::CheckoutCompleted(session) => {
                assert_eq!(session.id, "cs_test_1");
                assert!(session.is_paid());
                assert_eq!(session.metadata.get("sale_id").map(String::as_str), Some("abc"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_rejected_signatures() {
        let payload = completed_payload();
        let ts = 1_700_000_100;
        let sig = sign_payload(SECRET, ts, &payload).unwrap();
        let c = client();

        let stale = c.verify_webhook_signature_at(&payload, &format!("t={ts},v1={sig}"), ts + 301);
        assert_eq!(stale.unwrap_err(), StripeError::InvalidWebhook("Timestamp too old".into()));

        let tampered = c.verify_webhook_signature_at(
            &payload.replace("125000", "1"),
            &format!("t={ts},v1={sig}"),
            ts,
        );
        assert_eq!(tampered.unwrap_err(), StripeError::InvalidWebhook("Signature mismatch".into()));

        assert!(c.verify_webhook_signature_at(&payload, &format!("v1={sig}"), ts).is_err());
        assert!(c.verify_webhook_signature_at(&payload, &format!("t={ts}"), ts).is_err());
    }

    #[test]
    fn test_unknown_event_passes_through() {
        let event = StripeWebhookEvent {
            id: "evt_2".into(),
            event_type: "charge.refunded".into(),
            data: StripeWebhookData {
                object: serde_json::json!({}),
            },
            created: 0,
        };
        assert!(matches!(
            client().parse_webhook_event(&event).unwrap(),
            WebhookEventType::Unknown(t) if t == "charge.refunded"
        ));
    }
}
