use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::config::QboConfig;
use crate::core::shared::AppError;

const AUTHORIZE_URL: &str = "https://appcenter.intuit.com/connect/oauth2";
const TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
const SCOPE: &str = "com.intuit.quickbooks.accounting";
const MINOR_VERSION: &str = "65";

/// Item used on invoice lines; `1` is the stock "Services" item every QBO
/// company starts with.
pub const DEFAULT_ITEM_REF: &str = "1";

#[derive(Debug, Clone)]
pub struct QboClient {
    config: QboConfig,
    client: reqwest::Client,
    authorize_url: String,
    token_url: String,
    api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QboTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds.
    pub expires_in: i64,
    /// Seconds.
    pub x_refresh_token_expires_in: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmailAddr {
    #[serde(rename = "Address")]
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhoneNumber {
    #[serde(rename = "FreeFormNumber")]
    pub free_form_number: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PhysicalAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct QboCustomer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_email_addr: Option<EmailAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_phone: Option<PhoneNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_addr: Option<PhysicalAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SalesItemLineDetail {
    pub item_ref: Reference,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceLine {
    pub amount: f64,
    pub detail_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sales_item_line_detail: SalesItemLineDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct QboInvoice {
    pub customer_ref: Reference,
    pub line: Vec<InvoiceLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn_date: Option<NaiveDate>,
}

impl QboInvoice {
    /// One service line for the whole sale amount.
    pub fn single_line(
        customer_qbo_id: &str,
        amount: &BigDecimal,
        description: String,
        date: NaiveDate,
    ) -> Self {
        Self {
            customer_ref: Reference {
                value: customer_qbo_id.to_string(),
            },
            line: vec![InvoiceLine {
                amount: amount.round(2).to_string().parse().unwrap_or_default(),
                detail_type: "SalesItemLineDetail".to_string(),
                description: Some(description),
                sales_item_line_detail: SalesItemLineDetail {
                    item_ref: Reference {
                        value: DEFAULT_ITEM_REF.to_string(),
                    },
                },
            }],
            txn_date: Some(date),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CreatedInvoice {
    pub id: String,
    #[serde(default)]
    pub doc_number: Option<String>,
    #[serde(default)]
    pub total_amt: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CompanyInfo {
    pub company_name: String,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Deserialize)]
struct CustomerEnvelope {
    #[serde(rename = "Customer")]
    customer: QboCustomer,
}

#[derive(Deserialize)]
struct InvoiceEnvelope {
    #[serde(rename = "Invoice")]
    invoice: CreatedInvoice,
}

#[derive(Deserialize)]
struct CompanyInfoEnvelope {
    #[serde(rename = "CompanyInfo")]
    company_info: CompanyInfo,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QboError {
    #[error("QuickBooks API error: {0}")]
    Api(String),
    #[error("QuickBooks rejected the access token")]
    Unauthorized,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<QboError> for AppError {
    fn from(e: QboError) -> Self {
        match e {
            QboError::Unauthorized => {
                AppError::Conflict("QuickBooks authorization expired, reconnect".to_string())
            }
            other => AppError::External(other.to_string()),
        }
    }
}

impl QboClient {
    pub fn new(config: QboConfig) -> Self {
        let api_base = config.environment.api_base().to_string();
        Self {
            config,
            client: reqwest::Client::new(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            api_base,
        }
    }

    /// Points the client at other hosts, e.g. a local mock server.
    pub fn with_base_urls(mut self, authorize_url: &str, token_url: &str, api_base: &str) -> Self {
        self.authorize_url = authorize_url.to_string();
        self.token_url = token_url.to_string();
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn authorize_url(&self, state: &str) -> String {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", SCOPE),
            ("state", state),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.authorize_url, query)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<QboTokenResponse, QboError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        self.token_request(&form).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<QboTokenResponse, QboError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&form).await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<QboTokenResponse, QboError> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| QboError::Network(e.to_string()))?;
        self.handle_response(response).await
    }

    fn company_url(&self, realm_id: &str, path: &str) -> String {
        format!(
            "{}/v3/company/{}/{}?minorversion={}",
            self.api_base,
            urlencoding::encode(realm_id),
            path,
            MINOR_VERSION
        )
    }

    pub async fn create_customer(
        &self,
        realm_id: &str,
        access_token: &str,
        customer: &QboCustomer,
    ) -> Result<QboCustomer, QboError> {
        let response = self
            .client
            .post(self.company_url(realm_id, "customer"))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(customer)
            .send()
            .await
            .map_err(|e| QboError::Network(e.to_string()))?;
        let envelope: CustomerEnvelope = self.handle_response(response).await?;
        Ok(envelope.customer)
    }

    pub async fn create_invoice(
        &self,
        realm_id: &str,
        access_token: &str,
        invoice: &QboInvoice,
    ) -> Result<CreatedInvoice, QboError> {
        let response = self
            .client
            .post(self.company_url(realm_id, "invoice"))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(invoice)
            .send()
            .await
            .map_err(|e| QboError::Network(e.to_string()))?;
        let envelope: InvoiceEnvelope = self.handle_response(response).await?;
        Ok(envelope.invoice)
    }

    pub async fn company_info(&self, realm_id: &str, access_token: &str) -> Result<CompanyInfo, QboError> {
        let path = format!("companyinfo/{}", urlencoding::encode(realm_id));
        let response = self
            .client
            .get(self.company_url(realm_id, &path))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| QboError::Network(e.to_string()))?;
        let envelope: CompanyInfoEnvelope = self.handle_response(response).await?;
        Ok(envelope.company_info)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, QboError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QboError::Network(e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(QboError::Unauthorized);
        }
        if !status.is_success() {
            let message =
                fault_message(&body).unwrap_or_else(|| format!("HTTP {}: {}", status, body));
            return Err(QboError::Api(message));
        }

        serde_json::from_str(&body).map_err(|e| QboError::Parse(e.to_string()))
    }
}

/// Pulls a readable message out of a `Fault` body or an OAuth error body.
fn fault_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct FaultBody {
        #[serde(rename = "Fault")]
        fault: Fault,
    }

    #[derive(Deserialize)]
    struct Fault {
        #[serde(rename = "Error", default)]
        errors: Vec<FaultError>,
    }

    #[derive(Deserialize)]
    struct FaultError {
        #[serde(rename = "Message")]
        message: String,
        #[serde(rename = "Detail", default)]
        detail: Option<String>,
    }

    #[derive(Deserialize)]
    struct OAuthErrorBody {
        error: String,
    }

    if let Ok(body) = serde_json::from_str::<FaultBody>(body) {
        let first = body.fault.errors.into_iter().next()?;
        return Some(match first.detail {
            Some(detail) => format!("{}: {}", first.message, detail),
            None => first.message,
        });
    }
    serde_json::from_str::<OAuthErrorBody>(body).ok().map(|e| e.error)
}
