use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::contacts::customers::{Customer, CustomerRequest};
use crate::core::shared::schema::sales;
use crate::inventory::fixtures::{faucets, sinks};
use crate::inventory::slabs::Slab;
use crate::security::validation::{Validate, ValidationError, ValidationResult, Validator};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_INSTALLED: &str = "installed";
pub const STATUS_CANCELLED: &str = "cancelled";
pub const SALE_STATUSES: &[&str] = &[STATUS_PENDING, STATUS_INSTALLED, STATUS_CANCELLED];

pub const MAX_UNITS_PER_LINE: i64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = sales)]
pub struct Sale {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub seller_id: Uuid,
    pub sale_date: DateTime<Utc>,
    pub price: BigDecimal,
    pub notes: Option<String>,
    pub square_feet: f64,
    pub status: String,
    pub paid_date: Option<DateTime<Utc>>,
    pub installed_date: Option<DateTime<Utc>>,
    pub cancelled_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    pub fn is_cancelled(&self) -> bool {
        self.status == STATUS_CANCELLED
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureLine {
    pub type_id: Uuid,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    pub customer_id: Option<Uuid>,
    pub customer: Option<CustomerRequest>,
    pub seller_id: Option<Uuid>,
    pub sale_date: Option<DateTime<Utc>>,
    pub price: BigDecimal,
    pub notes: Option<String>,
    pub slabs: Vec<Uuid>,
    #[serde(default)]
    pub sinks: Vec<FixtureLine>,
    #[serde(default)]
    pub faucets: Vec<FixtureLine>,
}

fn check_lines(lines: &[FixtureLine], field: &str) -> Result<(), ValidationError> {
    if lines
        .iter()
        .any(|l| l.count < 1 || l.count > MAX_UNITS_PER_LINE)
    {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("each count must be between 1 and {MAX_UNITS_PER_LINE}"),
        });
    }
    Ok(())
}

pub(crate) fn non_negative_price(price: Option<&BigDecimal>) -> Result<(), ValidationError> {
    match price {
        Some(p) if *p < BigDecimal::from(0) => Err(ValidationError::InvalidValue {
            field: "price".to_string(),
            message: "must not be negative".to_string(),
        }),
        _ => Ok(()),
    }
}

impl Validate for CreateSaleRequest {
    fn validate(&self) -> ValidationResult {
        let unique: HashSet<&Uuid> = self.slabs.iter().collect();
        let mut result = Validator::new()
            .check(non_negative_price(Some(&self.price)))
            .optional_length(self.notes.as_deref(), "notes", 5000)
            .custom(|| {
                self.slabs.is_empty().then(|| ValidationError::InvalidValue {
                    field: "slabs".to_string(),
                    message: "select at least one slab".to_string(),
                })
            })
            .custom(|| {
                (unique.len() != self.slabs.len()).then(|| ValidationError::InvalidValue {
                    field: "slabs".to_string(),
                    message: "contains duplicates".to_string(),
                })
            })
            .custom(|| match (&self.customer_id, &self.customer) {
                (Some(_), Some(_)) | (None, None) => Some(ValidationError::InvalidValue {
                    field: "customer".to_string(),
                    message: "provide either customer_id or a new customer".to_string(),
                }),
                _ => None,
            })
            .check(check_lines(&self.sinks, "sinks"))
            .check(check_lines(&self.faucets, "faucets"))
            .result();

        if let Some(customer) = &self.customer {
            result.merge(customer.validate());
        }
        result
    }
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = sales)]
pub struct UpdateSaleRequest {
    pub price: Option<BigDecimal>,
    pub notes: Option<String>,
    pub seller_id: Option<Uuid>,
    pub sale_date: Option<DateTime<Utc>>,
    pub paid_date: Option<DateTime<Utc>>,
    pub installed_date: Option<DateTime<Utc>>,
}

impl Validate for UpdateSaleRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .check(non_negative_price(self.price.as_ref()))
            .optional_length(self.notes.as_deref(), "notes", 5000)
            .result()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SaleQuery {
    pub status: Option<String>,
    pub seller_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SaleSummary {
    #[serde(flatten)]
    pub sale: Sale,
    pub customer_name: String,
    pub seller_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SoldSlab {
    #[serde(flatten)]
    pub slab: Slab,
    pub stone_name: String,
}

#[derive(Debug, Serialize)]
pub struct SaleDetail {
    #[serde(flatten)]
    pub sale: Sale,
    pub customer: Customer,
    pub seller_name: Option<String>,
    pub slabs: Vec<SoldSlab>,
    pub sinks: Vec<sinks::Unit>,
    pub faucets: Vec<faucets::Unit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn request() -> CreateSaleRequest {
        CreateSaleRequest {
            customer_id: Some(Uuid::new_v4()),
            customer: None,
            seller_id: None,
            sale_date: None,
            price: BigDecimal::from_str("4250.00").unwrap(),
            notes: None,
            slabs: vec![Uuid::new_v4(), Uuid::new_v4()],
            sinks: vec![FixtureLine {
                type_id: Uuid::new_v4(),
                count: 1,
            }],
            faucets: vec![],
        }
    }

    #[test]
    fn test_valid_sale() {
        assert!(request().validate().is_valid());
    }

    #[test]
    fn test_customer_is_exclusive() {
        let mut req = request();
        req.customer = Some(CustomerRequest {
            name: "New Buyer".into(),
            email: None,
            phone: None,
            address: None,
            postal_code: None,
            company_name: None,
            referral_source: None,
            source: None,
        });
        assert!(req.validate().field_errors().contains_key("customer"));

        req.customer_id = None;
        assert!(req.validate().is_valid());
    }

    #[test]
    fn test_rejects_duplicate_slabs_and_bad_counts() {
        let mut req = request();
        let id = Uuid::new_v4();
        req.slabs = vec![id, id];
        req.faucets = vec![FixtureLine {
            type_id: Uuid::new_v4(),
            count: 0,
        }];
        req.price = BigDecimal::from(-10);
        let fields = req.validate().field_errors();
        assert!(fields.contains_key("slabs"));
        assert!(fields.contains_key("faucets"));
        assert!(fields.contains_key("price"));
    }

    #[test]
    fn test_nested_customer_errors_surface() {
        let mut req = request();
        req.customer_id = None;
        req.customer = Some(CustomerRequest {
            name: "".into(),
            email: Some("bad".into()),
            phone: None,
            address: None,
            postal_code: None,
            company_name: None,
            referral_source: None,
            source: None,
        });
        let fields = req.validate().field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
    }
}
