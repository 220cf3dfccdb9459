//! Commission report and payout ledger.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::{payroll_payments, sales, users};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::round_money;
use crate::core::shared::{AppError, AppResult};
use crate::core::urls::ApiUrls;
use crate::sales::STATUS_CANCELLED;
use crate::security::validation::{Validate, ValidationError, ValidationResult, Validator};
use crate::web::AdminUser;

#[derive(Debug, Deserialize)]
pub struct PayrollQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayrollLine {
    pub user_id: Uuid,
    pub name: String,
    pub commission_rate: BigDecimal,
    pub sale_count: i64,
    pub total_sales: BigDecimal,
    pub commission: BigDecimal,
    pub paid: BigDecimal,
    pub balance: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct PayrollReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub lines: Vec<PayrollLine>,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = payroll_payments)]
pub struct PayrollPayment {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub amount: BigDecimal,
    pub paid_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub user_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub amount: BigDecimal,
}

impl Validate for CreatePaymentRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .custom(|| {
                (self.amount <= BigDecimal::from(0)).then(|| ValidationError::InvalidValue {
                    field: "amount".to_string(),
                    message: "must be greater than zero".to_string(),
                })
            })
            .check(check_period(self.period_start, self.period_end, "period_end"))
            .result()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentQuery {
    pub user_id: Option<Uuid>,
}

fn check_period(start: NaiveDate, end: NaiveDate, field: &str) -> Result<(), ValidationError> {
    if end < start {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: "must not be before the start date".to_string(),
        });
    }
    Ok(())
}

/// `[from 00:00, to + 1 day 00:00)` in UTC.
pub fn period_bounds(from: NaiveDate, to: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = from.and_time(NaiveTime::MIN).and_utc();
    let end = to
        .checked_add_days(Days::new(1))
        .unwrap_or(to)
        .and_time(NaiveTime::MIN)
        .and_utc();
    (start, end)
}

pub fn commission(total: &BigDecimal, rate_percent: &BigDecimal) -> BigDecimal {
    round_money(&(total * rate_percent / BigDecimal::from(100)))
}

/// Seller metadata is `(name, commission_rate)`.
pub fn build_report(
    paid_sales: &[(Uuid, BigDecimal)],
    sellers: &HashMap<Uuid, (String, BigDecimal)>,
    payments: &[(Uuid, BigDecimal)],
) -> Vec<PayrollLine> {
    let zero = BigDecimal::from(0);
    let mut totals: BTreeMap<Uuid, (i64, BigDecimal)> = BTreeMap::new();
    for (seller_id, price) in paid_sales {
        let entry = totals.entry(*seller_id).or_insert((0, zero.clone()));
        entry.0 += 1;
        entry.1 += price;
    }
    let mut paid: HashMap<Uuid, BigDecimal> = HashMap::new();
    for (user_id, amount) in payments {
        *paid.entry(*user_id).or_insert_with(|| zero.clone()) += amount;
        totals.entry(*user_id).or_insert((0, zero.clone()));
    }

    let mut lines: Vec<PayrollLine> = totals
        .into_iter()
        .filter_map(|(user_id, (sale_count, total))| {
            let (name, rate) = sellers.get(&user_id)?;
            let commission = commission(&total, rate);
            let paid = round_money(paid.get(&user_id).unwrap_or(&zero));
            Some(PayrollLine {
                user_id,
                name: name.clone(),
                commission_rate: rate.clone(),
                sale_count,
                total_sales: round_money(&total),
                balance: &commission - &paid,
                commission,
                paid,
            })
        })
        .collect();
    lines.sort_by(|a, b| a.name.cmp(&b.name));
    lines
}

pub async fn payroll_report(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
    Query(query): Query<PayrollQuery>,
) -> AppResult<Json<PayrollReport>> {
    check_period(query.from, query.to, "to").map_err(|e| AppError::field("to", e.message()))?;
    let (start, end) = period_bounds(query.from, query.to);
    let (from, to) = (query.from, query.to);

    let lines = state
        .run(move |conn| {
            let paid_sales: Vec<(Uuid, BigDecimal)> = sales::table
                .filter(sales::company_id.eq(user.company_id))
                .filter(sales::status.ne(STATUS_CANCELLED))
                .filter(sales::paid_date.ge(start))
                .filter(sales::paid_date.lt(end))
                .select((sales::seller_id, sales::price))
                .load(conn)?;

            let payments: Vec<(Uuid, BigDecimal)> = payroll_payments::table
                .filter(payroll_payments::company_id.eq(user.company_id))
                .filter(payroll_payments::period_start.le(to))
                .filter(payroll_payments::period_end.ge(from))
                .select((payroll_payments::user_id, payroll_payments::amount))
                .load(conn)?;

            let sellers: HashMap<Uuid, (String, BigDecimal)> = users::table
                .filter(users::company_id.eq(user.company_id))
                .select((users::id, users::name, users::commission_rate))
                .load::<(Uuid, String, BigDecimal)>(conn)?
                .into_iter()
                .map(|(id, name, rate)| (id, (name, rate)))
                .collect();

            Ok(build_report(&paid_sales, &sellers, &payments))
        })
        .await?;

    Ok(Json(PayrollReport { from, to, lines }))
}

pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
    Query(query): Query<PaymentQuery>,
) -> AppResult<Json<Vec<PayrollPayment>>> {
    let rows = state
        .run(move |conn| {
            let mut q = payroll_payments::table
                .filter(payroll_payments::company_id.eq(user.company_id))
                .select(PayrollPayment::as_select())
                .into_boxed();
            if let Some(user_id) = query.user_id {
                q = q.filter(payroll_payments::user_id.eq(user_id));
            }
            Ok(q.order(payroll_payments::period_end.desc()).load(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    AdminUser(user): AdminUser,
    Json(req): Json<CreatePaymentRequest>,
) -> AppResult<(StatusCode, Json<PayrollPayment>)> {
    let req = req.validated()?;
    let payment = PayrollPayment {
        id: Uuid::new_v4(),
        company_id: user.company_id,
        user_id: req.user_id,
        period_start: req.period_start,
        period_end: req.period_end,
        amount: round_money(&req.amount),
        paid_by: user.user_id,
        created_at: Utc::now(),
    };

    let payment = state
        .run(move |conn| {
            let exists: i64 = users::table
                .filter(users::id.eq(payment.user_id))
                .filter(users::company_id.eq(payment.company_id))
                .count()
                .get_result(conn)?;
            if exists == 0 {
                return Err(AppError::field("user_id", "is not a member of this company"));
            }
            diesel::insert_into(payroll_payments::table)
                .values(&payment)
                .execute(conn)?;
            Ok(payment)
        })
        .await?;

    info!(
        "Payroll payment {} of {} to {} recorded by {}",
        payment.id, payment.amount, payment.user_id, user.user_id
    );
    Ok((StatusCode::CREATED, Json(payment)))
}

pub fn configure_payroll_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::PAYROLL, get(payroll_report))
        .route(
            ApiUrls::PAYROLL_PAYMENTS,
            get(list_payments).post(create_payment),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_commission_rounding() {
        assert_eq!(commission(&dec("1234.56"), &dec("7.5")), dec("92.59"));
        assert_eq!(commission(&dec("0"), &dec("10")), dec("0"));
    }

    #[test]
    fn test_period_bounds_are_inclusive_of_last_day() {
        let from = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        let (start, end) = period_bounds(from, to);
        assert_eq!(start.to_rfc3339(), "2025-03-01T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-04-01T00:00:00+00:00");
    }

    #[test]
    fn test_build_report() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let ghost = Uuid::new_v4();
        let sellers = HashMap::from([
            (alice, ("Alice".to_string(), dec("10"))),
            (bob, ("Bob".to_string(), dec("5"))),
        ]);
        let sales = vec![
            (alice, dec("1000.00")),
            (alice, dec("2500.50")),
            (ghost, dec("99.00")),
        ];
        let payments = vec![(alice, dec("100")), (bob, dec("20"))];

        let lines = build_report(&sales, &sellers, &payments);
        assert_eq!(lines.len(), 2);

        let a = &lines[0];
        assert_eq!(a.name, "Alice");
        assert_eq!(a.sale_count, 2);
        assert_eq!(a.total_sales, dec("3500.50"));
        assert_eq!(a.commission, dec("350.05"));
        assert_eq!(a.balance, dec("250.05"));

        let b = &lines[1];
        assert_eq!(b.sale_count, 0);
        assert_eq!(b.commission, dec("0"));
        assert_eq!(b.balance, dec("-20"));
    }

    #[test]
    fn test_payment_validation() {
        let req = CreatePaymentRequest {
            user_id: Uuid::nil(),
            period_start: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            amount: dec("0"),
        };
        let fields = req.validate().field_errors();
        assert!(fields.contains_key("amount"));
        assert!(fields.contains_key("period_end"));
    }
}
