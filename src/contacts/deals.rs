use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::contacts::board::{self, BoardError, Column};
use crate::contacts::customers::find_customer;
use crate::core::shared::schema::{customers, deals, deals_list};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{advisory_key, advisory_xact_lock, LOCK_DEAL_BOARD};
use crate::core::shared::{AppError, AppResult};
use crate::security::validation::{Validate, ValidationError, ValidationResult, Validator};
use crate::web::users::find_user;
use crate::web::EmployeeUser;

pub const DEFAULT_LISTS: &[&str] = &[
    "New Customers",
    "Contacted",
    "Got a Quote",
    "Closed Won",
    "Closed Lost",
];

impl From<BoardError> for AppError {
    fn from(e: BoardError) -> Self {
        match e {
            BoardError::CardNotFound => AppError::NotFound("Deal".to_string()),
            BoardError::NotAPermutation => AppError::field("ids", e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = deals_list)]
pub struct DealList {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub position: i32,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = deals)]
pub struct Deal {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub list_id: Uuid,
    pub position: i32,
    pub amount: Option<BigDecimal>,
    pub description: Option<String>,
    pub user_id: Option<Uuid>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DealCard {
    #[serde(flatten)]
    pub deal: Deal,
    pub customer_name: String,
}

#[derive(Debug, Serialize)]
pub struct BoardList {
    #[serde(flatten)]
    pub list: DealList,
    pub deals: Vec<DealCard>,
}

#[derive(Debug, Deserialize)]
pub struct ListNameRequest {
    pub name: String,
}

impl Validate for ListNameRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new().name(&self.name, "name", 100).result()
    }
}

#[derive(Debug, Deserialize)]
pub struct ListOrderRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDealRequest {
    pub customer_id: Uuid,
    pub list_id: Uuid,
    pub amount: Option<BigDecimal>,
    pub description: Option<String>,
    pub user_id: Option<Uuid>,
}

fn non_negative_amount(amount: Option<&BigDecimal>) -> Result<(), ValidationError> {
    match amount {
        Some(a) if *a < BigDecimal::from(0) => Err(ValidationError::InvalidValue {
            field: "amount".to_string(),
            message: "must not be negative".to_string(),
        }),
        _ => Ok(()),
    }
}

impl Validate for CreateDealRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .check(non_negative_amount(self.amount.as_ref()))
            .optional_length(self.description.as_deref(), "description", 5000)
            .result()
    }
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = deals)]
pub struct UpdateDealRequest {
    pub customer_id: Option<Uuid>,
    pub amount: Option<BigDecimal>,
    pub description: Option<String>,
    pub user_id: Option<Uuid>,
}

impl Validate for UpdateDealRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .check(non_negative_amount(self.amount.as_ref()))
            .optional_length(self.description.as_deref(), "description", 5000)
            .result()
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveDealRequest {
    pub list_id: Uuid,
    pub position: i32,
}

impl Validate for MoveDealRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .range(self.position, "position", Some(0), None)
            .result()
    }
}

fn live_lists(conn: &mut PgConnection, company_id: Uuid) -> QueryResult<Vec<DealList>> {
    deals_list::table
        .filter(deals_list::company_id.eq(company_id))
        .filter(deals_list::is_deleted.eq(false))
        .select(DealList::as_select())
        .order((deals_list::position.asc(), deals_list::created_at.asc()))
        .load(conn)
}

/// Serializes list and card renumbering within one company. Must run inside
/// a transaction.
fn lock_board(conn: &mut PgConnection, company_id: Uuid) -> QueryResult<()> {
    advisory_xact_lock(conn, advisory_key(LOCK_DEAL_BOARD, company_id))
}

/// Creates the default pipeline the first time a company opens the board.
/// Live list names are unique per company, so a racing insert is dropped.
pub fn ensure_default_lists(conn: &mut PgConnection, company_id: Uuid) -> AppResult<Vec<DealList>> {
    conn.transaction(|conn| {
        lock_board(conn, company_id)?;
        let ever_created: i64 = deals_list::table
            .filter(deals_list::company_id.eq(company_id))
            .count()
            .get_result(conn)?;
        if ever_created == 0 {
            let inserted = diesel::insert_into(deals_list::table)
                .values(&default_lists(company_id, Utc::now()))
                .on_conflict_do_nothing()
                .execute(conn)?;
            if inserted > 0 {
                info!("Created default deal lists for company {}", company_id);
            }
        }
        Ok(live_lists(conn, company_id)?)
    })
}

fn default_lists(company_id: Uuid, now: DateTime<Utc>) -> Vec<DealList> {
    DEFAULT_LISTS
        .iter()
        .enumerate()
        .map(|(i, name)| DealList {
            id: Uuid::new_v4(),
            company_id,
            name: name.to_string(),
            position: i as i32,
            is_deleted: false,
            created_at: now,
        })
        .collect()
}

fn find_list(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<DealList> {
    deals_list::table
        .find(id)
        .filter(deals_list::company_id.eq(company_id))
        .filter(deals_list::is_deleted.eq(false))
        .select(DealList::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Deal list".to_string()))
}

fn find_deal(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Deal> {
    deals::table
        .find(id)
        .filter(deals::company_id.eq(company_id))
        .filter(deals::is_deleted.eq(false))
        .select(Deal::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Deal".to_string()))
}

fn column(conn: &mut PgConnection, list_id: Uuid) -> QueryResult<Column> {
    let cards = deals::table
        .filter(deals::list_id.eq(list_id))
        .filter(deals::is_deleted.eq(false))
        .select(deals::id)
        .order((deals::position.asc(), deals::created_at.asc()))
        .load(conn)?;
    Ok(Column::new(list_id, cards))
}

fn write_column(conn: &mut PgConnection, column: &Column) -> QueryResult<()> {
    let now = Utc::now();
    for (position, id) in column.cards.iter().enumerate() {
        diesel::update(deals::table.find(*id))
            .set((
                deals::list_id.eq(column.list_id),
                deals::position.eq(position as i32),
                deals::updated_at.eq(now),
            ))
            .execute(conn)?;
    }
    Ok(())
}

/// Inserts a deal at the end of `list_id`.
pub fn append_deal(
    conn: &mut PgConnection,
    company_id: Uuid,
    customer_id: Uuid,
    list_id: Uuid,
    amount: Option<BigDecimal>,
    description: Option<String>,
    user_id: Option<Uuid>,
) -> AppResult<Deal> {
    lock_board(conn, company_id)?;
    let position = column(conn, list_id)?.cards.len() as i32;
    let now = Utc::now();
    let deal = Deal {
        id: Uuid::new_v4(),
        company_id,
        customer_id,
        list_id,
        position,
        amount,
        description,
        user_id,
        is_deleted: false,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(deals::table)
        .values(&deal)
        .execute(conn)?;
    Ok(deal)
}

pub async fn get_board(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
) -> AppResult<Json<Vec<BoardList>>> {
    let board = state
        .run(move |conn| {
            let lists = ensure_default_lists(conn, user.company_id)?;
            let cards: Vec<(Deal, String)> = deals::table
                .inner_join(customers::table)
                .filter(deals::company_id.eq(user.company_id))
                .filter(deals::is_deleted.eq(false))
                .select((Deal::as_select(), customers::name))
                .order((deals::position.asc(), deals::created_at.asc()))
                .load(conn)?;

            let mut board: Vec<BoardList> = lists
                .into_iter()
                .map(|list| BoardList {
                    list,
                    deals: Vec::new(),
                })
                .collect();
            for (deal, customer_name) in cards {
                if let Some(column) = board.iter_mut().find(|b| b.list.id == deal.list_id) {
                    column.deals.push(DealCard {
                        deal,
                        customer_name,
                    });
                }
            }
            Ok(board)
        })
        .await?;
    Ok(Json(board))
}

pub async fn list_deal_lists(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
) -> AppResult<Json<Vec<DealList>>> {
    let lists = state
        .run(move |conn| ensure_default_lists(conn, user.company_id))
        .await?;
    Ok(Json(lists))
}

pub async fn create_deal_list(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Json(req): Json<ListNameRequest>,
) -> AppResult<(StatusCode, Json<DealList>)> {
    let req = req.validated()?;
    let list = state
        .run(move |conn| {
            let existing = ensure_default_lists(conn, user.company_id)?;
            let position = existing.iter().map(|l| l.position + 1).max().unwrap_or(0);
            let list = DealList {
                id: Uuid::new_v4(),
                company_id: user.company_id,
                name: req.name.trim().to_string(),
                position,
                is_deleted: false,
                created_at: Utc::now(),
            };
            diesel::insert_into(deals_list::table)
                .values(&list)
                .execute(conn)?;
            Ok(list)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn rename_deal_list(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ListNameRequest>,
) -> AppResult<Json<DealList>> {
    let req = req.validated()?;
    let list = state
        .run(move |conn| {
            find_list(conn, user.company_id, id)?;
            diesel::update(deals_list::table.find(id))
                .set(deals_list::name.eq(req.name.trim()))
                .execute(conn)?;
            find_list(conn, user.company_id, id)
        })
        .await?;
    Ok(Json(list))
}

pub async fn reorder_deal_lists(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Json(req): Json<ListOrderRequest>,
) -> AppResult<Json<Vec<DealList>>> {
    let lists = state
        .run(move |conn| {
            conn.transaction(|conn| {
                lock_board(conn, user.company_id)?;
                let existing: Vec<Uuid> = live_lists(conn, user.company_id)?
                    .into_iter()
                    .map(|l| l.id)
                    .collect();
                let order = board::reorder(&existing, &req.ids)?;
                for (position, id) in order.iter().enumerate() {
                    diesel::update(deals_list::table.find(*id))
                        .set(deals_list::position.eq(position as i32))
                        .execute(conn)?;
                }
                Ok::<_, AppError>(live_lists(conn, user.company_id)?)
            })
        })
        .await?;
    Ok(Json(lists))
}

pub async fn delete_deal_list(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .run(move |conn| {
            find_list(conn, user.company_id, id)?;
            if !column(conn, id)?.cards.is_empty() {
                return Err(AppError::Conflict(
                    "Move or delete the deals in this list first".to_string(),
                ));
            }
            diesel::update(deals_list::table.find(id))
                .set(deals_list::is_deleted.eq(true))
                .execute(conn)?;
            Ok(())
        })
        .await?;
    info!("Deal list {} deleted by {}", id, user.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_deal(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Json(req): Json<CreateDealRequest>,
) -> AppResult<(StatusCode, Json<Deal>)> {
    let req = req.validated()?;
    let deal = state
        .run(move |conn| {
            find_customer(conn, user.company_id, req.customer_id)?;
            find_list(conn, user.company_id, req.list_id)?;
            if let Some(owner) = req.user_id {
                find_user(conn, user.company_id, owner).map_err(|e| e.missing_reference("user_id"))?;
            }
            conn.transaction(|conn| {
                append_deal(
                    conn,
                    user.company_id,
                    req.customer_id,
                    req.list_id,
                    req.amount,
                    req.description,
                    Some(req.user_id.unwrap_or(user.user_id)),
                )
            })
        })
        .await?;
    info!("Deal {} created by {}", deal.id, user.user_id);
    Ok((StatusCode::CREATED, Json(deal)))
}

pub async fn get_deal(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Deal>> {
    let deal = state
        .run(move |conn| find_deal(conn, user.company_id, id))
        .await?;
    Ok(Json(deal))
}

pub async fn update_deal(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDealRequest>,
) -> AppResult<Json<Deal>> {
    let req = req.validated()?;
    let deal = state
        .run(move |conn| {
            find_deal(conn, user.company_id, id)?;
            if let Some(customer_id) = req.customer_id {
                find_customer(conn, user.company_id, customer_id)?;
            }
            if let Some(owner) = req.user_id {
                find_user(conn, user.company_id, owner).map_err(|e| e.missing_reference("user_id"))?;
            }
            diesel::update(deals::table.find(id))
                .set((&req, deals::updated_at.eq(Utc::now())))
                .execute(conn)?;
            find_deal(conn, user.company_id, id)
        })
        .await?;
    Ok(Json(deal))
}

pub async fn delete_deal(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .run(move |conn| {
            conn.transaction(|conn| {
                lock_board(conn, user.company_id)?;
                let deal = find_deal(conn, user.company_id, id)?;
                let now = Utc::now();
                diesel::update(deals::table.find(id))
                    .set((deals::is_deleted.eq(true), deals::deleted_at.eq(now)))
                    .execute(conn)?;
                let remaining = column(conn, deal.list_id)?;
                write_column(conn, &remaining)?;
                Ok::<_, AppError>(())
            })
        })
        .await?;
    info!("Deal {} deleted by {}", id, user.user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Moves a card and renumbers every touched list in one transaction.
pub async fn move_deal(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveDealRequest>,
) -> AppResult<Json<Deal>> {
    let req = req.validated()?;
    let deal = state
        .run(move |conn| {
            conn.transaction(|conn| {
                lock_board(conn, user.company_id)?;
                let deal = find_deal(conn, user.company_id, id)?;
                find_list(conn, user.company_id, req.list_id)?;

                let source = column(conn, deal.list_id)?;
                let target = if req.list_id == deal.list_id {
                    None
                } else {
                    Some(column(conn, req.list_id)?)
                };
                let changed = board::move_card(source, target, id, req.position as usize)?;
                for column in &changed {
                    write_column(conn, column)?;
                }
                find_deal(conn, user.company_id, id)
            })
        })
        .await?;
    Ok(Json(deal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lists_order() {
        assert_eq!(DEFAULT_LISTS.first(), Some(&"New Customers"));
        assert_eq!(DEFAULT_LISTS.len(), 5);
    }

    #[test]
    fn test_default_lists_have_distinct_names_and_positions() {
        let company = Uuid::new_v4();
        let lists = default_lists(company, Utc::now());
        let names: std::collections::HashSet<&str> =
            lists.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names.len(), DEFAULT_LISTS.len());
        assert!(lists.iter().all(|l| l.company_id == company && !l.is_deleted));
        let positions: Vec<i32> = lists.iter().map(|l| l.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_move_request_rejects_negative_position() {
        let req = MoveDealRequest {
            list_id: Uuid::nil(),
            position: -1,
        };
        assert!(req.validate().field_errors().contains_key("position"));
    }

    #[test]
    fn test_board_error_status() {
        use axum::http::StatusCode;
        assert_eq!(
            AppError::from(BoardError::NotAPermutation).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(BoardError::CardNotFound).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_card_serializes_flat() {
        let now = Utc::now();
        let card = DealCard {
            deal: Deal {
                id: Uuid::nil(),
                company_id: Uuid::nil(),
                customer_id: Uuid::nil(),
                list_id: Uuid::nil(),
                position: 2,
                amount: None,
                description: Some("Kitchen island".into()),
                user_id: None,
                is_deleted: false,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            },
            customer_name: "Ray Ortiz".into(),
        };
        let json = serde_json::to_value(card).unwrap();
        assert_eq!(json["position"], 2);
        assert_eq!(json["customer_name"], "Ray Ortiz");
    }
}
