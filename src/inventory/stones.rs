use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::dsl::count;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::{slab_inventory, stones, suppliers};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{search_pattern, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::core::shared::{AppError, AppResult};
use crate::drive::store_image;
use crate::security::validation::{Validate, ValidationError, ValidationResult, Validator};
use crate::web::EmployeeUser;

pub const STONE_TYPES: &[&str] = &[
    "granite",
    "quartz",
    "marble",
    "dolomite",
    "quartzite",
    "porcelain",
    "soapstone",
];

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = stones)]
pub struct Stone {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub stone_type: String,
    pub supplier_id: Option<Uuid>,
    pub url: Option<String>,
    pub width: Option<f64>,
    pub length: Option<f64>,
    pub cost_per_sqft: Option<BigDecimal>,
    pub retail_price: Option<BigDecimal>,
    pub is_display: bool,
    pub on_sale: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StoneWithCounts {
    #[serde(flatten)]
    pub stone: Stone,
    pub available: i64,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateStoneRequest {
    pub name: String,
    pub stone_type: String,
    pub supplier_id: Option<Uuid>,
    pub width: Option<f64>,
    pub length: Option<f64>,
    pub cost_per_sqft: Option<BigDecimal>,
    pub retail_price: Option<BigDecimal>,
    #[serde(default = "default_true")]
    pub is_display: bool,
    #[serde(default)]
    pub on_sale: bool,
}

fn default_true() -> bool {
    true
}

fn non_negative(value: Option<&BigDecimal>, field: &str) -> Result<(), ValidationError> {
    match value {
        Some(v) if *v < BigDecimal::from(0) => Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: "must not be negative".to_string(),
        }),
        _ => Ok(()),
    }
}

fn optional_dimension(v: Validator, value: Option<f64>, field: &str) -> Validator {
    match value {
        Some(x) => v.positive(x, field),
        None => v,
    }
}

impl Validate for CreateStoneRequest {
    fn validate(&self) -> ValidationResult {
        let v = Validator::new()
            .name(&self.name, "name", 255)
            .one_of(&self.stone_type, "stone_type", STONE_TYPES)
            .check(non_negative(self.cost_per_sqft.as_ref(), "cost_per_sqft"))
            .check(non_negative(self.retail_price.as_ref(), "retail_price"));
        let v = optional_dimension(v, self.width, "width");
        optional_dimension(v, self.length, "length").result()
    }
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = stones)]
pub struct UpdateStoneRequest {
    pub name: Option<String>,
    pub stone_type: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub width: Option<f64>,
    pub length: Option<f64>,
    pub cost_per_sqft: Option<BigDecimal>,
    pub retail_price: Option<BigDecimal>,
    pub is_display: Option<bool>,
    pub on_sale: Option<bool>,
}

impl Validate for UpdateStoneRequest {
    fn validate(&self) -> ValidationResult {
        let mut v = Validator::new()
            .check(non_negative(self.cost_per_sqft.as_ref(), "cost_per_sqft"))
            .check(non_negative(self.retail_price.as_ref(), "retail_price"));
        if let Some(name) = &self.name {
            v = v.name(name, "name", 255);
        }
        if let Some(stone_type) = &self.stone_type {
            v = v.one_of(stone_type, "stone_type", STONE_TYPES);
        }
        let v = optional_dimension(v, self.width, "width");
        optional_dimension(v, self.length, "length").result()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StoneQuery {
    pub search: Option<String>,
    pub stone_type: Option<String>,
    pub supplier_id: Option<Uuid>,
    #[serde(default)]
    pub show_sold_out: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn find_stone(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Stone> {
    stones::table
        .find(id)
        .filter(stones::company_id.eq(company_id))
        .filter(stones::is_deleted.eq(false))
        .select(Stone::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Stone".to_string()))
}

fn ensure_supplier(conn: &mut PgConnection, company_id: Uuid, supplier_id: Option<Uuid>) -> AppResult<()> {
    let Some(supplier_id) = supplier_id else {
        return Ok(());
    };
    let found: i64 = suppliers::table
        .filter(suppliers::id.eq(supplier_id))
        .filter(suppliers::company_id.eq(company_id))
        .filter(suppliers::is_deleted.eq(false))
        .count()
        .get_result(conn)?;
    if found == 0 {
        return Err(AppError::field("supplier_id", "does not exist"));
    }
    Ok(())
}

/// (available, total) slab counts per stone; cut parents are not counted.
fn slab_counts(conn: &mut PgConnection, stone_ids: &[Uuid]) -> QueryResult<HashMap<Uuid, (i64, i64)>> {
    let base = slab_inventory::table
        .filter(slab_inventory::stone_id.eq_any(stone_ids))
        .filter(slab_inventory::is_deleted.eq(false))
        .filter(slab_inventory::is_cut.eq(false));

    let totals: Vec<(Uuid, i64)> = base
        .clone()
        .group_by(slab_inventory::stone_id)
        .select((slab_inventory::stone_id, count(slab_inventory::id)))
        .load(conn)?;

    let available: Vec<(Uuid, i64)> = base
        .filter(slab_inventory::sale_id.is_null())
        .group_by(slab_inventory::stone_id)
        .select((slab_inventory::stone_id, count(slab_inventory::id)))
        .load(conn)?;

    let mut counts: HashMap<Uuid, (i64, i64)> = totals
        .into_iter()
        .map(|(id, total)| (id, (0, total)))
        .collect();
    for (id, n) in available {
        counts.entry(id).or_insert((0, 0)).0 = n;
    }
    Ok(counts)
}

fn with_counts(conn: &mut PgConnection, rows: Vec<Stone>) -> QueryResult<Vec<StoneWithCounts>> {
    let ids: Vec<Uuid> = rows.iter().map(|s| s.id).collect();
    let counts = slab_counts(conn, &ids)?;
    Ok(rows
        .into_iter()
        .map(|stone| {
            let (available, total) = counts.get(&stone.id).copied().unwrap_or((0, 0));
            StoneWithCounts {
                stone,
                available,
                total,
            }
        })
        .collect())
}

pub async fn list_stones(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Query(query): Query<StoneQuery>,
) -> AppResult<Json<Vec<StoneWithCounts>>> {
    let rows = state
        .run(move |conn| {
            let mut q = stones::table
                .filter(stones::company_id.eq(user.company_id))
                .filter(stones::is_deleted.eq(false))
                .select(Stone::as_select())
                .into_boxed();

            if let Some(pattern) = search_pattern(query.search.as_deref()) {
                q = q.filter(stones::name.ilike(pattern));
            }
            if let Some(stone_type) = query.stone_type.filter(|t| !t.is_empty()) {
                q = q.filter(stones::stone_type.eq(stone_type));
            }
            if let Some(supplier_id) = query.supplier_id {
                q = q.filter(stones::supplier_id.eq(supplier_id));
            }
            if !query.show_sold_out {
                let live_slabs = slab_inventory::table
                    .filter(slab_inventory::company_id.eq(user.company_id))
                    .filter(slab_inventory::is_deleted.eq(false))
                    .filter(slab_inventory::is_cut.eq(false));
                let with_available = live_slabs
                    .clone()
                    .filter(slab_inventory::sale_id.is_null())
                    .select(slab_inventory::stone_id);
                let with_any = live_slabs.select(slab_inventory::stone_id);
                q = q.filter(
                    stones::id
                        .eq_any(with_available)
                        .or(stones::id.ne_all(with_any)),
                );
            }

            let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
            let offset = query.offset.unwrap_or(0).max(0);
            let rows: Vec<Stone> = q
                .order(stones::name.asc())
                .limit(limit)
                .offset(offset)
                .load(conn)?;
            Ok(with_counts(conn, rows)?)
        })
        .await?;

    Ok(Json(rows))
}

pub async fn get_stone(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<StoneWithCounts>> {
    let stone = state
        .run(move |conn| {
            let stone = find_stone(conn, user.company_id, id)?;
            let mut rows = with_counts(conn, vec![stone])?;
            rows.pop()
                .ok_or_else(|| AppError::NotFound("Stone".to_string()))
        })
        .await?;
    Ok(Json(stone))
}

pub async fn create_stone(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Json(req): Json<CreateStoneRequest>,
) -> AppResult<(StatusCode, Json<Stone>)> {
    let req = req.validated()?;
    let now = Utc::now();
    let stone = Stone {
        id: Uuid::new_v4(),
        company_id: user.company_id,
        name: req.name.trim().to_string(),
        stone_type: req.stone_type,
        supplier_id: req.supplier_id,
        url: None,
        width: req.width,
        length: req.length,
        cost_per_sqft: req.cost_per_sqft,
        retail_price: req.retail_price,
        is_display: req.is_display,
        on_sale: req.on_sale,
        is_deleted: false,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };

    let stone = state
        .run(move |conn| {
            ensure_supplier(conn, stone.company_id, stone.supplier_id)?;
            diesel::insert_into(stones::table)
                .values(&stone)
                .execute(conn)?;
            Ok(stone)
        })
        .await?;

    info!("Stone {} '{}' created", stone.id, stone.name);
    Ok((StatusCode::CREATED, Json(stone)))
}

pub async fn update_stone(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStoneRequest>,
) -> AppResult<Json<Stone>> {
    let req = req.validated()?;
    let stone = state
        .run(move |conn| {
            find_stone(conn, user.company_id, id)?;
            ensure_supplier(conn, user.company_id, req.supplier_id)?;
            diesel::update(stones::table.find(id))
                .set((&req, stones::updated_at.eq(Utc::now())))
                .execute(conn)?;
            find_stone(conn, user.company_id, id)
        })
        .await?;
    Ok(Json(stone))
}

pub async fn delete_stone(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .run(move |conn| {
            find_stone(conn, user.company_id, id)?;
            let now = Utc::now();
            conn.transaction(|conn| {
                diesel::update(stones::table.find(id))
                    .set((
                        stones::is_deleted.eq(true),
                        stones::deleted_at.eq(now),
                        stones::updated_at.eq(now),
                    ))
                    .execute(conn)?;
                diesel::update(
                    slab_inventory::table
                        .filter(slab_inventory::stone_id.eq(id))
                        .filter(slab_inventory::sale_id.is_null())
                        .filter(slab_inventory::is_deleted.eq(false)),
                )
                .set((
                    slab_inventory::is_deleted.eq(true),
                    slab_inventory::deleted_at.eq(now),
                ))
                .execute(conn)?;
                Ok::<_, AppError>(())
            })
        })
        .await?;

    info!("Stone {} deleted by {}", id, user.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_stone_image(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<Stone>> {
    let drive = state.drive()?.clone();
    let company_id = user.company_id;
    state
        .run(move |conn| find_stone(conn, company_id, id))
        .await?;

    let url = store_image(&drive, company_id, "stones", multipart).await?;

    let stone = state
        .run(move |conn| {
            diesel::update(stones::table.find(id))
                .set((stones::url.eq(Some(url)), stones::updated_at.eq(Utc::now())))
                .execute(conn)?;
            find_stone(conn, company_id, id)
        })
        .await?;
    Ok(Json(stone))
}
