use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use std::sync::Arc;
use uuid::Uuid;

use super::service::{self, find_sale, load_detail, user_names};
use super::types::{
    CreateSaleRequest, Sale, SaleDetail, SaleQuery, SaleSummary, UpdateSaleRequest,
    SALE_STATUSES,
};
use crate::core::shared::schema::{customers, sales};
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::core::shared::{AppError, AppResult};
use crate::security::validation::{validate_one_of, Validate};
use crate::web::EmployeeUser;

pub async fn list_sales(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Query(query): Query<SaleQuery>,
) -> AppResult<Json<Vec<SaleSummary>>> {
    if let Some(status) = query.status.as_deref() {
        validate_one_of(status, "status", SALE_STATUSES)
            .map_err(|e| AppError::field("status", e.message()))?;
    }

    let rows = state
        .run(move |conn| {
            let mut q = sales::table
                .inner_join(customers::table)
                .filter(sales::company_id.eq(user.company_id))
                .select((Sale::as_select(), customers::name))
                .into_boxed();
            if let Some(status) = query.status {
                q = q.filter(sales::status.eq(status));
            }
            if let Some(seller_id) = query.seller_id {
                q = q.filter(sales::seller_id.eq(seller_id));
            }
            if let Some(customer_id) = query.customer_id {
                q = q.filter(sales::customer_id.eq(customer_id));
            }
            if let Some(from) = query.from {
                q = q.filter(sales::sale_date.ge(from));
            }
            if let Some(to) = query.to {
                q = q.filter(sales::sale_date.le(to));
            }

            let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
            let offset = query.offset.unwrap_or(0).max(0);
            let rows: Vec<(Sale, String)> = q
                .order(sales::sale_date.desc())
                .limit(limit)
                .offset(offset)
                .load(conn)?;

            let seller_ids: Vec<Uuid> = rows.iter().map(|(s, _)| s.seller_id).collect();
            let names = user_names(conn, &seller_ids)?;
            Ok(rows
                .into_iter()
                .map(|(sale, customer_name)| SaleSummary {
                    seller_name: names.get(&sale.seller_id).cloned(),
                    customer_name,
                    sale,
                })
                .collect())
        })
        .await?;
    Ok(Json(rows))
}

pub async fn get_sale(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SaleDetail>> {
    let detail = state
        .run(move |conn| load_detail(conn, user.company_id, id))
        .await?;
    Ok(Json(detail))
}

pub async fn create_sale(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Json(req): Json<CreateSaleRequest>,
) -> AppResult<(StatusCode, Json<SaleDetail>)> {
    let req = req.validated()?;
    let detail = state
        .run(move |conn| {
            let sale = conn.transaction(|conn| {
                service::create_sale(conn, user.company_id, user.user_id, req)
            })?;
            load_detail(conn, user.company_id, sale.id)
        })
        .await?;

    info!(
        "Sale {} created by {} ({} slabs, {} sq ft)",
        detail.sale.id,
        user.user_id,
        detail.slabs.len(),
        detail.sale.square_feet
    );
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn update_sale(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSaleRequest>,
) -> AppResult<Json<Sale>> {
    let mut req = req.validated()?;
    req.price = req.price.map(|p| p.round(2));
    let sale = state
        .run(move |conn| {
            let sale = find_sale(conn, user.company_id, id)?;
            if sale.is_cancelled() {
                return Err(AppError::Conflict("A cancelled sale cannot be edited".to_string()));
            }
            if let Some(seller_id) = req.seller_id {
                service::ensure_seller(conn, user.company_id, seller_id)?;
            }
            diesel::update(sales::table.find(id))
                .set((&req, sales::updated_at.eq(Utc::now())))
                .execute(conn)?;
            find_sale(conn, user.company_id, id)
        })
        .await?;
    Ok(Json(sale))
}

pub async fn cancel_sale(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Sale>> {
    let sale = state
        .run(move |conn| conn.transaction(|conn| service::cancel_sale(conn, user.company_id, id)))
        .await?;
    info!("Sale {} cancelled by {}", id, user.user_id);
    Ok(Json(sale))
}

pub async fn unsell_slab(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path((id, slab_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Sale>> {
    let sale = state
        .run(move |conn| {
            conn.transaction(|conn| service::unsell_slab(conn, user.company_id, id, slab_id))
        })
        .await?;
    info!("Slab {} returned to inventory from sale {}", slab_id, id);
    Ok(Json(sale))
}

pub async fn mark_paid(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Sale>> {
    let sale = state
        .run(move |conn| service::mark_paid(conn, user.company_id, id, Utc::now()))
        .await?;
    Ok(Json(sale))
}

pub async fn mark_installed(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Sale>> {
    let sale = state
        .run(move |conn| service::mark_installed(conn, user.company_id, id))
        .await?;
    Ok(Json(sale))
}
