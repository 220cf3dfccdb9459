use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::slab_inventory;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::round2;
use crate::core::shared::{AppError, AppResult};
use crate::drive::store_image;
use crate::inventory::stones::find_stone;
use crate::security::validation::{Validate, ValidationResult, Validator};
use crate::web::EmployeeUser;

pub const MAX_SLABS_PER_REQUEST: i64 = 100;

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = slab_inventory)]
pub struct Slab {
    pub id: Uuid,
    pub company_id: Uuid,
    pub stone_id: Uuid,
    pub bundle: String,
    pub width: f64,
    pub length: f64,
    pub url: Option<String>,
    pub sale_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub is_cut: bool,
    pub notes: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slab {
    pub fn is_sold(&self) -> bool {
        self.sale_id.is_some()
    }

    /// Width and length are inches.
    pub fn square_feet(&self) -> f64 {
        round2(self.width * self.length / 144.0)
    }

    pub fn new_for_stone(
        company_id: Uuid,
        stone_id: Uuid,
        bundle: &str,
        width: f64,
        length: f64,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            company_id,
            stone_id,
            bundle: bundle.trim().to_string(),
            width,
            length,
            url: None,
            sale_id: None,
            parent_id: None,
            is_cut: false,
            notes,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddSlabsRequest {
    pub bundle: String,
    pub width: f64,
    pub length: f64,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub notes: Option<String>,
}

fn default_quantity() -> i64 {
    1
}

impl Validate for AddSlabsRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .name(&self.bundle, "bundle", 100)
            .positive(self.width, "width")
            .positive(self.length, "length")
            .range(self.quantity, "quantity", Some(1), Some(MAX_SLABS_PER_REQUEST))
            .optional_length(self.notes.as_deref(), "notes", 2000)
            .result()
    }
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = slab_inventory)]
pub struct UpdateSlabRequest {
    pub bundle: Option<String>,
    pub width: Option<f64>,
    pub length: Option<f64>,
    pub notes: Option<String>,
}

impl Validate for UpdateSlabRequest {
    fn validate(&self) -> ValidationResult {
        let mut v = Validator::new().optional_length(self.notes.as_deref(), "notes", 2000);
        if let Some(bundle) = &self.bundle {
            v = v.name(bundle, "bundle", 100);
        }
        if let Some(width) = self.width {
            v = v.positive(width, "width");
        }
        if let Some(length) = self.length {
            v = v.positive(length, "length");
        }
        v.result()
    }
}

pub fn find_slab(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Slab> {
    slab_inventory::table
        .find(id)
        .filter(slab_inventory::company_id.eq(company_id))
        .filter(slab_inventory::is_deleted.eq(false))
        .select(Slab::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Slab".to_string()))
}

/// Like `find_slab`, holding a row lock until the transaction ends.
pub fn lock_slab(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Slab> {
    slab_inventory::table
        .find(id)
        .filter(slab_inventory::company_id.eq(company_id))
        .filter(slab_inventory::is_deleted.eq(false))
        .select(Slab::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Slab".to_string()))
}

/// Dimensions are frozen once a slab is cut or sold.
pub fn check_resize(slab: &Slab, req: &UpdateSlabRequest) -> AppResult<()> {
    if req.width.is_none() && req.length.is_none() {
        return Ok(());
    }
    if slab.is_cut {
        return Err(AppError::Conflict(
            "A slab that has been cut cannot be resized".to_string(),
        ));
    }
    if slab.is_sold() {
        return Err(AppError::Conflict(
            "A sold slab cannot be resized".to_string(),
        ));
    }
    Ok(())
}

/// Available slabs first, then by bundle.
pub async fn list_slabs(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(stone_id): Path<Uuid>,
) -> AppResult<Json<Vec<Slab>>> {
    let rows = state
        .run(move |conn| {
            find_stone(conn, user.company_id, stone_id)?;
            Ok(slab_inventory::table
                .filter(slab_inventory::stone_id.eq(stone_id))
                .filter(slab_inventory::is_deleted.eq(false))
                .filter(slab_inventory::is_cut.eq(false))
                .select(Slab::as_select())
                .order((
                    slab_inventory::sale_id.is_null().desc(),
                    slab_inventory::bundle.asc(),
                    slab_inventory::created_at.asc(),
                ))
                .load(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

pub async fn add_slabs(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(stone_id): Path<Uuid>,
    Json(req): Json<AddSlabsRequest>,
) -> AppResult<(StatusCode, Json<Vec<Slab>>)> {
    let req = req.validated()?;
    let company_id = user.company_id;

    let slabs = state
        .run(move |conn| {
            find_stone(conn, company_id, stone_id)?;
            let slabs: Vec<Slab> = (0..req.quantity)
                .map(|_| {
                    Slab::new_for_stone(
                        company_id,
                        stone_id,
                        &req.bundle,
                        req.width,
                        req.length,
                        req.notes.clone(),
                    )
                })
                .collect();
            diesel::insert_into(slab_inventory::table)
                .values(&slabs)
                .execute(conn)?;
            Ok(slabs)
        })
        .await?;

    info!("Added {} slabs to stone {}", slabs.len(), stone_id);
    Ok((StatusCode::CREATED, Json(slabs)))
}

pub async fn get_slab(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Slab>> {
    let slab = state
        .run(move |conn| find_slab(conn, user.company_id, id))
        .await?;
    Ok(Json(slab))
}

pub async fn update_slab(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSlabRequest>,
) -> AppResult<Json<Slab>> {
    let req = req.validated()?;
    let slab = state
        .run(move |conn| {
            conn.transaction(|conn| {
                let slab = lock_slab(conn, user.company_id, id)?;
                check_resize(&slab, &req)?;
                diesel::update(slab_inventory::table.find(id))
                    .set((&req, slab_inventory::updated_at.eq(Utc::now())))
                    .execute(conn)?;
                find_slab(conn, user.company_id, id)
            })
        })
        .await?;
    Ok(Json(slab))
}

pub async fn delete_slab(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .run(move |conn| {
            conn.transaction(|conn| {
                let slab = lock_slab(conn, user.company_id, id)?;
                if slab.is_sold() {
                    return Err(AppError::Conflict(
                        "A sold slab cannot be deleted".to_string(),
                    ));
                }
                let now = Utc::now();
                diesel::update(slab_inventory::table.find(id))
                    .set((
                        slab_inventory::is_deleted.eq(true),
                        slab_inventory::deleted_at.eq(now),
                        slab_inventory::updated_at.eq(now),
                    ))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await?;

    info!("Slab {} deleted by {}", id, user.user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_slab_image(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<Slab>> {
    let drive = state.drive()?.clone();
    let company_id = user.company_id;
    state
        .run(move |conn| find_slab(conn, company_id, id))
        .await?;

    let url = store_image(&drive, company_id, "slabs", multipart).await?;

    let slab = state
        .run(move |conn| {
            diesel::update(slab_inventory::table.find(id))
                .set((
                    slab_inventory::url.eq(Some(url)),
                    slab_inventory::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            find_slab(conn, company_id, id)
        })
        .await?;
    Ok(Json(slab))
}
