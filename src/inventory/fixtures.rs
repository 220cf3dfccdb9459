//! Sink and faucet catalogs. Both share one shape: a type row with a price
//! and a pool of individual units that sales draw from.

use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::security::validation::{ValidationError, ValidationResult, Validator};

pub const SINK_KINDS: &[&str] = &["undermount", "drop-in", "farmhouse", "vessel", "bar"];
pub const FAUCET_KINDS: &[&str] = &["kitchen", "bathroom", "bar", "pot-filler"];

pub const MAX_UNITS_PER_REQUEST: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct CreateFixtureRequest {
    pub name: String,
    pub kind: String,
    pub retail_price: Option<BigDecimal>,
    pub cost: Option<BigDecimal>,
    pub supplier_id: Option<Uuid>,
    #[serde(default)]
    pub is_display: bool,
    #[serde(default)]
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFixtureRequest {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub retail_price: Option<BigDecimal>,
    pub cost: Option<BigDecimal>,
    pub supplier_id: Option<Uuid>,
    pub is_display: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AddUnitsRequest {
    pub amount: i64,
}

fn price_check(value: Option<&BigDecimal>, field: &str) -> Result<(), ValidationError> {
    match value {
        Some(v) if *v < BigDecimal::from(0) => Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: "must not be negative".to_string(),
        }),
        _ => Ok(()),
    }
}

impl CreateFixtureRequest {
    pub fn validate_for(&self, kinds: &[&str]) -> ValidationResult {
        Validator::new()
            .name(&self.name, "name", 255)
            .one_of(&self.kind, "kind", kinds)
            .check(price_check(self.retail_price.as_ref(), "retail_price"))
            .check(price_check(self.cost.as_ref(), "cost"))
            .range(self.amount, "amount", Some(0), Some(MAX_UNITS_PER_REQUEST))
            .result()
    }
}

impl UpdateFixtureRequest {
    pub fn validate_for(&self, kinds: &[&str]) -> ValidationResult {
        let mut v = Validator::new()
            .check(price_check(self.retail_price.as_ref(), "retail_price"))
            .check(price_check(self.cost.as_ref(), "cost"));
        if let Some(name) = &self.name {
            v = v.name(name, "name", 255);
        }
        if let Some(kind) = &self.kind {
            v = v.one_of(kind, "kind", kinds);
        }
        v.result()
    }
}

impl AddUnitsRequest {
    pub fn validate(&self) -> ValidationResult {
        Validator::new()
            .range(self.amount, "amount", Some(1), Some(MAX_UNITS_PER_REQUEST))
            .result()
    }
}

macro_rules! fixture_catalog {
    (
        mod $module:ident,
        types: $types:ident,
        units: $units:ident,
        label: $label:literal,
        folder: $folder:literal,
        kinds: $kinds:expr
    ) => {
        pub mod $module {
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
            use serde::Serialize;
            use std::collections::HashMap;
            use std::sync::Arc;
            use uuid::Uuid;

            use super::{AddUnitsRequest, CreateFixtureRequest, UpdateFixtureRequest};
            use crate::core::shared::schema::{$types, $units};
            use crate::core::shared::state::AppState;
            use crate::core::shared::utils::ListQuery;
            use crate::core::shared::{AppError, AppResult};
            use crate::drive::store_image;
            use crate::web::EmployeeUser;

            #[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
            #[diesel(table_name = $types)]
            pub struct FixtureType {
                pub id: Uuid,
                pub company_id: Uuid,
                pub name: String,
                pub kind: String,
                pub url: Option<String>,
                pub retail_price: Option<BigDecimal>,
                pub cost: Option<BigDecimal>,
                pub supplier_id: Option<Uuid>,
                pub is_display: bool,
                pub is_deleted: bool,
                pub created_at: DateTime<Utc>,
                pub updated_at: DateTime<Utc>,
            }

            #[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
            #[diesel(table_name = $units)]
            pub struct Unit {
                pub id: Uuid,
                pub company_id: Uuid,
                pub type_id: Uuid,
                pub sale_id: Option<Uuid>,
                pub price: Option<BigDecimal>,
                pub is_deleted: bool,
                pub created_at: DateTime<Utc>,
            }

            #[derive(Debug, Serialize)]
            pub struct FixtureWithCount {
                #[serde(flatten)]
                pub fixture: FixtureType,
                pub available: i64,
            }

            #[derive(AsChangeset)]
            #[diesel(table_name = $types)]
            struct FixtureChanges {
                name: Option<String>,
                kind: Option<String>,
                retail_price: Option<BigDecimal>,
                cost: Option<BigDecimal>,
                supplier_id: Option<Uuid>,
                is_display: Option<bool>,
                updated_at: DateTime<Utc>,
            }

            pub fn new_units(company_id: Uuid, type_id: Uuid, amount: i64) -> Vec<Unit> {
                let now = Utc::now();
                (0..amount)
                    .map(|_| Unit {
                        id: Uuid::new_v4(),
                        company_id,
                        type_id,
                        sale_id: None,
                        price: None,
                        is_deleted: false,
                        created_at: now,
                    })
                    .collect()
            }

            pub fn find_type(
                conn: &mut PgConnection,
                company_id: Uuid,
                id: Uuid,
            ) -> AppResult<FixtureType> {
                $types::table
                    .find(id)
                    .filter($types::company_id.eq(company_id))
                    .filter($types::is_deleted.eq(false))
                    .select(FixtureType::as_select())
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| AppError::NotFound($label.to_string()))
            }

            fn available_counts(
                conn: &mut PgConnection,
                type_ids: &[Uuid],
            ) -> QueryResult<HashMap<Uuid, i64>> {
                let rows: Vec<(Uuid, i64)> = $units::table
                    .filter($units::type_id.eq_any(type_ids))
                    .filter($units::is_deleted.eq(false))
                    .filter($units::sale_id.is_null())
                    .group_by($units::type_id)
                    .select(($units::type_id, count($units::id)))
                    .load(conn)?;
                Ok(rows.into_iter().collect())
            }

            fn with_counts(
                conn: &mut PgConnection,
                rows: Vec<FixtureType>,
            ) -> QueryResult<Vec<FixtureWithCount>> {
                let ids: Vec<Uuid> = rows.iter().map(|t| t.id).collect();
                let counts = available_counts(conn, &ids)?;
                Ok(rows
                    .into_iter()
                    .map(|fixture| FixtureWithCount {
                        available: counts.get(&fixture.id).copied().unwrap_or(0),
                        fixture,
                    })
                    .collect())
            }

            /// Takes `quantity` available units of a type for a sale. Fails with
            /// 409 when the pool is too small.
            pub fn allocate_units(
                conn: &mut PgConnection,
                company_id: Uuid,
                type_id: Uuid,
                quantity: i64,
                sale_id: Uuid,
            ) -> AppResult<Vec<Uuid>> {
                let fixture = find_type(conn, company_id, type_id)?;
                let ids: Vec<Uuid> = $units::table
                    .filter($units::type_id.eq(type_id))
                    .filter($units::is_deleted.eq(false))
                    .filter($units::sale_id.is_null())
                    .select($units::id)
                    .order($units::created_at.asc())
                    .limit(quantity)
                    .for_update()
                    .skip_locked()
                    .load(conn)?;
                if (ids.len() as i64) < quantity {
                    return Err(AppError::Conflict(format!(
                        "Only {} of {} '{}' available",
                        ids.len(),
                        quantity,
                        fixture.name
                    )));
                }
                diesel::update($units::table.filter($units::id.eq_any(ids.clone())))
                    .set((
                        $units::sale_id.eq(Some(sale_id)),
                        $units::price.eq(fixture.retail_price.clone()),
                    ))
                    .execute(conn)?;
                Ok(ids)
            }

            pub fn release_units(conn: &mut PgConnection, sale_id: Uuid) -> QueryResult<usize> {
                diesel::update($units::table.filter($units::sale_id.eq(sale_id)))
                    .set((
                        $units::sale_id.eq(None::<Uuid>),
                        $units::price.eq(None::<BigDecimal>),
                    ))
                    .execute(conn)
            }

            pub fn units_for_sale(conn: &mut PgConnection, sale_id: Uuid) -> QueryResult<Vec<Unit>> {
                $units::table
                    .filter($units::sale_id.eq(sale_id))
                    .filter($units::is_deleted.eq(false))
                    .select(Unit::as_select())
                    .load(conn)
            }

            pub async fn list_types(
                State(state): State<Arc<AppState>>,
                EmployeeUser(user): EmployeeUser,
                Query(query): Query<ListQuery>,
            ) -> AppResult<Json<Vec<FixtureWithCount>>> {
                let rows = state
                    .run(move |conn| {
                        let mut q = $types::table
                            .filter($types::company_id.eq(user.company_id))
                            .filter($types::is_deleted.eq(false))
                            .select(FixtureType::as_select())
                            .into_boxed();
                        if let Some(pattern) = query.pattern() {
                            q = q.filter($types::name.ilike(pattern));
                        }
                        let rows: Vec<FixtureType> = q
                            .order($types::name.asc())
                            .limit(query.limit())
                            .offset(query.offset())
                            .load(conn)?;
                        Ok(with_counts(conn, rows)?)
                    })
                    .await?;
                Ok(Json(rows))
            }

            pub async fn get_type(
                State(state): State<Arc<AppState>>,
                EmployeeUser(user): EmployeeUser,
                Path(id): Path<Uuid>,
            ) -> AppResult<Json<FixtureWithCount>> {
                let row = state
                    .run(move |conn| {
                        let fixture = find_type(conn, user.company_id, id)?;
                        with_counts(conn, vec![fixture])?
                            .pop()
                            .ok_or_else(|| AppError::NotFound($label.to_string()))
                    })
                    .await?;
                Ok(Json(row))
            }

            pub async fn create_type(
                State(state): State<Arc<AppState>>,
                EmployeeUser(user): EmployeeUser,
                Json(req): Json<CreateFixtureRequest>,
            ) -> AppResult<(StatusCode, Json<FixtureWithCount>)> {
                req.validate_for($kinds).into_result()?;
                let now = Utc::now();
                let fixture = FixtureType {
                    id: Uuid::new_v4(),
                    company_id: user.company_id,
                    name: req.name.trim().to_string(),
                    kind: req.kind,
                    url: None,
                    retail_price: req.retail_price,
                    cost: req.cost,
                    supplier_id: req.supplier_id,
                    is_display: req.is_display,
                    is_deleted: false,
                    created_at: now,
                    updated_at: now,
                };
                let amount = req.amount;

                let row = state
                    .run(move |conn| {
                        conn.transaction(|conn| {
                            diesel::insert_into($types::table)
                                .values(&fixture)
                                .execute(conn)?;
                            let units = new_units(fixture.company_id, fixture.id, amount);
                            diesel::insert_into($units::table)
                                .values(&units)
                                .execute(conn)?;
                            Ok::<_, AppError>(FixtureWithCount {
                                fixture,
                                available: amount,
                            })
                        })
                    })
                    .await?;

                info!("{} {} created with {} units", $label, row.fixture.id, amount);
                Ok((StatusCode::CREATED, Json(row)))
            }

            pub async fn update_type(
                State(state): State<Arc<AppState>>,
                EmployeeUser(user): EmployeeUser,
                Path(id): Path<Uuid>,
                Json(req): Json<UpdateFixtureRequest>,
            ) -> AppResult<Json<FixtureType>> {
                req.validate_for($kinds).into_result()?;
                let changes = FixtureChanges {
                    name: req.name.map(|n| n.trim().to_string()),
                    kind: req.kind,
                    retail_price: req.retail_price,
                    cost: req.cost,
                    supplier_id: req.supplier_id,
                    is_display: req.is_display,
                    updated_at: Utc::now(),
                };
                let fixture = state
                    .run(move |conn| {
                        find_type(conn, user.company_id, id)?;
                        diesel::update($types::table.find(id))
                            .set(&changes)
                            .execute(conn)?;
                        find_type(conn, user.company_id, id)
                    })
                    .await?;
                Ok(Json(fixture))
            }

            /// Soft deletes the type and its unsold units.
            pub async fn delete_type(
                State(state): State<Arc<AppState>>,
                EmployeeUser(user): EmployeeUser,
                Path(id): Path<Uuid>,
            ) -> AppResult<StatusCode> {
                state
                    .run(move |conn| {
                        find_type(conn, user.company_id, id)?;
                        conn.transaction(|conn| {
                            diesel::update($types::table.find(id))
                                .set((
                                    $types::is_deleted.eq(true),
                                    $types::updated_at.eq(Utc::now()),
                                ))
                                .execute(conn)?;
                            diesel::update(
                                $units::table
                                    .filter($units::type_id.eq(id))
                                    .filter($units::sale_id.is_null()),
                            )
                            .set($units::is_deleted.eq(true))
                            .execute(conn)?;
                            Ok::<_, AppError>(())
                        })
                    })
                    .await?;
                info!("{} {} deleted by {}", $label, id, user.user_id);
                Ok(StatusCode::NO_CONTENT)
            }

            pub async fn add_units(
                State(state): State<Arc<AppState>>,
                EmployeeUser(user): EmployeeUser,
                Path(id): Path<Uuid>,
                Json(req): Json<AddUnitsRequest>,
            ) -> AppResult<(StatusCode, Json<FixtureWithCount>)> {
                req.validate().into_result()?;
                let row = state
                    .run(move |conn| {
                        let fixture = find_type(conn, user.company_id, id)?;
                        let units = new_units(user.company_id, id, req.amount);
                        diesel::insert_into($units::table)
                            .values(&units)
                            .execute(conn)?;
                        with_counts(conn, vec![fixture])?
                            .pop()
                            .ok_or_else(|| AppError::NotFound($label.to_string()))
                    })
                    .await?;
                Ok((StatusCode::CREATED, Json(row)))
            }

            /// Removes one available unit. Sold units are never touched.
            pub async fn remove_unit(
                State(state): State<Arc<AppState>>,
                EmployeeUser(user): EmployeeUser,
                Path(id): Path<Uuid>,
            ) -> AppResult<Json<FixtureWithCount>> {
                let row = state
                    .run(move |conn| {
                        let fixture = find_type(conn, user.company_id, id)?;
                        let unit: Option<Uuid> = $units::table
                            .filter($units::type_id.eq(id))
                            .filter($units::is_deleted.eq(false))
                            .filter($units::sale_id.is_null())
                            .select($units::id)
                            .order($units::created_at.desc())
                            .first(conn)
                            .optional()?;
                        let Some(unit) = unit else {
                            return Err(AppError::Conflict(format!(
                                "No available units of '{}' to remove",
                                fixture.name
                            )));
                        };
                        diesel::update($units::table.find(unit))
                            .set($units::is_deleted.eq(true))
                            .execute(conn)?;
                        with_counts(conn, vec![fixture])?
                            .pop()
                            .ok_or_else(|| AppError::NotFound($label.to_string()))
                    })
                    .await?;
                Ok(Json(row))
            }

            pub async fn upload_image(
                State(state): State<Arc<AppState>>,
                EmployeeUser(user): EmployeeUser,
                Path(id): Path<Uuid>,
                multipart: Multipart,
            ) -> AppResult<Json<FixtureType>> {
                let drive = state.drive()?.clone();
                let company_id = user.company_id;
                state
                    .run(move |conn| find_type(conn, company_id, id))
                    .await?;
                let url = store_image(&drive, company_id, $folder, multipart).await?;
                let fixture = state
                    .run(move |conn| {
                        diesel::update($types::table.find(id))
                            .set((
                                $types::url.eq(Some(url)),
                                $types::updated_at.eq(Utc::now()),
                            ))
                            .execute(conn)?;
                        find_type(conn, company_id, id)
                    })
                    .await?;
                Ok(Json(fixture))
            }
        }
    };
}

fixture_catalog!(
    mod sinks,
    types: sink_types,
    units: sinks,
    label: "Sink type",
    folder: "sinks",
    kinds: super::SINK_KINDS
);

fixture_catalog!(
    mod faucets,
    types: faucet_types,
    units: faucets,
    label: "Faucet type",
    folder: "faucets",
    kinds: super::FAUCET_KINDS
);

#[cfg(test)]
mod tests {
    use super::*;

    fn create(kind: &str, amount: i64) -> CreateFixtureRequest {
        CreateFixtureRequest {
            name: "Kraus 32\" Undermount".into(),
            kind: kind.into(),
            retail_price: Some(BigDecimal::from(349)),
            cost: Some(BigDecimal::from(180)),
            supplier_id: None,
            is_display: true,
            amount,
        }
    }

    #[test]
    fn test_create_validates_kind_per_catalog() {
        assert!(create("undermount", 4).validate_for(SINK_KINDS).is_valid());
        let fields = create("undermount", 4).validate_for(FAUCET_KINDS).field_errors();
        assert!(fields.contains_key("kind"));
    }

    #[test]
    fn test_create_rejects_negative_amount_and_price() {
        let mut req = create("vessel", -1);
        req.cost = Some(BigDecimal::from(-5));
        let fields = req.validate_for(SINK_KINDS).field_errors();
        assert!(fields.contains_key("amount"));
        assert!(fields.contains_key("cost"));
    }

    #[test]
    fn test_add_units_requires_positive_amount() {
        assert!(!AddUnitsRequest { amount: 0 }.validate().is_valid());
        assert!(AddUnitsRequest { amount: 3 }.validate().is_valid());
    }

    #[test]
    fn test_new_units_are_unsold() {
        let type_id = Uuid::new_v4();
        let units = sinks::new_units(Uuid::nil(), type_id, 3);
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| u.sale_id.is_none() && u.type_id == type_id));
        assert!(faucets::new_units(Uuid::nil(), type_id, 0).is_empty());
    }
}
