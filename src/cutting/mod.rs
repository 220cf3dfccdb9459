//! Slab cutting: preview a set of straight cuts and turn a slab into pieces.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::slab_inventory;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::round2;
use crate::core::shared::{AppError, AppResult};
use crate::core::urls::ApiUrls;
use crate::inventory::slabs::{lock_slab, Slab};
use crate::security::validation::{Validate, ValidationError, ValidationResult, Validator};
use crate::web::EmployeeUser;

pub mod geometry;

pub use geometry::{
    cut_rectangle, split_polygon_with_line, split_shapes_with_line, BoundingBox, Point, Polygon,
};

pub const MAX_CUTS: usize = 20;
/// Pieces under one square inch are offcuts and are discarded.
pub const MIN_PIECE_AREA: f64 = 1.0;

#[derive(Debug, Deserialize)]
pub struct CutPreviewRequest {
    pub width: f64,
    pub length: f64,
    pub cuts: Vec<[Point; 2]>,
}

#[derive(Debug, Deserialize)]
pub struct CutSlabRequest {
    pub cuts: Vec<[Point; 2]>,
}

#[derive(Debug, Serialize)]
pub struct Piece {
    pub polygon: Polygon,
    pub square_feet: f64,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Serialize)]
pub struct CutPreview {
    pub pieces: Vec<Piece>,
    pub total_square_feet: f64,
}

fn check_cuts(cuts: &[[Point; 2]]) -> Result<(), ValidationError> {
    if cuts.is_empty() || cuts.len() > MAX_CUTS {
        return Err(ValidationError::InvalidValue {
            field: "cuts".to_string(),
            message: format!("must contain between 1 and {MAX_CUTS} cuts"),
        });
    }
    if cuts.iter().flatten().any(|p| !p.is_finite()) {
        return Err(ValidationError::InvalidValue {
            field: "cuts".to_string(),
            message: "coordinates must be finite numbers".to_string(),
        });
    }
    Ok(())
}

impl Validate for CutPreviewRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .positive(self.width, "width")
            .positive(self.length, "length")
            .check(check_cuts(&self.cuts))
            .result()
    }
}

impl Validate for CutSlabRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new().check(check_cuts(&self.cuts)).result()
    }
}

pub fn pieces_for(width: f64, length: f64, cuts: &[[Point; 2]]) -> Vec<Piece> {
    cut_rectangle(width, length, cuts)
        .into_iter()
        .filter(|p| p.area() >= MIN_PIECE_AREA)
        .filter_map(|polygon| {
            let bounding_box = polygon.bounding_box()?;
            Some(Piece {
                square_feet: round2(polygon.area() / 144.0),
                bounding_box,
                polygon,
            })
        })
        .collect()
}

pub async fn preview_cut(
    _user: EmployeeUser,
    Json(req): Json<CutPreviewRequest>,
) -> AppResult<Json<CutPreview>> {
    let req = req.validated()?;
    let pieces = pieces_for(req.width, req.length, &req.cuts);
    let total_square_feet = round2(pieces.iter().map(|p| p.square_feet).sum());
    Ok(Json(CutPreview {
        pieces,
        total_square_feet,
    }))
}

/// Marks the slab as cut and stores one child slab per piece, sized to the
/// piece's bounding box.
pub async fn cut_slab(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CutSlabRequest>,
) -> AppResult<(StatusCode, Json<Vec<Slab>>)> {
    let req = req.validated()?;
    let company_id = user.company_id;

    let children = state
        .run(move |conn| {
            conn.transaction(|conn| {
                let parent = lock_slab(conn, company_id, id)?;
                if parent.is_sold() {
                    return Err(AppError::Conflict("A sold slab cannot be cut".to_string()));
                }
                if parent.is_cut {
                    return Err(AppError::Conflict("Slab has already been cut".to_string()));
                }

                let pieces = pieces_for(parent.width, parent.length, &req.cuts);
                if pieces.len() < 2 {
                    return Err(AppError::field("cuts", "do not divide the slab"));
                }

                let children: Vec<Slab> = pieces
                    .iter()
                    .map(|piece| {
                        let mut child = Slab::new_for_stone(
                            company_id,
                            parent.stone_id,
                            &parent.bundle,
                            round2(piece.bounding_box.width()),
                            round2(piece.bounding_box.length()),
                            parent.notes.clone(),
                        );
                        child.parent_id = Some(parent.id);
                        child.url = parent.url.clone();
                        child
                    })
                    .collect();

                diesel::update(slab_inventory::table.find(parent.id))
                    .set((
                        slab_inventory::is_cut.eq(true),
                        slab_inventory::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
                diesel::insert_into(slab_inventory::table)
                    .values(&children)
                    .execute(conn)?;
                Ok(children)
            })
        })
        .await?;

    info!("Slab {} cut into {} pieces", id, children.len());
    Ok((StatusCode::CREATED, Json(children)))
}

pub fn configure_cutting_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::CUT_PREVIEW, post(preview_cut))
        .route(ApiUrls::SLAB_CUT, post(cut_slab))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> [Point; 2] {
        [Point::new(x1, y1), Point::new(x2, y2)]
    }

    #[test]
    fn test_pieces_report_square_feet() {
        let pieces = pieces_for(144.0, 24.0, &[line(72.0, 0.0, 72.0, 24.0)]);
        assert_eq!(pieces.len(), 2);
        assert!(pieces.iter().all(|p| p.square_feet == 12.0));
    }

    #[test]
    fn test_slivers_are_dropped() {
        let pieces = pieces_for(100.0, 50.0, &[line(99.99, 0.0, 99.99, 50.0)]);
        assert_eq!(pieces.len(), 1);
    }

    #[test]
    fn test_cut_validation() {
        let empty = CutSlabRequest { cuts: vec![] };
        assert!(empty.validate().field_errors().contains_key("cuts"));

        let nan = CutSlabRequest {
            cuts: vec![line(f64::NAN, 0.0, 1.0, 1.0)],
        };
        assert!(!nan.validate().is_valid());

        let preview = CutPreviewRequest {
            width: 0.0,
            length: 10.0,
            cuts: vec![line(1.0, 0.0, 1.0, 1.0)],
        };
        let fields = preview.validate().field_errors();
        assert!(fields.contains_key("width"));
        assert!(!fields.contains_key("cuts"));
    }

    #[test]
    fn test_cut_request_shape() {
        let req: CutSlabRequest =
            serde_json::from_str(r#"{"cuts":[[{"x":10,"y":0},{"x":10,"y":5}]]}"#).unwrap();
        assert_eq!(req.cuts.len(), 1);
        assert_eq!(req.cuts[0][1], Point::new(10.0, 5.0));
    }
}
