//! Shop instructions: a tree of rich-text pages.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::instructions;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{advisory_key, advisory_xact_lock, LOCK_INSTRUCTIONS};
use crate::core::shared::{AppError, AppResult};
use crate::core::urls::ApiUrls;
use crate::security::validation::{Validate, ValidationResult, Validator};
use crate::web::EmployeeUser;

pub mod tree;

use tree::{build_tree, creates_cycle, place, subtree, InstructionNode};

const MAX_RICH_TEXT: usize = 200_000;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = instructions)]
pub struct Instruction {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub parent_id: Option<Uuid>,
    pub position: i32,
    pub rich_text: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInstructionRequest {
    pub title: String,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub rich_text: String,
}

impl Validate for CreateInstructionRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .name(&self.title, "title", 255)
            .length(&self.rich_text, "rich_text", None, Some(MAX_RICH_TEXT))
            .result()
    }
}

#[derive(Debug, Deserialize, AsChangeset)]
#[diesel(table_name = instructions)]
pub struct UpdateInstructionRequest {
    pub title: Option<String>,
    pub rich_text: Option<String>,
}

impl Validate for UpdateInstructionRequest {
    fn validate(&self) -> ValidationResult {
        let mut v = Validator::new();
        if let Some(title) = &self.title {
            v = v.name(title, "title", 255);
        }
        v.optional_length(self.rich_text.as_deref(), "rich_text", MAX_RICH_TEXT)
            .result()
    }
}

#[derive(Debug, Deserialize)]
pub struct MoveInstructionRequest {
    pub parent_id: Option<Uuid>,
    pub position: i32,
}

impl Validate for MoveInstructionRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .range(self.position, "position", Some(0), None)
            .result()
    }
}

fn find_instruction(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Instruction> {
    instructions::table
        .find(id)
        .filter(instructions::company_id.eq(company_id))
        .filter(instructions::is_deleted.eq(false))
        .select(Instruction::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Instruction".to_string()))
}

fn ensure_parent(conn: &mut PgConnection, company_id: Uuid, parent_id: Option<Uuid>) -> AppResult<()> {
    if let Some(parent_id) = parent_id {
        find_instruction(conn, company_id, parent_id)
            .map_err(|_| AppError::field("parent_id", "does not exist"))?;
    }
    Ok(())
}

fn siblings(
    conn: &mut PgConnection,
    company_id: Uuid,
    parent_id: Option<Uuid>,
) -> QueryResult<Vec<Uuid>> {
    let mut q = instructions::table
        .filter(instructions::company_id.eq(company_id))
        .filter(instructions::is_deleted.eq(false))
        .select(instructions::id)
        .into_boxed();
    q = match parent_id {
        Some(parent) => q.filter(instructions::parent_id.eq(parent)),
        None => q.filter(instructions::parent_id.is_null()),
    };
    q.order((instructions::position.asc(), instructions::created_at.asc()))
        .load(conn)
}

fn write_siblings(conn: &mut PgConnection, parent_id: Option<Uuid>, ids: &[Uuid]) -> QueryResult<()> {
    let now = Utc::now();
    for (position, id) in ids.iter().enumerate() {
        diesel::update(instructions::table.find(*id))
            .set((
                instructions::parent_id.eq(parent_id),
                instructions::position.eq(position as i32),
                instructions::updated_at.eq(now),
            ))
            .execute(conn)?;
    }
    Ok(())
}

/// Serializes tree rewrites within one company.
fn lock_tree(conn: &mut PgConnection, company_id: Uuid) -> QueryResult<()> {
    advisory_xact_lock(conn, advisory_key(LOCK_INSTRUCTIONS, company_id))
}

fn links(conn: &mut PgConnection, company_id: Uuid) -> QueryResult<Vec<(Uuid, Option<Uuid>)>> {
    instructions::table
        .filter(instructions::company_id.eq(company_id))
        .filter(instructions::is_deleted.eq(false))
        .select((instructions::id, instructions::parent_id))
        .load(conn)
}

pub async fn instruction_tree(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
) -> AppResult<Json<Vec<InstructionNode>>> {
    let rows = state
        .run(move |conn| {
            Ok(instructions::table
                .filter(instructions::company_id.eq(user.company_id))
                .filter(instructions::is_deleted.eq(false))
                .select(Instruction::as_select())
                .load(conn)?)
        })
        .await?;
    Ok(Json(build_tree(rows)))
}

pub async fn get_instruction(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Instruction>> {
    let instruction = state
        .run(move |conn| find_instruction(conn, user.company_id, id))
        .await?;
    Ok(Json(instruction))
}

pub async fn create_instruction(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Json(req): Json<CreateInstructionRequest>,
) -> AppResult<(StatusCode, Json<Instruction>)> {
    let req = req.validated()?;
    let instruction = state
        .run(move |conn| {
            conn.transaction(|conn| {
                lock_tree(conn, user.company_id)?;
                ensure_parent(conn, user.company_id, req.parent_id)?;
                let position = siblings(conn, user.company_id, req.parent_id)?.len() as i32;
                let now = Utc::now();
                let instruction = Instruction {
                    id: Uuid::new_v4(),
                    company_id: user.company_id,
                    title: req.title.trim().to_string(),
                    parent_id: req.parent_id,
                    position,
                    rich_text: req.rich_text,
                    is_deleted: false,
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(instructions::table)
                    .values(&instruction)
                    .execute(conn)?;
                Ok::<_, AppError>(instruction)
            })
        })
        .await?;

    info!("Instruction {} created by {}", instruction.id, user.user_id);
    Ok((StatusCode::CREATED, Json(instruction)))
}

pub async fn update_instruction(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateInstructionRequest>,
) -> AppResult<Json<Instruction>> {
    let mut req = req.validated()?;
    req.title = req.title.map(|t| t.trim().to_string());
    let instruction = state
        .run(move |conn| {
            find_instruction(conn, user.company_id, id)?;
            if req.title.is_some() || req.rich_text.is_some() {
                diesel::update(instructions::table.find(id))
                    .set((&req, instructions::updated_at.eq(Utc::now())))
                    .execute(conn)?;
            }
            find_instruction(conn, user.company_id, id)
        })
        .await?;
    Ok(Json(instruction))
}

/// Deletes the page together with everything nested below it.
pub async fn delete_instruction(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let removed = state
        .run(move |conn| {
            conn.transaction(|conn| {
                lock_tree(conn, user.company_id)?;
                let instruction = find_instruction(conn, user.company_id, id)?;
                let doomed = subtree(&links(conn, user.company_id)?, id);
                diesel::update(instructions::table.filter(instructions::id.eq_any(doomed.clone())))
                    .set((
                        instructions::is_deleted.eq(true),
                        instructions::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
                let remaining = siblings(conn, user.company_id, instruction.parent_id)?;
                write_siblings(conn, instruction.parent_id, &remaining)?;
                Ok::<_, AppError>(doomed.len())
            })
        })
        .await?;
    info!("Instruction {} and {} descendants deleted", id, removed.saturating_sub(1));
    Ok(StatusCode::NO_CONTENT)
}

pub async fn move_instruction(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(req): Json<MoveInstructionRequest>,
) -> AppResult<Json<Instruction>> {
    let req = req.validated()?;
    let instruction = state
        .run(move |conn| {
            conn.transaction(|conn| {
                lock_tree(conn, user.company_id)?;
                let current = find_instruction(conn, user.company_id, id)?;
                ensure_parent(conn, user.company_id, req.parent_id)?;
                if creates_cycle(&links(conn, user.company_id)?, id, req.parent_id) {
                    return Err(AppError::Conflict(
                        "An instruction cannot be moved under itself".to_string(),
                    ));
                }

                if current.parent_id != req.parent_id {
                    let mut old = siblings(conn, user.company_id, current.parent_id)?;
                    old.retain(|s| *s != id);
                    write_siblings(conn, current.parent_id, &old)?;
                }
                let target = siblings(conn, user.company_id, req.parent_id)?;
                let ordered = place(target, id, req.position as usize);
                write_siblings(conn, req.parent_id, &ordered)?;

                find_instruction(conn, user.company_id, id)
            })
        })
        .await?;
    Ok(Json(instruction))
}

pub fn configure_instruction_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::INSTRUCTIONS,
            get(instruction_tree).post(create_instruction),
        )
        .route(
            ApiUrls::INSTRUCTION_BY_ID,
            get(get_instruction)
                .put(update_instruction)
                .delete(delete_instruction),
        )
        .route(ApiUrls::INSTRUCTION_MOVE, post(move_instruction))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_title() {
        let req = CreateInstructionRequest {
            title: "   ".to_string(),
            parent_id: None,
            rich_text: String::new(),
        };
        assert!(req.validate().field_errors().contains_key("title"));
    }

    #[test]
    fn test_update_allows_partial() {
        let req = UpdateInstructionRequest {
            title: None,
            rich_text: Some("<p>Seal every seam twice.</p>".to_string()),
        };
        assert!(req.validate().is_valid());

        let req = UpdateInstructionRequest {
            title: Some(String::new()),
            rich_text: None,
        };
        assert!(!req.validate().is_valid());
    }

    #[test]
    fn test_move_rejects_negative_position() {
        let req = MoveInstructionRequest {
            parent_id: None,
            position: -1,
        };
        assert!(req.validate().field_errors().contains_key("position"));

        let req = MoveInstructionRequest {
            parent_id: Some(Uuid::new_v4()),
            position: 0,
        };
        assert!(req.validated().is_ok());
    }
}
