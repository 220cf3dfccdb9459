use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::contacts::customers::find_customer;
use crate::core::shared::schema::documents;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::sanitize_file_name;
use crate::core::shared::{AppError, AppResult};
use crate::core::urls::ApiUrls;
use crate::drive::{object_key, read_upload, MAX_DOCUMENT_BYTES};
use crate::sales::find_sale;
use crate::security::validation::validate_one_of;
use crate::suppliers::find_supplier;
use crate::web::EmployeeUser;

pub const OWNER_KINDS: &[&str] = &["company", "supplier", "customer", "sale"];

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub company_id: Uuid,
    pub owner_kind: String,
    pub owner_id: Option<Uuid>,
    pub name: String,
    #[serde(skip_serializing)]
    pub storage_key: String,
    pub content_type: String,
    pub size: i64,
    pub uploaded_by: Uuid,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentQuery {
    pub owner_kind: Option<String>,
    pub owner_id: Option<Uuid>,
}

pub fn list_for_owner(
    conn: &mut PgConnection,
    company_id: Uuid,
    owner_kind: Option<&str>,
    owner_id: Option<Uuid>,
) -> QueryResult<Vec<Document>> {
    let mut q = documents::table
        .filter(documents::company_id.eq(company_id))
        .filter(documents::is_deleted.eq(false))
        .select(Document::as_select())
        .into_boxed();
    if let Some(kind) = owner_kind {
        q = q.filter(documents::owner_kind.eq(kind.to_string()));
    }
    if let Some(owner_id) = owner_id {
        q = q.filter(documents::owner_id.eq(owner_id));
    }
    q.order(documents::created_at.desc()).load(conn)
}

fn find_document(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Document> {
    documents::table
        .find(id)
        .filter(documents::company_id.eq(company_id))
        .filter(documents::is_deleted.eq(false))
        .select(Document::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Document".to_string()))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Query(query): Query<DocumentQuery>,
) -> AppResult<Json<Vec<Document>>> {
    let rows = state
        .run(move |conn| {
            Ok(list_for_owner(
                conn,
                user.company_id,
                query.owner_kind.as_deref(),
                query.owner_id,
            )?)
        })
        .await?;
    Ok(Json(rows))
}

/// The owner must be a live row of `kind` in the caller's company.
pub fn check_owner(
    conn: &mut PgConnection,
    company_id: Uuid,
    kind: &str,
    owner_id: Option<Uuid>,
) -> AppResult<()> {
    let Some(owner_id) = owner_id else {
        return Ok(());
    };
    let found = match kind {
        "supplier" => find_supplier(conn, company_id, owner_id).map(|_| ()),
        "customer" => find_customer(conn, company_id, owner_id).map(|_| ()),
        "sale" => find_sale(conn, company_id, owner_id).map(|_| ()),
        _ if owner_id == company_id => Ok(()),
        _ => Err(AppError::NotFound("Company".to_string())),
    };
    found.map_err(|e| e.missing_reference("owner_id"))
}

/// Multipart fields: `file`, `owner_kind` (default `company`), `owner_id`.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Document>)> {
    let drive = state.drive()?.clone();
    let upload = read_upload(multipart, MAX_DOCUMENT_BYTES).await?;

    let owner_kind = upload.field("owner_kind").unwrap_or("company").to_string();
    validate_one_of(&owner_kind, "owner_kind", OWNER_KINDS)
        .map_err(|e| AppError::field("owner_kind", e.message()))?;
    let owner_id = match upload.field("owner_id").filter(|v| !v.is_empty()) {
        Some(raw) => Some(
            Uuid::parse_str(raw).map_err(|_| AppError::field("owner_id", "must be a UUID"))?,
        ),
        None => None,
    };
    if owner_kind != "company" && owner_id.is_none() {
        return Err(AppError::field("owner_id", "is required"));
    }
    let (company_id, kind) = (user.company_id, owner_kind.clone());
    state
        .run(move |conn| check_owner(conn, company_id, &kind, owner_id))
        .await?;

    let key = object_key(user.company_id, &owner_kind, &upload.file_name);
    let size = upload.data.len() as i64;
    drive.put(&key, upload.data, &upload.content_type).await?;

    let document = Document {
        id: Uuid::new_v4(),
        company_id: user.company_id,
        owner_kind,
        owner_id,
        name: sanitize_file_name(&upload.file_name),
        storage_key: key,
        content_type: upload.content_type,
        size,
        uploaded_by: user.user_id,
        is_deleted: false,
        created_at: Utc::now(),
    };

    let document = state
        .run(move |conn| {
            diesel::insert_into(documents::table)
                .values(&document)
                .execute(conn)?;
            Ok(document)
        })
        .await?;

    info!("Document {} uploaded by {}", document.id, user.user_id);
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn download_document(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let drive = state.drive()?.clone();
    let document = state
        .run(move |conn| find_document(conn, user.company_id, id))
        .await?;

    let data = drive.get(&document.storage_key).await?;
    let disposition = format!("attachment; filename=\"{}\"", document.name);

    Ok((
        [
            (header::CONTENT_TYPE, document.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(data),
    )
        .into_response())
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let document = state
        .run(move |conn| {
            let document = find_document(conn, user.company_id, id)?;
            diesel::update(documents::table.find(id))
                .set(documents::is_deleted.eq(true))
                .execute(conn)?;
            Ok(document)
        })
        .await?;

    if let Some(drive) = state.drive.as_ref() {
        if let Err(e) = drive.delete(&document.storage_key).await {
            warn!("Document {} removed but object was kept: {}", id, e);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_document_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::DOCUMENTS, get(list_documents).post(upload_document))
        .route(ApiUrls::DOCUMENT_BY_ID, axum::routing::delete(delete_document))
        .route(ApiUrls::DOCUMENT_DOWNLOAD, get(download_document))
}
