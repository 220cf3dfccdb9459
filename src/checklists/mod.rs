//! Post-installation checklists signed by the customer on site.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::contacts::find_customer;
use crate::core::shared::schema::checklists;
use crate::core::shared::state::AppState;
use crate::core::shared::utils::{search_pattern, ListQuery};
use crate::core::shared::{AppError, AppResult};
use crate::core::urls::ApiUrls;
use crate::drive::object_key;
use crate::email::EmailAttachment;
use crate::sales::service::user_names;
use crate::security::validation::{Validate, ValidationResult, Validator};
use crate::web::EmployeeUser;

pub mod pdf;

use pdf::render_checklist;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = checklists)]
pub struct Checklist {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub installer_id: Uuid,
    pub customer_name: String,
    pub installation_address: String,
    pub material_correct: bool,
    pub seams_satisfaction: bool,
    pub appliances_fit: bool,
    pub backsplashes_correct: bool,
    pub edges_correct: bool,
    pub holes_drilled: bool,
    pub cleanup_completed: bool,
    pub comments: Option<String>,
    pub signature: String,
    pub pdf_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChecklistRequest {
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub installation_address: String,
    #[serde(default)]
    pub material_correct: bool,
    #[serde(default)]
    pub seams_satisfaction: bool,
    #[serde(default)]
    pub appliances_fit: bool,
    #[serde(default)]
    pub backsplashes_correct: bool,
    #[serde(default)]
    pub edges_correct: bool,
    #[serde(default)]
    pub holes_drilled: bool,
    #[serde(default)]
    pub cleanup_completed: bool,
    pub comments: Option<String>,
    pub signature: String,
    /// Recipient for the signed PDF. Falls back to the linked customer's email.
    pub email: Option<String>,
}

impl Validate for CreateChecklistRequest {
    fn validate(&self) -> ValidationResult {
        Validator::new()
            .name(&self.customer_name, "customer_name", 255)
            .name(&self.installation_address, "installation_address", 500)
            .name(&self.signature, "signature", 255)
            .optional_length(self.comments.as_deref(), "comments", 5000)
            .optional_email(self.email.as_deref(), "email")
            .result()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChecklistQuery {
    pub customer_id: Option<Uuid>,
    pub installer_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn find_checklist(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<Checklist> {
    checklists::table
        .find(id)
        .filter(checklists::company_id.eq(company_id))
        .select(Checklist::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Checklist".to_string()))
}

fn pdf_file_name(checklist: &Checklist) -> String {
    format!("checklist-{}.pdf", checklist.created_at.format("%Y%m%d"))
}

pub async fn list_checklists(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Query(query): Query<ChecklistQuery>,
) -> AppResult<Json<Vec<Checklist>>> {
    let rows = state
        .run(move |conn| {
            let mut q = checklists::table
                .filter(checklists::company_id.eq(user.company_id))
                .select(Checklist::as_select())
                .into_boxed();
            if let Some(customer_id) = query.customer_id {
                q = q.filter(checklists::customer_id.eq(customer_id));
            }
            if let Some(installer_id) = query.installer_id {
                q = q.filter(checklists::installer_id.eq(installer_id));
            }
            if let Some(pattern) = search_pattern(query.search.as_deref()) {
                q = q.filter(checklists::customer_name.ilike(pattern));
            }
            let page = ListQuery {
                search: None,
                limit: query.limit,
                offset: query.offset,
            };
            Ok(q.order(checklists::created_at.desc())
                .limit(page.limit())
                .offset(page.offset())
                .load(conn)?)
        })
        .await?;
    Ok(Json(rows))
}

pub async fn get_checklist(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Checklist>> {
    let checklist = state
        .run(move |conn| find_checklist(conn, user.company_id, id))
        .await?;
    Ok(Json(checklist))
}

pub async fn create_checklist(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Json(req): Json<CreateChecklistRequest>,
) -> AppResult<(StatusCode, Json<Checklist>)> {
    let req = req.validated()?;
    let customer_id = req.customer_id;

    let (installer_name, customer_email) = state
        .run(move |conn| {
            let customer_email = match customer_id {
                Some(customer_id) => find_customer(conn, user.company_id, customer_id)?.email,
                None => None,
            };
            let installer_name = user_names(conn, &[user.user_id])?
                .remove(&user.user_id)
                .unwrap_or_default();
            Ok((installer_name, customer_email))
        })
        .await?;

    let mut checklist = Checklist {
        id: Uuid::new_v4(),
        company_id: user.company_id,
        customer_id: req.customer_id,
        installer_id: user.user_id,
        customer_name: req.customer_name.trim().to_string(),
        installation_address: req.installation_address.trim().to_string(),
        material_correct: req.material_correct,
        seams_satisfaction: req.seams_satisfaction,
        appliances_fit: req.appliances_fit,
        backsplashes_correct: req.backsplashes_correct,
        edges_correct: req.edges_correct,
        holes_drilled: req.holes_drilled,
        cleanup_completed: req.cleanup_completed,
        comments: req.comments.filter(|c| !c.trim().is_empty()),
        signature: req.signature.trim().to_string(),
        pdf_key: None,
        created_at: Utc::now(),
    };

    let document = render_checklist(&checklist, &installer_name)?;

    if let Some(drive) = state.drive.as_ref() {
        let key = object_key(user.company_id, "checklists", &pdf_file_name(&checklist));
        drive
            .put(&key, Bytes::from(document.clone()), "application/pdf")
            .await?;
        checklist.pdf_key = Some(key);
    }

    let record = checklist.clone();
    state
        .run(move |conn| {
            diesel::insert_into(checklists::table)
                .values(&record)
                .execute(conn)?;
            Ok(())
        })
        .await?;
    info!("Checklist {} signed for {}", checklist.id, checklist.customer_name);

    let recipient = req.email.filter(|e| !e.trim().is_empty()).or(customer_email);
    match (state.mailer.clone(), recipient) {
        (Some(mailer), Some(to)) => {
            let subject = "Your installation checklist".to_string();
            let body = format!(
                "Hello {},\n\nAttached is the signed checklist for the installation at {}.\n",
                checklist.customer_name, checklist.installation_address
            );
            let attachment = EmailAttachment {
                file_name: pdf_file_name(&checklist),
                content_type: "application/pdf".to_string(),
                data: document,
            };
            tokio::spawn(async move {
                if let Err(e) = mailer.send(&to, &subject, body, Some(attachment)).await {
                    warn!("Checklist email not sent: {}", e);
                }
            });
        }
        (None, Some(_)) => info!("SMTP not configured, checklist {} not emailed", checklist.id),
        _ => {}
    }

    Ok((StatusCode::CREATED, Json(checklist)))
}

/// Always rendered from the stored answers, so layout changes apply to old
/// checklists too.
pub async fn checklist_pdf(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let (checklist, installer_name) = state
        .run(move |conn| {
            let checklist = find_checklist(conn, user.company_id, id)?;
            let installer_name = user_names(conn, &[checklist.installer_id])?
                .remove(&checklist.installer_id)
                .unwrap_or_default();
            Ok((checklist, installer_name))
        })
        .await?;

    let document = render_checklist(&checklist, &installer_name)?;
    let disposition = format!("inline; filename=\"{}\"", pdf_file_name(&checklist));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document,
    ))
}

pub fn configure_checklist_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            ApiUrls::CHECKLISTS,
            get(list_checklists).post(create_checklist),
        )
        .route(ApiUrls::CHECKLIST_BY_ID, get(get_checklist))
        .route(ApiUrls::CHECKLIST_PDF, get(checklist_pdf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateChecklistRequest {
        CreateChecklistRequest {
            customer_id: None,
            customer_name: "Dana Ortiz".to_string(),
            installation_address: "12 Quarry Rd".to_string(),
            material_correct: true,
            seams_satisfaction: true,
            appliances_fit: true,
            backsplashes_correct: true,
            edges_correct: true,
            holes_drilled: true,
            cleanup_completed: true,
            comments: None,
            signature: "Dana Ortiz".to_string(),
            email: None,
        }
    }

    #[test]
    fn test_signature_required() {
        let mut req = request();
        assert!(req.validate().is_valid());
        req.signature = "  ".to_string();
        assert!(req.validate().field_errors().contains_key("signature"));
    }

    #[test]
    fn test_bad_recipient_rejected() {
        let mut req = request();
        req.email = Some("not-an-email".to_string());
        assert!(req.validate().field_errors().contains_key("email"));
    }

    #[test]
    fn test_unchecked_items_default_false() {
        let req: CreateChecklistRequest = serde_json::from_value(serde_json::json!({
            "customer_name": "A",
            "installation_address": "B",
            "signature": "A"
        }))
        .unwrap();
        assert!(!req.material_correct && !req.cleanup_completed);
    }
}
