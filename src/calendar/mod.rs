//! Calendar Module
//!
//! Install and measurement scheduling with iCal (RFC 5545) export using the
//! icalendar library.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Days, Utc};
use diesel::prelude::*;
use icalendar::{Calendar, Component, Event as IcalEvent, EventLike, Property};
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::shared::schema::events;
use crate::core::shared::state::AppState;
use crate::core::shared::{AppError, AppResult};
use crate::core::urls::ApiUrls;
use crate::sales::find_sale;
use crate::security::validation::{Validate, ValidationError, ValidationResult, Validator};
use crate::web::users::find_user;
use crate::web::EmployeeUser;

pub const EVENT_STATUSES: &[&str] = &["scheduled", "completed", "cancelled"];

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = events)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub all_day: bool,
    pub color: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_user_id: Uuid,
    pub assigned_user_id: Option<Uuid>,
    pub sale_id: Option<Uuid>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEventInput {
    pub title: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    pub color: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub assigned_user_id: Option<Uuid>,
    pub sale_id: Option<Uuid>,
}

/// The assignee and linked sale must belong to the caller's company.
fn check_references(
    conn: &mut PgConnection,
    company_id: Uuid,
    assigned_user_id: Option<Uuid>,
    sale_id: Option<Uuid>,
) -> AppResult<()> {
    if let Some(assigned) = assigned_user_id {
        find_user(conn, company_id, assigned).map_err(|e| e.missing_reference("assigned_user_id"))?;
    }
    if let Some(sale_id) = sale_id {
        find_sale(conn, company_id, sale_id).map_err(|e| e.missing_reference("sale_id"))?;
    }
    Ok(())
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ValidationError> {
    if end < start {
        return Err(ValidationError::InvalidValue {
            field: "end_date".to_string(),
            message: "must not be before the start date".to_string(),
        });
    }
    Ok(())
}

impl Validate for CalendarEventInput {
    fn validate(&self) -> ValidationResult {
        let mut v = Validator::new()
            .name(&self.title, "title", 255)
            .optional_color(self.color.as_deref(), "color")
            .optional_length(self.description.as_deref(), "description", 5000)
            .optional_length(self.notes.as_deref(), "notes", 5000)
            .check(check_range(self.start_date, self.end_date));
        if let Some(status) = &self.status {
            v = v.one_of(status, "status", EVENT_STATUSES);
        }
        v.result()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EventRangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub assigned_user_id: Option<Uuid>,
}

impl CalendarEvent {
    /// Convert to iCal Event
    pub fn to_ical(&self) -> IcalEvent {
        let mut event = IcalEvent::new();
        event.uid(&self.id.to_string());
        event.summary(&self.title);

        if self.all_day {
            let first = self.start_date.date_naive();
            let last = self.end_date.date_naive();
            event.starts(first);
            event.ends(last.checked_add_days(Days::new(1)).unwrap_or(last));
        } else {
            event.starts(self.start_date);
            event.ends(self.end_date);
        }

        if let Some(ref desc) = self.description {
            event.description(desc);
        }

        let status = match self.status.as_str() {
            "cancelled" => "CANCELLED",
            _ => "CONFIRMED",
        };
        event.add_property("STATUS", status);

        if let Some(ref color) = self.color {
            event.add_property("COLOR", color);
        }

        event.done()
    }

    /// True when the event intersects `[from, to]`.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start_date <= to && self.end_date >= from
    }
}

/// Export events to iCal format
pub fn export_to_ical(events: &[CalendarEvent], calendar_name: &str) -> String {
    let mut calendar = Calendar::new();
    calendar.name(calendar_name);
    calendar.append_property(Property::new("PRODID", "-//Stoneserver//Calendar//EN"));

    for event in events {
        calendar.push(event.to_ical());
    }

    calendar.done().to_string()
}

fn find_event(conn: &mut PgConnection, company_id: Uuid, id: Uuid) -> AppResult<CalendarEvent> {
    events::table
        .find(id)
        .filter(events::company_id.eq(company_id))
        .filter(events::is_deleted.eq(false))
        .select(CalendarEvent::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::NotFound("Event".to_string()))
}

fn load_range(
    conn: &mut PgConnection,
    company_id: Uuid,
    query: &EventRangeQuery,
) -> QueryResult<Vec<CalendarEvent>> {
    let mut q = events::table
        .filter(events::company_id.eq(company_id))
        .filter(events::is_deleted.eq(false))
        .select(CalendarEvent::as_select())
        .into_boxed();
    if let Some(from) = query.from {
        q = q.filter(events::end_date.ge(from));
    }
    if let Some(to) = query.to {
        q = q.filter(events::start_date.le(to));
    }
    if let Some(assigned) = query.assigned_user_id {
        q = q.filter(events::assigned_user_id.eq(assigned));
    }
    q.order(events::start_date.asc()).load(conn)
}

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Query(query): Query<EventRangeQuery>,
) -> AppResult<Json<Vec<CalendarEvent>>> {
    let rows = state
        .run(move |conn| Ok(load_range(conn, user.company_id, &query)?))
        .await?;
    Ok(Json(rows))
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CalendarEvent>> {
    let event = state
        .run(move |conn| find_event(conn, user.company_id, id))
        .await?;
    Ok(Json(event))
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Json(input): Json<CalendarEventInput>,
) -> AppResult<(StatusCode, Json<CalendarEvent>)> {
    let input = input.validated()?;
    let now = Utc::now();
    let event = CalendarEvent {
        id: Uuid::new_v4(),
        company_id: user.company_id,
        title: input.title.trim().to_string(),
        description: input.description,
        start_date: input.start_date,
        end_date: input.end_date,
        all_day: input.all_day,
        color: input.color,
        status: input.status.unwrap_or_else(|| "scheduled".to_string()),
        notes: input.notes,
        created_user_id: user.user_id,
        assigned_user_id: input.assigned_user_id,
        sale_id: input.sale_id,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    let event = state
        .run(move |conn| {
            check_references(conn, event.company_id, event.assigned_user_id, event.sale_id)?;
            diesel::insert_into(events::table)
                .values(&event)
                .execute(conn)?;
            Ok(event)
        })
        .await?;

    info!("Event {} created by {}", event.id, user.user_id);
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn update_event(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
    Json(input): Json<CalendarEventInput>,
) -> AppResult<Json<CalendarEvent>> {
    let input = input.validated()?;
    let event = state
        .run(move |conn| {
            let existing = find_event(conn, user.company_id, id)?;
            check_references(conn, user.company_id, input.assigned_user_id, input.sale_id)?;
            diesel::update(events::table.find(id))
                .set((
                    events::title.eq(input.title.trim()),
                    events::description.eq(input.description),
                    events::start_date.eq(input.start_date),
                    events::end_date.eq(input.end_date),
                    events::all_day.eq(input.all_day),
                    events::color.eq(input.color),
                    events::status.eq(input.status.unwrap_or(existing.status)),
                    events::notes.eq(input.notes),
                    events::assigned_user_id.eq(input.assigned_user_id),
                    events::sale_id.eq(input.sale_id),
                    events::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            find_event(conn, user.company_id, id)
        })
        .await?;
    Ok(Json(event))
}

pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .run(move |conn| {
            find_event(conn, user.company_id, id)?;
            diesel::update(events::table.find(id))
                .set((events::is_deleted.eq(true), events::updated_at.eq(Utc::now())))
                .execute(conn)?;
            Ok(())
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_ical(
    State(state): State<Arc<AppState>>,
    EmployeeUser(user): EmployeeUser,
    Query(query): Query<EventRangeQuery>,
) -> AppResult<impl IntoResponse> {
    let rows = state
        .run(move |conn| Ok(load_range(conn, user.company_id, &query)?))
        .await?;
    let body = export_to_ical(&rows, "Installs");
    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"events.ics\""),
        ],
        body,
    ))
}

pub fn configure_calendar_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::EVENTS, get(list_events).post(create_event))
        .route(ApiUrls::EVENTS_EXPORT, get(export_ical))
        .route(
            ApiUrls::EVENT_BY_ID,
            get(get_event).put(update_event).delete(delete_event),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn event(title: &str, all_day: bool) -> CalendarEvent {
        let start = Utc.with_ymd_and_hms(2025, 5, 12, 14, 0, 0).unwrap();
        CalendarEvent {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            title: title.to_string(),
            description: Some("Template kitchen".to_string()),
            start_date: start,
            end_date: start + Duration::hours(2),
            all_day,
            color: Some("#3b82f6".to_string()),
            status: "scheduled".to_string(),
            notes: None,
            created_user_id: Uuid::nil(),
            assigned_user_id: None,
            sale_id: None,
            is_deleted: false,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_event_to_ical() {
        let ical = event("Measure: Ortiz", false).to_ical();
        assert_eq!(ical.get_summary(), Some("Measure: Ortiz"));
        assert_eq!(ical.get_description(), Some("Template kitchen"));
    }

    #[test]
    fn test_export_ical() {
        let body = export_to_ical(&[event("Install: Park", false), event("Shop closed", true)], "Installs");
        assert!(body.contains("BEGIN:VCALENDAR"));
        assert!(body.contains("Install: Park"));
        assert!(body.contains("DTSTART;VALUE=DATE:20250512"));
        assert!(body.contains("STATUS:CONFIRMED"));
    }

    #[test]
    fn test_overlaps() {
        let e = event("x", false);
        let day = |h| Utc.with_ymd_and_hms(2025, 5, 12, h, 0, 0).unwrap();
        assert!(e.overlaps(day(0), day(14)));
        assert!(e.overlaps(day(15), day(23)));
        assert!(!e.overlaps(day(17), day(23)));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let input = CalendarEventInput {
            title: "Install".into(),
            description: None,
            start_date: Utc.with_ymd_and_hms(2025, 5, 12, 14, 0, 0).unwrap(),
            end_date: Utc.with_ymd_and_hms(2025, 5, 12, 13, 0, 0).unwrap(),
            all_day: false,
            color: Some("blue".into()),
            status: Some("done".into()),
            notes: None,
            assigned_user_id: None,
            sale_id: None,
        };
        let fields = input.validate().field_errors();
        assert!(fields.contains_key("end_date"));
        assert!(fields.contains_key("color"));
        assert!(fields.contains_key("status"));
    }
}
