use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::schema::{event_sessions, events};
use crate::shared::state::AppState;

pub const REGISTRATION_NONE: &str = "none";
pub const REGISTRATION_INTERNAL: &str = "internal";
pub const REGISTRATION_EXTERNAL: &str = "external";
pub const REGISTRATION_HYBRID: &str = "hybrid";

pub const ATTENDANCE_IN_PERSON: &str = "in_person";
pub const ATTENDANCE_ONLINE: &str = "online";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = events)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub location: String,
    pub category: String,
    pub registration_type: String,
    pub price_cents: i64,
    pub online_price_cents: i64,
    pub capacity: Option<i32>,
    pub external_registration_url: Option<String>,
    pub promo_code: Option<String>,
    pub promo_discount_percent: Option<i32>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = event_sessions)]
pub struct EventSession {
    pub id: Uuid,
    pub event_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub sessions: Vec<EventSession>,
    pub schedule: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    pub category: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PromoRequest {
    pub code: String,
    #[serde(default)]
    pub attendance: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PromoOutcome {
    pub valid: bool,
    pub discount_percent: i32,
    pub final_price_cents: i64,
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/events", get(list_events))
        .route("/api/events/{slug}", get(get_event))
        .route("/api/events/{slug}/promo", post(validate_promo))
}

// ===== Handlers =====

async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<Vec<EventDetail>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    // Listed events are either still upcoming (some session has not ended)
    // or have no schedule at all.
    let has_future_session = diesel::dsl::exists(
        event_sessions::table
            .filter(event_sessions::event_id.eq(events::id))
            .filter(event_sessions::ends_at.gt(Utc::now())),
    );
    let has_any_session = diesel::dsl::exists(
        event_sessions::table.filter(event_sessions::event_id.eq(events::id)),
    );
    let mut q = events::table
        .filter(events::published.eq(true))
        .filter(has_future_session.or(diesel::dsl::not(has_any_session)))
        .into_boxed();
    if let Some(category) = query.category {
        q = q.filter(events::category.eq(category));
    }

    let rows: Vec<Event> = q
        .order(events::created_at.desc())
        .limit(query.limit.unwrap_or(50))
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let mut out = Vec::with_capacity(rows.len());
    for event in rows {
        let sessions = load_sessions(&mut conn, event.id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
        let schedule = schedule_lines(&sessions);
        out.push(EventDetail {
            event,
            sessions,
            schedule,
        });
    }
    Ok(Json(out))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<EventDetail>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let event = load_event_by_slug(&mut conn, &slug)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Event not found".to_string()))?;

    let sessions = load_sessions(&mut conn, event.id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    let schedule = schedule_lines(&sessions);
    Ok(Json(EventDetail {
        event,
        sessions,
        schedule,
    }))
}

async fn validate_promo(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<PromoRequest>,
) -> Result<Json<PromoOutcome>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let event = load_event_by_slug(&mut conn, &slug)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Event not found".to_string()))?;

    let attendance = req.attendance.as_deref().unwrap_or(ATTENDANCE_IN_PERSON);
    let price = price_for_attendance(&event, attendance);
    Ok(Json(apply_promo(
        price,
        event.promo_code.as_deref(),
        event.promo_discount_percent,
        &req.code,
    )))
}

// ===== Helpers =====

pub fn load_event_by_slug(
    conn: &mut PgConnection,
    slug: &str,
) -> Result<Option<Event>, diesel::result::Error> {
    events::table
        .filter(events::slug.eq(slug))
        .first::<Event>(conn)
        .optional()
}

pub fn load_sessions(
    conn: &mut PgConnection,
    event_id: Uuid,
) -> Result<Vec<EventSession>, diesel::result::Error> {
    event_sessions::table
        .filter(event_sessions::event_id.eq(event_id))
        .order(event_sessions::starts_at.asc())
        .load(conn)
}

pub fn price_for_attendance(event: &Event, attendance: &str) -> i64 {
    if attendance == ATTENDANCE_ONLINE {
        event.online_price_cents
    } else {
        event.price_cents
    }
}

/// Recomputes the price for a submitted promo code. Codes match case
/// insensitively against the event's configured code; nothing is persisted
/// about redemption.
pub fn apply_promo(
    price_cents: i64,
    configured_code: Option<&str>,
    discount_percent: Option<i32>,
    submitted_code: &str,
) -> PromoOutcome {
    let matched = configured_code
        .map(|c| !c.is_empty() && c.eq_ignore_ascii_case(submitted_code.trim()))
        .unwrap_or(false);
    let percent = discount_percent.unwrap_or(0).clamp(0, 100);
    if !matched || percent == 0 {
        return PromoOutcome {
            valid: false,
            discount_percent: 0,
            final_price_cents: price_cents,
        };
    }
    let discounted = price_cents - price_cents * i64::from(percent) / 100;
    PromoOutcome {
        valid: true,
        discount_percent: percent,
        final_price_cents: discounted,
    }
}

/// Display strings for an event schedule, one per session.
pub fn schedule_lines(sessions: &[EventSession]) -> Vec<String> {
    sessions
        .iter()
        .map(|s| format_session(s.starts_at, s.ends_at))
        .collect()
}

pub fn format_session(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> String {
    if starts_at.date_naive() == ends_at.date_naive() {
        format!(
            "{} · {} – {}",
            starts_at.format("%a, %b %-d"),
            starts_at.format("%-I:%M %p"),
            ends_at.format("%-I:%M %p"),
        )
    } else {
        format!(
            "{} – {}",
            starts_at.format("%a, %b %-d %-I:%M %p"),
            ends_at.format("%a, %b %-d %-I:%M %p"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn matching_promo_code_discounts_price() {
        let outcome = apply_promo(10_000, Some("EASTER25"), Some(25), "easter25");
        assert_eq!(
            outcome,
            PromoOutcome {
                valid: true,
                discount_percent: 25,
                final_price_cents: 7_500,
            }
        );
    }

    #[test]
    fn mismatched_code_leaves_price_unchanged() {
        let outcome = apply_promo(10_000, Some("EASTER25"), Some(25), "christmas");
        assert!(!outcome.valid);
        assert_eq!(outcome.final_price_cents, 10_000);
    }

    #[test]
    fn event_without_promo_config_reports_invalid() {
        let outcome = apply_promo(5_000, None, None, "anything");
        assert!(!outcome.valid);
        assert_eq!(outcome.final_price_cents, 5_000);
    }

    #[test]
    fn zero_percent_discount_is_invalid() {
        let outcome = apply_promo(5_000, Some("FREE"), Some(0), "FREE");
        assert!(!outcome.valid);
        assert_eq!(outcome.final_price_cents, 5_000);
    }

    #[test]
    fn discount_truncates_toward_attendee() {
        // 33% off 999 cents leaves 670 (integer division keeps cents whole)
        let outcome = apply_promo(999, Some("X"), Some(33), "X");
        assert_eq!(outcome.final_price_cents, 670);
    }

    #[test]
    fn same_day_session_formats_compactly() {
        let start = Utc.with_ymd_and_hms(2026, 3, 6, 19, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 6, 21, 0, 0).unwrap();
        assert_eq!(format_session(start, end), "Fri, Mar 6 · 7:00 PM – 9:00 PM");
    }

    #[test]
    fn overnight_session_shows_both_dates() {
        let start = Utc.with_ymd_and_hms(2026, 3, 6, 22, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 7, 1, 0, 0).unwrap();
        let line = format_session(start, end);
        assert!(line.contains("Mar 6"));
        assert!(line.contains("Mar 7"));
    }

    #[test]
    fn online_attendance_uses_online_price() {
        let event = Event {
            id: Uuid::new_v4(),
            title: "Conf".to_string(),
            slug: "conf".to_string(),
            description: String::new(),
            location: String::new(),
            category: "conference".to_string(),
            registration_type: REGISTRATION_HYBRID.to_string(),
            price_cents: 5_000,
            online_price_cents: 2_000,
            capacity: None,
            external_registration_url: None,
            promo_code: None,
            promo_discount_percent: None,
            published: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(price_for_attendance(&event, ATTENDANCE_ONLINE), 2_000);
        assert_eq!(price_for_attendance(&event, ATTENDANCE_IN_PERSON), 5_000);
    }
}
