use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::events;
use crate::shared::schema::{events as events_table, livestream_access};
use crate::shared::state::AppState;

const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = livestream_access)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LivestreamAccess {
    pub id: Uuid,
    pub event_id: Uuid,
    pub registration_id: Uuid,
    pub token: String,
    pub attendee_name: String,
    pub attendee_email: String,
    pub active: bool,
    pub access_count: i32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub type NewLivestreamAccess = LivestreamAccess;

/// Opaque credential embedded in the livestream link mailed to the attendee.
pub fn mint_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

pub fn new_access(
    event_id: Uuid,
    registration_id: Uuid,
    attendee_name: &str,
    attendee_email: &str,
    now: DateTime<Utc>,
) -> LivestreamAccess {
    LivestreamAccess {
        id: Uuid::new_v4(),
        event_id,
        registration_id,
        token: mint_token(),
        attendee_name: attendee_name.to_string(),
        attendee_email: attendee_email.to_string(),
        active: true,
        access_count: 0,
        last_accessed_at: None,
        created_at: now,
    }
}

/// A registration gets at most one access record; replays of the issuing
/// webhook hit the unique registration index and insert nothing.
pub fn insert_access(
    conn: &mut PgConnection,
    access: &LivestreamAccess,
) -> Result<usize, diesel::result::Error> {
    diesel::insert_into(livestream_access::table)
        .values(access)
        .on_conflict(livestream_access::registration_id)
        .do_nothing()
        .execute(conn)
}

pub fn watch_url(base_url: &str, event_slug: &str, token: &str) -> String {
    format!(
        "{}/livestream/{}?token={}",
        base_url.trim_end_matches('/'),
        event_slug,
        token
    )
}

/// The gate itself: only an active record grants access. Counter bookkeeping
/// happens strictly after a grant.
pub fn grants_access(access: &LivestreamAccess) -> bool {
    access.active
}

// ===== Validation endpoint =====

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub event_slug: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendee_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Vec<String>>,
}

impl ValidateResponse {
    fn denied() -> Self {
        Self {
            valid: false,
            attendee_name: None,
            event_title: None,
            schedule: None,
        }
    }
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new().route("/api/livestream/validate", post(validate_token))
}

async fn validate_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let found: Option<(LivestreamAccess, String, Uuid)> = livestream_access::table
        .inner_join(events_table::table)
        .filter(livestream_access::token.eq(&req.token))
        .filter(events_table::slug.eq(&req.event_slug))
        .select((
            LivestreamAccess::as_select(),
            events_table::title,
            events_table::id,
        ))
        .first(&mut conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    // Unknown token, wrong event and inactive record all collapse into the
    // same generic denial.
    let Some((access, event_title, event_id)) = found else {
        return Ok(Json(ValidateResponse::denied()));
    };
    if !grants_access(&access) {
        return Ok(Json(ValidateResponse::denied()));
    }

    diesel::update(livestream_access::table.filter(livestream_access::id.eq(access.id)))
        .set((
            livestream_access::access_count.eq(livestream_access::access_count + 1),
            livestream_access::last_accessed_at.eq(Some(Utc::now())),
        ))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    let sessions = events::load_sessions(&mut conn, event_id).unwrap_or_default();
    info!(event = %req.event_slug, viewer = %access.attendee_email, "livestream access granted");

    Ok(Json(ValidateResponse {
        valid: true,
        attendee_name: Some(access.attendee_name),
        event_title: Some(event_title),
        schedule: Some(events::schedule_lines(&sessions)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_are_opaque_and_distinct() {
        let a = mint_token();
        let b = mint_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn inactive_record_is_denied() {
        let mut access = new_access(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Ana",
            "ana@example.com",
            Utc::now(),
        );
        assert!(grants_access(&access));
        access.active = false;
        assert!(!grants_access(&access));
    }

    #[test]
    fn watch_url_embeds_slug_and_token() {
        let url = watch_url("https://chapel.example/", "night-of-worship", "tok123");
        assert_eq!(
            url,
            "https://chapel.example/livestream/night-of-worship?token=tok123"
        );
    }
}
