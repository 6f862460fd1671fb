use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::email::templates;
use crate::shared::schema::volunteers;
use crate::shared::state::AppState;

pub const STATUS_NEW: &str = "new";
pub const STATUS_CONTACTED: &str = "contacted";
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";
pub const STATUS_ON_HOLD: &str = "on_hold";

pub const STATUSES: &[&str] = &[
    STATUS_NEW,
    STATUS_CONTACTED,
    STATUS_ACTIVE,
    STATUS_INACTIVE,
    STATUS_ON_HOLD,
];

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = volunteers)]
pub struct Volunteer {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub availability: serde_json::Value,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One ministry area the applicant is willing to serve in, with their stated
/// availability for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityEntry {
    pub ministry_area: String,
    pub days: Vec<String>,
    pub frequency: String,
    pub time_of_day: String,
}

#[derive(Debug, Deserialize)]
pub struct VolunteerIntakeRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub availability: Vec<AvailabilityEntry>,
}

#[derive(Debug, Serialize)]
pub struct VolunteerIntakeResponse {
    pub id: Uuid,
    pub status: String,
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new().route("/api/volunteers", post(intake))
}

async fn intake(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VolunteerIntakeRequest>,
) -> Result<Json<VolunteerIntakeResponse>, (StatusCode, String)> {
    if req.first_name.trim().is_empty() || req.email.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Name and email are required".to_string(),
        ));
    }

    let now = Utc::now();
    let volunteer = Volunteer {
        id: Uuid::new_v4(),
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        email: req.email.trim().to_string(),
        phone: req.phone,
        availability: serde_json::to_value(&req.availability)
            .unwrap_or_else(|_| serde_json::json!([])),
        status: STATUS_NEW.to_string(),
        notes: None,
        created_at: now,
        updated_at: now,
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    diesel::insert_into(volunteers::table)
        .values(&volunteer)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;
    info!(email = %volunteer.email, "volunteer application received");

    let (subject, html) = templates::volunteer_acknowledgement(&volunteer.first_name);
    if let Err(e) = state.mailer.send(&volunteer.email, &subject, &html).await {
        warn!("failed to send volunteer acknowledgement: {e}");
    }

    Ok(Json(VolunteerIntakeResponse {
        id: volunteer.id,
        status: volunteer.status,
    }))
}

pub fn is_valid_status(status: &str) -> bool {
    STATUSES.contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_known_statuses() {
        for status in STATUSES {
            assert!(is_valid_status(status));
        }
        assert!(!is_valid_status("archived"));
    }

    #[test]
    fn availability_round_trips_through_json() {
        let entry = AvailabilityEntry {
            ministry_area: "Worship".to_string(),
            days: vec!["sunday".to_string(), "wednesday".to_string()],
            frequency: "weekly".to_string(),
            time_of_day: "evening".to_string(),
        };
        let value = serde_json::to_value(vec![entry.clone()]).unwrap();
        let parsed: Vec<AvailabilityEntry> = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, vec![entry]);
    }
}
