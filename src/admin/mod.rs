use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::registrations::{self, EventRegistration};
use crate::shared::schema::{
    donation_receipts, donor_subscriptions, event_registrations, events, volunteers,
    webhook_events,
};
use crate::shared::state::AppState;
use crate::volunteers::{is_valid_status, Volunteer};
use crate::webhooks::WebhookEventRecord;

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub published_events: i64,
    pub total_registrations: i64,
    pub confirmed_registrations: i64,
    pub checked_in_registrations: i64,
    pub registration_revenue_cents: i64,
    pub donation_total_cents: i64,
    pub active_subscriptions: i64,
    pub new_volunteers: i64,
    pub total_volunteers: i64,
    pub failed_webhooks: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegistrationListQuery {
    pub event_id: Option<Uuid>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRegistrationRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VolunteerListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVolunteerRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookListQuery {
    pub failed_only: Option<bool>,
    pub limit: Option<i64>,
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/stats", get(stats))
        .route("/api/admin/registrations", get(list_registrations))
        .route("/api/admin/registrations/{id}", put(update_registration))
        .route("/api/admin/volunteers", get(list_volunteers))
        .route("/api/admin/volunteers/{id}", put(update_volunteer))
        .route("/api/admin/webhook-events", get(list_webhook_events))
}

async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardStats>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let published_events: i64 = events::table
        .filter(events::published.eq(true))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    let total_registrations: i64 = event_registrations::table
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    let confirmed_registrations: i64 = event_registrations::table
        .filter(event_registrations::status.eq(registrations::STATUS_CONFIRMED))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    let checked_in_registrations: i64 = event_registrations::table
        .filter(event_registrations::status.eq(registrations::STATUS_CHECKED_IN))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    // SUM(bigint) comes back as numeric; coalesce and cast server-side so
    // the result loads as a plain i64.
    let registration_revenue_cents: i64 = event_registrations::table
        .filter(event_registrations::payment_status.eq("paid"))
        .select(diesel::dsl::sql::<diesel::sql_types::BigInt>(
            "COALESCE(SUM(amount_cents), 0)::bigint",
        ))
        .get_result(&mut conn)
        .unwrap_or(0);
    let donation_total_cents: i64 = donation_receipts::table
        .select(diesel::dsl::sql::<diesel::sql_types::BigInt>(
            "COALESCE(SUM(amount_cents), 0)::bigint",
        ))
        .get_result(&mut conn)
        .unwrap_or(0);
    let active_subscriptions: i64 = donor_subscriptions::table
        .filter(donor_subscriptions::status.eq("active"))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    let new_volunteers: i64 = volunteers::table
        .filter(volunteers::status.eq(crate::volunteers::STATUS_NEW))
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    let total_volunteers: i64 = volunteers::table
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);
    let failed_webhooks: i64 = webhook_events::table
        .filter(webhook_events::processing_error.is_not_null())
        .count()
        .get_result(&mut conn)
        .unwrap_or(0);

    Ok(Json(DashboardStats {
        published_events,
        total_registrations,
        confirmed_registrations,
        checked_in_registrations,
        registration_revenue_cents,
        donation_total_cents,
        active_subscriptions,
        new_volunteers,
        total_volunteers,
        failed_webhooks,
    }))
}

async fn list_registrations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegistrationListQuery>,
) -> Result<Json<Vec<EventRegistration>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut q = event_registrations::table.into_boxed();
    if let Some(event_id) = query.event_id {
        q = q.filter(event_registrations::event_id.eq(event_id));
    }
    if let Some(status) = query.status {
        if status != "all" {
            q = q.filter(event_registrations::status.eq(status));
        }
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            event_registrations::attendee_name
                .ilike(pattern.clone())
                .or(event_registrations::attendee_email.ilike(pattern)),
        );
    }

    let rows: Vec<EventRegistration> = q
        .order(event_registrations::created_at.desc())
        .limit(query.limit.unwrap_or(50))
        .offset(query.offset.unwrap_or(0))
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

async fn update_registration(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRegistrationRequest>,
) -> Result<Json<EventRegistration>, (StatusCode, String)> {
    if let Some(status) = &req.status {
        let known = [
            registrations::STATUS_CONFIRMED,
            registrations::STATUS_CANCELLED,
            registrations::STATUS_NO_SHOW,
            registrations::STATUS_CHECKED_IN,
        ];
        if !known.contains(&status.as_str()) {
            return Err((StatusCode::BAD_REQUEST, format!("Unknown status: {status}")));
        }
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    diesel::update(event_registrations::table.filter(event_registrations::id.eq(id)))
        .set(event_registrations::updated_at.eq(Utc::now()))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    if let Some(status) = req.status {
        diesel::update(event_registrations::table.filter(event_registrations::id.eq(id)))
            .set(event_registrations::status.eq(status))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(notes) = req.notes {
        diesel::update(event_registrations::table.filter(event_registrations::id.eq(id)))
            .set(event_registrations::notes.eq(notes))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }

    let row: EventRegistration = event_registrations::table
        .filter(event_registrations::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Registration not found".to_string()))?;
    Ok(Json(row))
}

async fn list_volunteers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VolunteerListQuery>,
) -> Result<Json<Vec<Volunteer>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut q = volunteers::table.into_boxed();
    if let Some(status) = query.status {
        if status != "all" {
            q = q.filter(volunteers::status.eq(status));
        }
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            volunteers::first_name
                .ilike(pattern.clone())
                .or(volunteers::last_name.ilike(pattern.clone()))
                .or(volunteers::email.ilike(pattern)),
        );
    }

    let rows: Vec<Volunteer> = q
        .order(volunteers::created_at.desc())
        .limit(query.limit.unwrap_or(50))
        .offset(query.offset.unwrap_or(0))
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}

async fn update_volunteer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateVolunteerRequest>,
) -> Result<Json<Volunteer>, (StatusCode, String)> {
    if let Some(status) = &req.status {
        if !is_valid_status(status) {
            return Err((StatusCode::BAD_REQUEST, format!("Unknown status: {status}")));
        }
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    diesel::update(volunteers::table.filter(volunteers::id.eq(id)))
        .set(volunteers::updated_at.eq(Utc::now()))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    if let Some(status) = req.status {
        diesel::update(volunteers::table.filter(volunteers::id.eq(id)))
            .set(volunteers::status.eq(status))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(notes) = req.notes {
        diesel::update(volunteers::table.filter(volunteers::id.eq(id)))
            .set(volunteers::notes.eq(notes))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }

    let row: Volunteer = volunteers::table
        .filter(volunteers::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Volunteer not found".to_string()))?;
    Ok(Json(row))
}

/// Recent provider deliveries, the surface an operator checks when a charge
/// succeeded but the matching record never appeared.
async fn list_webhook_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookListQuery>,
) -> Result<Json<Vec<WebhookEventRecord>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut q = webhook_events::table.into_boxed();
    if query.failed_only.unwrap_or(false) {
        q = q.filter(webhook_events::processing_error.is_not_null());
    }

    let rows: Vec<WebhookEventRecord> = q
        .order(webhook_events::created_at.desc())
        .limit(query.limit.unwrap_or(100))
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    Ok(Json(rows))
}
