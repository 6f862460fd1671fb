use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::email::templates;
use crate::shared::schema::contact_messages;
use crate::shared::state::AppState;

pub mod recaptcha;

pub const KIND_CONTACT: &str = "contact";
pub const KIND_MINISTRY_SESSION: &str = "ministry_session";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = contact_messages)]
pub struct ContactMessage {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct MinistrySessionRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub recaptcha_token: String,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub id: Uuid,
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/contact", post(contact_form))
        .route("/api/ministry-sessions", post(ministry_session))
}

async fn contact_form(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContactRequest>,
) -> Result<Json<SubmissionResponse>, (StatusCode, String)> {
    let id = persist_and_notify(
        &state,
        KIND_CONTACT,
        &req.name,
        &req.email,
        req.phone.as_deref(),
        req.subject.as_deref(),
        &req.message,
    )
    .await?;
    Ok(Json(SubmissionResponse { id }))
}

/// Ministry-session requests come from an open form and are captcha-gated
/// before anything is persisted.
async fn ministry_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MinistrySessionRequest>,
) -> Result<Json<SubmissionResponse>, (StatusCode, String)> {
    let human = state
        .recaptcha
        .verify(&req.recaptcha_token)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Captcha verification error: {e}")))?;
    if !human {
        return Err((
            StatusCode::BAD_REQUEST,
            "Captcha verification failed".to_string(),
        ));
    }

    let id = persist_and_notify(
        &state,
        KIND_MINISTRY_SESSION,
        &req.name,
        &req.email,
        req.phone.as_deref(),
        None,
        &req.message,
    )
    .await?;
    Ok(Json(SubmissionResponse { id }))
}

async fn persist_and_notify(
    state: &AppState,
    kind: &str,
    name: &str,
    email: &str,
    phone: Option<&str>,
    subject: Option<&str>,
    message: &str,
) -> Result<Uuid, (StatusCode, String)> {
    if name.trim().is_empty() || email.trim().is_empty() || message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Name, email and message are required".to_string(),
        ));
    }

    let record = ContactMessage {
        id: Uuid::new_v4(),
        kind: kind.to_string(),
        name: name.trim().to_string(),
        email: email.trim().to_string(),
        phone: phone.map(|p| p.to_string()),
        subject: subject.map(|s| s.to_string()),
        message: message.to_string(),
        created_at: Utc::now(),
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    diesel::insert_into(contact_messages::table)
        .values(&record)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;
    info!(kind, from = %record.email, "form submission stored");

    let (mail_subject, html) =
        templates::admin_notification(kind, name, email, phone, subject, message);
    if let Err(e) = state
        .mailer
        .send(&state.config.email.admin_address, &mail_subject, &html)
        .await
    {
        warn!("failed to send {kind} notification email: {e}");
    }

    Ok(record.id)
}
