use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::email::templates;
use crate::livestream::mint_token;
use crate::payments::{CreatePaymentIntentParams, PaymentIntent};
use crate::shared::schema::{past_event_access, past_events};
use crate::shared::state::AppState;

pub const KIND_PAST_EVENT_PURCHASE: &str = "past_event_purchase";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = past_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PastEvent {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price_cents: i64,
    pub embed_code: String,
    pub speakers: serde_json::Value,
    pub tags: serde_json::Value,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = past_event_access)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PastEventAccess {
    pub id: Uuid,
    pub past_event_id: Uuid,
    pub token: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub payment_reference: Option<String>,
    pub active: bool,
    pub access_count: i32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Storefront listing entry; the embed code stays server-side until a token
/// validates.
#[derive(Debug, Serialize)]
pub struct PastEventListing {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price_cents: i64,
    pub speakers: serde_json::Value,
    pub tags: serde_json::Value,
}

impl From<PastEvent> for PastEventListing {
    fn from(p: PastEvent) -> Self {
        Self {
            id: p.id,
            title: p.title,
            slug: p.slug,
            description: p.description,
            price_cents: p.price_cents,
            speakers: p.speakers,
            tags: p.tags,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    pub tag: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub buyer_name: String,
    pub buyer_email: String,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub client_secret: String,
    pub amount_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub slug: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_name: Option<String>,
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/past-events", get(list_past_events))
        .route("/api/past-events/validate", post(validate_token))
        .route("/api/past-events/{slug}", get(get_past_event))
        .route("/api/past-events/{slug}/purchase", post(purchase))
}

async fn list_past_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<Vec<PastEventListing>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<PastEvent> = past_events::table
        .filter(past_events::published.eq(true))
        .order(past_events::created_at.desc())
        .limit(query.limit.unwrap_or(50))
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let listings = rows
        .into_iter()
        .filter(|p| match &query.tag {
            Some(tag) => p
                .tags
                .as_array()
                .map(|tags| tags.iter().any(|t| t.as_str() == Some(tag.as_str())))
                .unwrap_or(false),
            None => true,
        })
        .map(PastEventListing::from)
        .collect();
    Ok(Json(listings))
}

async fn get_past_event(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<PastEventListing>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    let past_event = load_by_slug(&mut conn, &slug)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Recording not found".to_string()))?;
    Ok(Json(past_event.into()))
}

async fn purchase(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    let past_event = load_by_slug(&mut conn, &slug)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Recording not found".to_string()))?;
    if !past_event.published || past_event.price_cents <= 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "This recording is not for sale".to_string(),
        ));
    }

    let mut metadata = HashMap::new();
    metadata.insert("kind".to_string(), KIND_PAST_EVENT_PURCHASE.to_string());
    metadata.insert("past_event_slug".to_string(), past_event.slug.clone());
    metadata.insert("buyer_name".to_string(), req.buyer_name);
    metadata.insert("buyer_email".to_string(), req.buyer_email.clone());

    let intent = state
        .payments
        .create_payment_intent(CreatePaymentIntentParams {
            amount_cents: past_event.price_cents,
            currency: state.config.site.currency.clone(),
            receipt_email: Some(req.buyer_email),
            metadata,
        })
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Payment error: {e}")))?;

    let client_secret = intent.client_secret.ok_or_else(|| {
        (
            StatusCode::BAD_GATEWAY,
            "Payment provider returned no client secret".to_string(),
        )
    })?;

    Ok(Json(PurchaseResponse {
        client_secret,
        amount_cents: past_event.price_cents,
    }))
}

async fn validate_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let found: Option<(PastEventAccess, PastEvent)> = past_event_access::table
        .inner_join(past_events::table)
        .filter(past_event_access::token.eq(&req.token))
        .filter(past_events::slug.eq(&req.slug))
        .select((PastEventAccess::as_select(), PastEvent::as_select()))
        .first(&mut conn)
        .optional()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    let Some((access, past_event)) = found else {
        return Ok(Json(denied()));
    };
    if !access.active {
        return Ok(Json(denied()));
    }

    diesel::update(past_event_access::table.filter(past_event_access::id.eq(access.id)))
        .set((
            past_event_access::access_count.eq(past_event_access::access_count + 1),
            past_event_access::last_accessed_at.eq(Some(Utc::now())),
        ))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    Ok(Json(ValidateResponse {
        valid: true,
        title: Some(past_event.title),
        embed_code: Some(past_event.embed_code),
        buyer_name: Some(access.buyer_name),
    }))
}

fn denied() -> ValidateResponse {
    ValidateResponse {
        valid: false,
        title: None,
        embed_code: None,
        buyer_name: None,
    }
}

// ===== Webhook side =====

/// Deterministic access id per provider payment, so a redelivered purchase
/// webhook cannot mint a second token.
pub fn access_id_for_payment(payment_id: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("chapelserver:vod:{payment_id}").as_bytes(),
    )
}

/// Materializes purchase access for a succeeded VOD payment and emails the
/// buyer their link. Mirrors the event-registration materializer.
pub async fn materialize_purchase(state: &AppState, intent: &PaymentIntent) -> Result<(), String> {
    let slug = intent
        .metadata
        .get("past_event_slug")
        .ok_or_else(|| format!("payment {} missing past_event_slug", intent.id))?;
    let buyer_name = intent
        .metadata
        .get("buyer_name")
        .cloned()
        .unwrap_or_else(|| "Friend".to_string());
    let buyer_email = intent
        .metadata
        .get("buyer_email")
        .ok_or_else(|| format!("payment {} missing buyer_email", intent.id))?
        .clone();

    let mut conn = state.conn.get().map_err(|e| format!("DB error: {e}"))?;
    let Some(past_event) = load_by_slug(&mut conn, slug).map_err(|e| format!("Query error: {e}"))?
    else {
        return Err(format!(
            "payment {} references unknown recording '{slug}'",
            intent.id
        ));
    };

    let access = PastEventAccess {
        id: access_id_for_payment(&intent.id),
        past_event_id: past_event.id,
        token: mint_token(),
        buyer_name: buyer_name.clone(),
        buyer_email: buyer_email.clone(),
        payment_reference: Some(intent.id.clone()),
        active: true,
        access_count: 0,
        last_accessed_at: None,
        created_at: Utc::now(),
    };

    let inserted = diesel::insert_into(past_event_access::table)
        .values(&access)
        .on_conflict(past_event_access::id)
        .do_nothing()
        .execute(&mut conn)
        .map_err(|e| format!("Insert error: {e}"))?;
    if inserted == 0 {
        info!(payment = %intent.id, "purchase already materialized, skipping duplicate delivery");
        return Ok(());
    }
    info!(recording = %past_event.slug, buyer = %buyer_email, "past event purchase recorded");

    let watch_url = format!(
        "{}/past-events/{}?token={}",
        state.config.site.base_url.trim_end_matches('/'),
        past_event.slug,
        access.token
    );
    let (subject, html) = templates::past_event_access(&past_event.title, &buyer_name, &watch_url);
    if let Err(e) = state.mailer.send(&buyer_email, &subject, &html).await {
        warn!("failed to send purchase email for {}: {e}", intent.id);
    }

    Ok(())
}

fn load_by_slug(
    conn: &mut PgConnection,
    slug: &str,
) -> Result<Option<PastEvent>, diesel::result::Error> {
    past_events::table
        .filter(past_events::slug.eq(slug))
        .first::<PastEvent>(conn)
        .optional()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_id_is_deterministic_per_payment() {
        assert_eq!(access_id_for_payment("pi_1"), access_id_for_payment("pi_1"));
        assert_ne!(access_id_for_payment("pi_1"), access_id_for_payment("pi_2"));
    }

    #[test]
    fn vod_and_registration_namespaces_do_not_collide() {
        assert_ne!(
            access_id_for_payment("pi_1"),
            crate::registrations::registration_id_for_payment("pi_1")
        );
    }

    #[test]
    fn listing_drops_embed_code() {
        let past_event = PastEvent {
            id: Uuid::new_v4(),
            title: "Easter 2025".to_string(),
            slug: "easter-2025".to_string(),
            description: String::new(),
            price_cents: 1500,
            embed_code: "<iframe src=\"secret\"></iframe>".to_string(),
            speakers: serde_json::json!(["Pastor John"]),
            tags: serde_json::json!(["easter"]),
            published: true,
            created_at: Utc::now(),
        };
        let listing = PastEventListing::from(past_event);
        let json = serde_json::to_string(&listing).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("easter-2025"));
    }
}
