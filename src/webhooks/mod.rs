use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::donations;
use crate::pastevents;
use crate::payments::{PaymentIntent, ProviderEvent};
use crate::registrations;
use crate::shared::schema::webhook_events;
use crate::shared::state::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = webhook_events)]
pub struct WebhookEventRecord {
    pub id: Uuid,
    pub provider_event_id: String,
    pub event_type: String,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new().route("/api/payments/webhook", post(receive_webhook))
}

/// Single inbound endpoint for provider notifications. Verification happens
/// before anything else; verified events are deduplicated on the provider
/// event id and then dispatched. Downstream failures are recorded on the
/// ledger row but still acked with 200 so the provider does not retry
/// needlessly.
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, (StatusCode, String)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Missing signature header".to_string()))?;

    let event = state
        .payments
        .verify_webhook_signature(&body, signature)
        .map_err(|e| {
            warn!("rejected webhook delivery: {e}");
            (StatusCode::BAD_REQUEST, "Invalid signature".to_string())
        })?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let payload: serde_json::Value =
        serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    let record = WebhookEventRecord {
        id: Uuid::new_v4(),
        provider_event_id: event.id.clone(),
        event_type: event.event_type.clone(),
        processed: false,
        processing_error: None,
        payload,
        created_at: Utc::now(),
    };
    let inserted = diesel::insert_into(webhook_events::table)
        .values(&record)
        .on_conflict(webhook_events::provider_event_id)
        .do_nothing()
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;
    if inserted == 0 {
        info!(event = %event.id, "duplicate webhook delivery acknowledged without processing");
        return Ok(Json(WebhookAck {
            received: true,
            duplicate: true,
        }));
    }
    drop(conn);

    let parsed = match state.payments.parse_event(&event) {
        Ok(parsed) => parsed,
        Err(e) => {
            mark_failed(&state, &event.id, &e.to_string());
            error!("failed to parse webhook {}: {e}", event.id);
            return Ok(Json(WebhookAck {
                received: true,
                duplicate: false,
            }));
        }
    };

    let result = dispatch(&state, parsed).await;
    match result {
        Ok(()) => mark_processed(&state, &event.id),
        Err(e) => {
            error!("webhook {} handler failed: {e}", event.id);
            mark_failed(&state, &event.id, &e);
        }
    }

    Ok(Json(WebhookAck {
        received: true,
        duplicate: false,
    }))
}

async fn dispatch(state: &AppState, event: ProviderEvent) -> Result<(), String> {
    match event {
        ProviderEvent::PaymentSucceeded(intent) => dispatch_payment(state, &intent).await,
        ProviderEvent::InvoicePaid(invoice) => {
            donations::handle_invoice_paid(state, &invoice).await
        }
        ProviderEvent::InvoicePaymentFailed(invoice) => {
            donations::handle_invoice_failed(state, &invoice)
        }
        ProviderEvent::SubscriptionCreated(sub) | ProviderEvent::SubscriptionUpdated(sub) => {
            donations::handle_subscription_updated(state, &sub)
        }
        ProviderEvent::SubscriptionCanceled(sub) => {
            donations::handle_subscription_canceled(state, &sub)
        }
        ProviderEvent::Unknown(event_type) => {
            debug!("ignoring unhandled webhook event type: {event_type}");
            Ok(())
        }
    }
}

/// Succeeded one-time payments fan out by the `kind` tag attached when the
/// intent was created.
async fn dispatch_payment(state: &AppState, intent: &PaymentIntent) -> Result<(), String> {
    match intent.metadata.get("kind").map(String::as_str) {
        Some(registrations::KIND_EVENT_REGISTRATION) => {
            registrations::materialize_payment(state, intent).await
        }
        Some(pastevents::KIND_PAST_EVENT_PURCHASE) => {
            pastevents::materialize_purchase(state, intent).await
        }
        Some(donations::KIND_DONATION) => donations::handle_one_time_gift(state, intent).await,
        other => {
            debug!(
                "payment {} has no handled kind ({:?}), ignoring",
                intent.id, other
            );
            Ok(())
        }
    }
}

fn mark_processed(state: &AppState, provider_event_id: &str) {
    let Ok(mut conn) = state.conn.get() else {
        return;
    };
    let _ = diesel::update(
        webhook_events::table.filter(webhook_events::provider_event_id.eq(provider_event_id)),
    )
    .set(webhook_events::processed.eq(true))
    .execute(&mut conn);
}

fn mark_failed(state: &AppState, provider_event_id: &str, error_text: &str) {
    let Ok(mut conn) = state.conn.get() else {
        return;
    };
    let _ = diesel::update(
        webhook_events::table.filter(webhook_events::provider_event_id.eq(provider_event_id)),
    )
    .set(webhook_events::processing_error.eq(Some(error_text)))
    .execute(&mut conn);
}
