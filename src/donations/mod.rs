use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::email::templates;
use crate::payments::{CreatePaymentIntentParams, Invoice, PaymentIntent, Subscription};
use crate::shared::schema::{donation_receipts, donor_subscriptions};
use crate::shared::state::AppState;
use crate::shared::utils::format_cents;

pub const KIND_DONATION: &str = "donation";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = donor_subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DonorSubscription {
    pub id: Uuid,
    pub provider_customer_id: String,
    pub provider_subscription_id: String,
    pub donor_name: String,
    pub donor_email: String,
    pub amount_cents: i64,
    pub billing_interval: String,
    pub status: String,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = donation_receipts)]
pub struct DonationReceipt {
    pub id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub provider_invoice_id: Option<String>,
    pub donor_email: String,
    pub amount_cents: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct OneTimeGiftRequest {
    pub donor_name: String,
    pub donor_email: String,
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct OneTimeGiftResponse {
    pub client_secret: String,
    pub amount_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct KingdomBuilderRequest {
    pub donor_name: String,
    pub donor_email: String,
    pub amount_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct KingdomBuilderResponse {
    pub subscription_id: Uuid,
    pub provider_subscription_id: String,
    pub status: String,
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/donations/give", post(one_time_gift))
        .route("/api/donations/kingdom-builder", post(kingdom_builder))
}

async fn one_time_gift(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OneTimeGiftRequest>,
) -> Result<Json<OneTimeGiftResponse>, (StatusCode, String)> {
    if req.amount_cents <= 0 {
        return Err((StatusCode::BAD_REQUEST, "Gift amount must be positive".to_string()));
    }

    let mut metadata = HashMap::new();
    metadata.insert("kind".to_string(), KIND_DONATION.to_string());
    metadata.insert("donor_name".to_string(), req.donor_name);
    metadata.insert("donor_email".to_string(), req.donor_email.clone());

    let intent = state
        .payments
        .create_payment_intent(CreatePaymentIntentParams {
            amount_cents: req.amount_cents,
            currency: state.config.site.currency.clone(),
            receipt_email: Some(req.donor_email),
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

    Ok(Json(OneTimeGiftResponse {
        client_secret,
        amount_cents: req.amount_cents,
    }))
}

/// Sets up a recurring Kingdom Builder gift: provider customer, provider
/// subscription, local record, welcome email.
async fn kingdom_builder(
    State(state): State<Arc<AppState>>,
    Json(req): Json<KingdomBuilderRequest>,
) -> Result<Json<KingdomBuilderResponse>, (StatusCode, String)> {
    let price_id = &state.config.payments.kingdom_builder_price_id;
    if price_id.is_empty() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Kingdom Builder subscriptions are not configured".to_string(),
        ));
    }

    let mut metadata = HashMap::new();
    metadata.insert("kind".to_string(), "kingdom_builder".to_string());
    metadata.insert("donor_name".to_string(), req.donor_name.clone());

    let customer = state
        .payments
        .create_customer(&req.donor_email, Some(&req.donor_name), metadata.clone())
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Payment error: {e}")))?;

    let subscription = state
        .payments
        .create_subscription(&customer.id, price_id, metadata)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Payment error: {e}")))?;

    let now = Utc::now();
    let record = DonorSubscription {
        id: Uuid::new_v4(),
        provider_customer_id: customer.id,
        provider_subscription_id: subscription.id.clone(),
        donor_name: req.donor_name.clone(),
        donor_email: req.donor_email.clone(),
        amount_cents: req.amount_cents,
        billing_interval: "month".to_string(),
        status: subscription.status.as_str().to_string(),
        current_period_end: Utc.timestamp_opt(subscription.current_period_end, 0).single(),
        cancel_at_period_end: subscription.cancel_at_period_end,
        created_at: now,
        updated_at: now,
    };

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    diesel::insert_into(donor_subscriptions::table)
        .values(&record)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;
    info!(donor = %req.donor_email, "kingdom builder subscription created");

    let amount_display = format_cents(req.amount_cents, &state.config.site.currency);
    let (subject, html) =
        templates::kingdom_builder_welcome(&req.donor_name, &amount_display, "monthly");
    if let Err(e) = state.mailer.send(&req.donor_email, &subject, &html).await {
        warn!("failed to send kingdom builder welcome email: {e}");
    }

    Ok(Json(KingdomBuilderResponse {
        subscription_id: record.id,
        provider_subscription_id: record.provider_subscription_id,
        status: record.status,
    }))
}

// ===== Webhook side =====

/// Deterministic receipt id per provider invoice/payment, the dedupe key for
/// redelivered notifications.
pub fn receipt_id_for(provider_id: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("chapelserver:receipt:{provider_id}").as_bytes(),
    )
}

/// A paid recurring invoice becomes a receipt row plus a thank-you email.
pub async fn handle_invoice_paid(state: &AppState, invoice: &Invoice) -> Result<(), String> {
    let mut conn = state.conn.get().map_err(|e| format!("DB error: {e}"))?;

    let subscription: Option<DonorSubscription> = match &invoice.subscription {
        Some(provider_sub_id) => donor_subscriptions::table
            .filter(donor_subscriptions::provider_subscription_id.eq(provider_sub_id))
            .first(&mut conn)
            .optional()
            .map_err(|e| format!("Query error: {e}"))?,
        None => None,
    };

    let donor_email = invoice
        .customer_email
        .clone()
        .or_else(|| subscription.as_ref().map(|s| s.donor_email.clone()))
        .ok_or_else(|| format!("invoice {} has no reachable donor", invoice.id))?;

    let receipt = DonationReceipt {
        id: receipt_id_for(&invoice.id),
        subscription_id: subscription.as_ref().map(|s| s.id),
        provider_invoice_id: Some(invoice.id.clone()),
        donor_email: donor_email.clone(),
        amount_cents: invoice.amount_paid,
        currency: invoice.currency.clone(),
        created_at: Utc::now(),
    };

    let inserted = diesel::insert_into(donation_receipts::table)
        .values(&receipt)
        .on_conflict(donation_receipts::id)
        .do_nothing()
        .execute(&mut conn)
        .map_err(|e| format!("Insert error: {e}"))?;
    if inserted == 0 {
        info!(invoice = %invoice.id, "receipt already recorded, skipping duplicate delivery");
        return Ok(());
    }

    if let Some(sub) = &subscription {
        let _ = diesel::update(
            donor_subscriptions::table.filter(donor_subscriptions::id.eq(sub.id)),
        )
        .set((
            donor_subscriptions::status.eq("active"),
            donor_subscriptions::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn);
    }

    let donor_name = subscription
        .as_ref()
        .map(|s| s.donor_name.clone())
        .unwrap_or_else(|| "Friend".to_string());
    let amount_display = format_cents(invoice.amount_paid, &invoice.currency);
    let (subject, html) = templates::donation_thank_you(&donor_name, &amount_display);
    if let Err(e) = state.mailer.send(&donor_email, &subject, &html).await {
        warn!("failed to send thank-you email for invoice {}: {e}", invoice.id);
    }

    Ok(())
}

pub fn handle_invoice_failed(state: &AppState, invoice: &Invoice) -> Result<(), String> {
    let Some(provider_sub_id) = &invoice.subscription else {
        return Ok(());
    };
    let mut conn = state.conn.get().map_err(|e| format!("DB error: {e}"))?;
    let updated = diesel::update(
        donor_subscriptions::table
            .filter(donor_subscriptions::provider_subscription_id.eq(provider_sub_id)),
    )
    .set((
        donor_subscriptions::status.eq("past_due"),
        donor_subscriptions::updated_at.eq(Utc::now()),
    ))
    .execute(&mut conn)
    .map_err(|e| format!("Update error: {e}"))?;
    if updated > 0 {
        warn!(invoice = %invoice.id, "recurring gift payment failed, subscription marked past_due");
    }
    Ok(())
}

/// Mirrors provider-side subscription state into the local record.
pub fn handle_subscription_updated(
    state: &AppState,
    subscription: &Subscription,
) -> Result<(), String> {
    let mut conn = state.conn.get().map_err(|e| format!("DB error: {e}"))?;
    diesel::update(
        donor_subscriptions::table
            .filter(donor_subscriptions::provider_subscription_id.eq(&subscription.id)),
    )
    .set((
        donor_subscriptions::status.eq(subscription.status.as_str()),
        donor_subscriptions::cancel_at_period_end.eq(subscription.cancel_at_period_end),
        donor_subscriptions::current_period_end
            .eq(Utc.timestamp_opt(subscription.current_period_end, 0).single()),
        donor_subscriptions::updated_at.eq(Utc::now()),
    ))
    .execute(&mut conn)
    .map_err(|e| format!("Update error: {e}"))?;
    Ok(())
}

pub fn handle_subscription_canceled(
    state: &AppState,
    subscription: &Subscription,
) -> Result<(), String> {
    let mut conn = state.conn.get().map_err(|e| format!("DB error: {e}"))?;
    diesel::update(
        donor_subscriptions::table
            .filter(donor_subscriptions::provider_subscription_id.eq(&subscription.id)),
    )
    .set((
        donor_subscriptions::status.eq("canceled"),
        donor_subscriptions::updated_at.eq(Utc::now()),
    ))
    .execute(&mut conn)
    .map_err(|e| format!("Update error: {e}"))?;
    info!(subscription = %subscription.id, "kingdom builder subscription canceled");
    Ok(())
}

/// One-time gift succeeded: record a receipt and thank the donor.
pub async fn handle_one_time_gift(state: &AppState, intent: &PaymentIntent) -> Result<(), String> {
    let donor_email = intent
        .metadata
        .get("donor_email")
        .cloned()
        .or_else(|| intent.receipt_email.clone())
        .ok_or_else(|| format!("donation {} has no donor email", intent.id))?;
    let donor_name = intent
        .metadata
        .get("donor_name")
        .cloned()
        .unwrap_or_else(|| "Friend".to_string());

    let mut conn = state.conn.get().map_err(|e| format!("DB error: {e}"))?;
    let receipt = DonationReceipt {
        id: receipt_id_for(&intent.id),
        subscription_id: None,
        provider_invoice_id: Some(intent.id.clone()),
        donor_email: donor_email.clone(),
        amount_cents: intent.amount,
        currency: intent.currency.clone(),
        created_at: Utc::now(),
    };
    let inserted = diesel::insert_into(donation_receipts::table)
        .values(&receipt)
        .on_conflict(donation_receipts::id)
        .do_nothing()
        .execute(&mut conn)
        .map_err(|e| format!("Insert error: {e}"))?;
    if inserted == 0 {
        return Ok(());
    }

    let amount_display = format_cents(intent.amount, &intent.currency);
    let (subject, html) = templates::donation_thank_you(&donor_name, &amount_display);
    if let Err(e) = state.mailer.send(&donor_email, &subject, &html).await {
        warn!("failed to send thank-you email for gift {}: {e}", intent.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_id_is_deterministic_per_invoice() {
        assert_eq!(receipt_id_for("in_1"), receipt_id_for("in_1"));
        assert_ne!(receipt_id_for("in_1"), receipt_id_for("in_2"));
    }
}
