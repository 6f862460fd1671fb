use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::email::templates;
use crate::events::{
    self, apply_promo, price_for_attendance, schedule_lines, Event, ATTENDANCE_IN_PERSON,
    ATTENDANCE_ONLINE, REGISTRATION_EXTERNAL, REGISTRATION_NONE,
};
use crate::livestream::{self, NewLivestreamAccess};
use crate::payments::{CreatePaymentIntentParams, PaymentIntent};
use crate::shared::schema::event_registrations;
use crate::shared::state::AppState;
use crate::shared::utils::format_cents;

pub const KIND_EVENT_REGISTRATION: &str = "event_registration";

pub const STATUS_CONFIRMED: &str = "confirmed";
pub const STATUS_CANCELLED: &str = "cancelled";
pub const STATUS_NO_SHOW: &str = "no_show";
pub const STATUS_CHECKED_IN: &str = "checked_in";

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = event_registrations)]
pub struct EventRegistration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: Option<String>,
    pub billing_name: Option<String>,
    pub billing_email: Option<String>,
    pub attendance: String,
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub payment_method: String,
    pub payment_status: String,
    pub payment_reference: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub emails_sent: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration fields carried through the payment provider as intent
/// metadata, attached at intent-creation time and read back in the webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationMetadata {
    pub event_slug: String,
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: Option<String>,
    pub billing_name: Option<String>,
    pub billing_email: Option<String>,
    pub attendance: String,
    pub discount_cents: i64,
}

impl RegistrationMetadata {
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Option<Self> {
        let event_slug = metadata.get("event_slug")?.clone();
        let attendee_name = metadata.get("attendee_name")?.clone();
        let attendee_email = metadata.get("attendee_email")?.clone();
        Some(Self {
            event_slug,
            attendee_name,
            attendee_email,
            attendee_phone: metadata.get("attendee_phone").cloned(),
            billing_name: metadata.get("billing_name").cloned(),
            billing_email: metadata.get("billing_email").cloned(),
            attendance: metadata
                .get("attendance")
                .cloned()
                .unwrap_or_else(|| ATTENDANCE_IN_PERSON.to_string()),
            discount_cents: metadata
                .get("discount_cents")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }

    pub fn to_metadata(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("kind".to_string(), KIND_EVENT_REGISTRATION.to_string());
        m.insert("event_slug".to_string(), self.event_slug.clone());
        m.insert("attendee_name".to_string(), self.attendee_name.clone());
        m.insert("attendee_email".to_string(), self.attendee_email.clone());
        if let Some(phone) = &self.attendee_phone {
            m.insert("attendee_phone".to_string(), phone.clone());
        }
        if let Some(name) = &self.billing_name {
            m.insert("billing_name".to_string(), name.clone());
        }
        if let Some(email) = &self.billing_email {
            m.insert("billing_email".to_string(), email.clone());
        }
        m.insert("attendance".to_string(), self.attendance.clone());
        m.insert("discount_cents".to_string(), self.discount_cents.to_string());
        m
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Confirmation,
    OnlineAccess,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::OnlineAccess => "online_access",
        }
    }
}

/// Everything the materializer intends to write for one successful payment,
/// computed up front so it can be asserted on without a database.
#[derive(Debug)]
pub struct RegistrationPlan {
    pub registration: EventRegistration,
    pub access: Option<NewLivestreamAccess>,
    pub email: EmailKind,
}

/// Deterministic registration id derived from the provider payment id.
/// Duplicate webhook deliveries for the same payment collide on the primary
/// key instead of materializing twice.
pub fn registration_id_for_payment(payment_id: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("chapelserver:registration:{payment_id}").as_bytes(),
    )
}

pub fn plan_registration(
    event: &Event,
    meta: &RegistrationMetadata,
    amount_cents: i64,
    payment_reference: Option<&str>,
    payment_method: &str,
    now: DateTime<Utc>,
) -> RegistrationPlan {
    let id = match payment_reference {
        Some(reference) => registration_id_for_payment(reference),
        None => Uuid::new_v4(),
    };
    let registration = EventRegistration {
        id,
        event_id: event.id,
        attendee_name: meta.attendee_name.clone(),
        attendee_email: meta.attendee_email.clone(),
        attendee_phone: meta.attendee_phone.clone(),
        billing_name: meta.billing_name.clone(),
        billing_email: meta.billing_email.clone(),
        attendance: meta.attendance.clone(),
        amount_cents,
        discount_cents: meta.discount_cents,
        payment_method: payment_method.to_string(),
        payment_status: if amount_cents > 0 { "paid" } else { "free" }.to_string(),
        payment_reference: payment_reference.map(|s| s.to_string()),
        status: STATUS_CONFIRMED.to_string(),
        notes: None,
        emails_sent: serde_json::json!([]),
        created_at: now,
        updated_at: now,
    };

    let (access, email) = if meta.attendance == ATTENDANCE_ONLINE {
        let access = livestream::new_access(event.id, id, &meta.attendee_name, &meta.attendee_email, now);
        (Some(access), EmailKind::OnlineAccess)
    } else {
        (None, EmailKind::Confirmation)
    };

    RegistrationPlan {
        registration,
        access,
        email,
    }
}

/// Materializes an `EventRegistration` from a succeeded provider payment.
/// Each write and each email send is guarded independently; nothing here is
/// compensated or rolled back against the payment.
pub async fn materialize_payment(state: &AppState, intent: &PaymentIntent) -> Result<(), String> {
    let meta = RegistrationMetadata::from_metadata(&intent.metadata)
        .ok_or_else(|| format!("payment {} missing registration metadata", intent.id))?;

    let mut conn = state.conn.get().map_err(|e| format!("DB error: {e}"))?;
    let Some(event) = events::load_event_by_slug(&mut conn, &meta.event_slug)
        .map_err(|e| format!("Query error: {e}"))?
    else {
        return Err(format!(
            "payment {} references unknown event '{}'",
            intent.id, meta.event_slug
        ));
    };

    let plan = plan_registration(
        &event,
        &meta,
        intent.amount,
        Some(intent.id.as_str()),
        "card",
        Utc::now(),
    );

    let inserted = diesel::insert_into(event_registrations::table)
        .values(&plan.registration)
        .on_conflict(event_registrations::id)
        .do_nothing()
        .execute(&mut conn)
        .map_err(|e| format!("Insert error: {e}"))?;
    if inserted == 0 {
        info!(
            payment = %intent.id,
            "registration already materialized, skipping duplicate delivery"
        );
        return Ok(());
    }
    info!(
        event = %event.slug,
        attendee = %plan.registration.attendee_email,
        "event registration created"
    );

    if let Some(access) = &plan.access {
        if let Err(e) = livestream::insert_access(&mut conn, access) {
            error!("failed to persist livestream access for {}: {e}", intent.id);
        }
    }

    let sessions = events::load_sessions(&mut conn, event.id).unwrap_or_default();
    let schedule = schedule_lines(&sessions);
    let amount_display = format_cents(intent.amount, &state.config.site.currency);

    let (subject, html) = match (&plan.email, &plan.access) {
        (EmailKind::OnlineAccess, Some(access)) => {
            let watch_url = livestream::watch_url(&state.config.site.base_url, &event.slug, &access.token);
            templates::online_access(&event.title, &meta.attendee_name, &schedule, &watch_url)
        }
        _ => templates::registration_confirmation(
            &event.title,
            &meta.attendee_name,
            &schedule,
            &event.location,
            &amount_display,
        ),
    };

    match state.mailer.send(&meta.attendee_email, &subject, &html).await {
        Ok(()) => record_email_sent(&mut conn, plan.registration.id, plan.email.as_str()),
        Err(e) => warn!(
            "failed to send {} email for {}: {e}",
            plan.email.as_str(),
            intent.id
        ),
    }

    Ok(())
}

/// Appends an email kind to the registration's sent list. Best effort; the
/// list exists for admins, not for control flow.
fn record_email_sent(conn: &mut PgConnection, registration_id: Uuid, kind: &str) {
    let current: Result<serde_json::Value, _> = event_registrations::table
        .filter(event_registrations::id.eq(registration_id))
        .select(event_registrations::emails_sent)
        .first(conn);
    let mut list = match current {
        Ok(serde_json::Value::Array(items)) => items,
        _ => Vec::new(),
    };
    list.push(serde_json::Value::String(kind.to_string()));
    if let Err(e) = diesel::update(
        event_registrations::table.filter(event_registrations::id.eq(registration_id)),
    )
    .set(event_registrations::emails_sent.eq(serde_json::Value::Array(list)))
    .execute(conn)
    {
        warn!("failed to record sent email for {registration_id}: {e}");
    }
}

// ===== Public registration endpoints =====

#[derive(Debug, Deserialize)]
pub struct FreeRegistrationRequest {
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: Option<String>,
    #[serde(default)]
    pub attendance: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HybridRegistrationRequest {
    pub attendee_name: String,
    pub attendee_email: String,
    pub attendee_phone: Option<String>,
    pub billing_name: Option<String>,
    pub billing_email: Option<String>,
    #[serde(default)]
    pub attendance: Option<String>,
    pub promo_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RegistrationResponse {
    Confirmed {
        registration_id: Uuid,
        status: String,
    },
    PaymentRequired {
        client_secret: String,
        amount_cents: i64,
        discount_cents: i64,
    },
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/events/{slug}/register/free", post(register_free))
        .route("/api/events/{slug}/register", post(register_hybrid))
}

async fn register_free(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<FreeRegistrationRequest>,
) -> Result<Json<RegistrationResponse>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let event = lookup_open_event(&mut conn, &slug)?;
    let attendance = req.attendance.as_deref().unwrap_or(ATTENDANCE_IN_PERSON);
    if price_for_attendance(&event, attendance) > 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "This event requires payment to register".to_string(),
        ));
    }

    let meta = RegistrationMetadata {
        event_slug: event.slug.clone(),
        attendee_name: req.attendee_name,
        attendee_email: req.attendee_email,
        attendee_phone: req.attendee_phone,
        billing_name: None,
        billing_email: None,
        attendance: attendance.to_string(),
        discount_cents: 0,
    };
    let registration_id = persist_free_registration(&state, &mut conn, &event, &meta).await?;

    Ok(Json(RegistrationResponse::Confirmed {
        registration_id,
        status: STATUS_CONFIRMED.to_string(),
    }))
}

async fn register_hybrid(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(req): Json<HybridRegistrationRequest>,
) -> Result<Json<RegistrationResponse>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let event = lookup_open_event(&mut conn, &slug)?;
    let attendance = req.attendance.as_deref().unwrap_or(ATTENDANCE_IN_PERSON);
    let list_price = price_for_attendance(&event, attendance);

    let (final_price, discount_cents) = match req.promo_code.as_deref() {
        Some(code) => {
            let outcome = apply_promo(
                list_price,
                event.promo_code.as_deref(),
                event.promo_discount_percent,
                code,
            );
            (outcome.final_price_cents, list_price - outcome.final_price_cents)
        }
        None => (list_price, 0),
    };

    let meta = RegistrationMetadata {
        event_slug: event.slug.clone(),
        attendee_name: req.attendee_name,
        attendee_email: req.attendee_email,
        attendee_phone: req.attendee_phone,
        billing_name: req.billing_name,
        billing_email: req.billing_email,
        attendance: attendance.to_string(),
        discount_cents,
    };

    // A fully discounted (or free-tier) registration never touches the
    // payment provider.
    if final_price == 0 {
        let registration_id = persist_free_registration(&state, &mut conn, &event, &meta).await?;
        return Ok(Json(RegistrationResponse::Confirmed {
            registration_id,
            status: STATUS_CONFIRMED.to_string(),
        }));
    }

    let intent = state
        .payments
        .create_payment_intent(CreatePaymentIntentParams {
            amount_cents: final_price,
            currency: state.config.site.currency.clone(),
            receipt_email: Some(meta.attendee_email.clone()),
            metadata: meta.to_metadata(),
        })
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, format!("Payment error: {e}")))?;

    let client_secret = intent.client_secret.ok_or_else(|| {
        (
            StatusCode::BAD_GATEWAY,
            "Payment provider returned no client secret".to_string(),
        )
    })?;

    Ok(Json(RegistrationResponse::PaymentRequired {
        client_secret,
        amount_cents: final_price,
        discount_cents,
    }))
}

fn lookup_open_event(
    conn: &mut PgConnection,
    slug: &str,
) -> Result<Event, (StatusCode, String)> {
    let event = events::load_event_by_slug(conn, slug)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Event not found".to_string()))?;
    if !event.published
        || event.registration_type == REGISTRATION_NONE
        || event.registration_type == REGISTRATION_EXTERNAL
    {
        return Err((
            StatusCode::BAD_REQUEST,
            "Registration is not open for this event".to_string(),
        ));
    }
    Ok(event)
}

async fn persist_free_registration(
    state: &AppState,
    conn: &mut PgConnection,
    event: &Event,
    meta: &RegistrationMetadata,
) -> Result<Uuid, (StatusCode, String)> {
    let plan = plan_registration(event, meta, 0, None, "none", Utc::now());

    diesel::insert_into(event_registrations::table)
        .values(&plan.registration)
        .execute(conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    if let Some(access) = &plan.access {
        if let Err(e) = livestream::insert_access(conn, access) {
            error!(
                "failed to persist livestream access for free registration {}: {e}",
                plan.registration.id
            );
        }
    }

    let sessions = events::load_sessions(conn, event.id).unwrap_or_default();
    let schedule = schedule_lines(&sessions);
    let (subject, html) = match (&plan.email, &plan.access) {
        (EmailKind::OnlineAccess, Some(access)) => {
            let watch_url = livestream::watch_url(&state.config.site.base_url, &event.slug, &access.token);
            templates::online_access(&event.title, &meta.attendee_name, &schedule, &watch_url)
        }
        _ => templates::registration_confirmation(
            &event.title,
            &meta.attendee_name,
            &schedule,
            &event.location,
            "Free",
        ),
    };
    match state.mailer.send(&meta.attendee_email, &subject, &html).await {
        Ok(()) => record_email_sent(conn, plan.registration.id, plan.email.as_str()),
        Err(e) => warn!("failed to send registration email: {e}"),
    }

    Ok(plan.registration.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::REGISTRATION_HYBRID;

    fn sample_event() -> Event {
        Event {
            id: Uuid::new_v4(),
            title: "Spring Conference".to_string(),
            slug: "spring-conference".to_string(),
            description: String::new(),
            location: "Main Hall".to_string(),
            category: "conference".to_string(),
            registration_type: REGISTRATION_HYBRID.to_string(),
            price_cents: 5_000,
            online_price_cents: 2_000,
            capacity: Some(300),
            external_registration_url: None,
            promo_code: Some("KB10".to_string()),
            promo_discount_percent: Some(10),
            published: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_meta(attendance: &str) -> RegistrationMetadata {
        RegistrationMetadata {
            event_slug: "spring-conference".to_string(),
            attendee_name: "Ana Lima".to_string(),
            attendee_email: "ana@example.com".to_string(),
            attendee_phone: None,
            billing_name: None,
            billing_email: None,
            attendance: attendance.to_string(),
            discount_cents: 0,
        }
    }

    #[test]
    fn online_plan_includes_access_record_and_online_email() {
        let event = sample_event();
        let plan = plan_registration(
            &event,
            &sample_meta(ATTENDANCE_ONLINE),
            2_000,
            Some("pi_abc"),
            "card",
            Utc::now(),
        );
        let access = plan.access.expect("online attendance mints access");
        assert_eq!(access.registration_id, plan.registration.id);
        assert_eq!(access.event_id, event.id);
        assert!(access.active);
        assert_eq!(access.access_count, 0);
        assert_eq!(plan.email, EmailKind::OnlineAccess);
    }

    #[test]
    fn in_person_plan_has_no_access_record() {
        let event = sample_event();
        let plan = plan_registration(
            &event,
            &sample_meta(ATTENDANCE_IN_PERSON),
            5_000,
            Some("pi_abc"),
            "card",
            Utc::now(),
        );
        assert!(plan.access.is_none());
        assert_eq!(plan.email, EmailKind::Confirmation);
        assert_eq!(plan.registration.payment_status, "paid");
    }

    #[test]
    fn registration_id_is_deterministic_per_payment() {
        assert_eq!(
            registration_id_for_payment("pi_abc"),
            registration_id_for_payment("pi_abc")
        );
        assert_ne!(
            registration_id_for_payment("pi_abc"),
            registration_id_for_payment("pi_def")
        );
    }

    #[test]
    fn zero_amount_plan_is_marked_free() {
        let event = sample_event();
        let plan = plan_registration(
            &event,
            &sample_meta(ATTENDANCE_IN_PERSON),
            0,
            None,
            "none",
            Utc::now(),
        );
        assert_eq!(plan.registration.payment_status, "free");
        assert!(plan.registration.payment_reference.is_none());
    }

    #[test]
    fn metadata_round_trips_through_provider_map() {
        let meta = RegistrationMetadata {
            event_slug: "spring-conference".to_string(),
            attendee_name: "Ana Lima".to_string(),
            attendee_email: "ana@example.com".to_string(),
            attendee_phone: Some("555-0101".to_string()),
            billing_name: Some("Lima Holdings".to_string()),
            billing_email: Some("ap@example.com".to_string()),
            attendance: ATTENDANCE_ONLINE.to_string(),
            discount_cents: 500,
        };
        let map = meta.to_metadata();
        assert_eq!(map.get("kind").unwrap(), KIND_EVENT_REGISTRATION);
        let parsed = RegistrationMetadata::from_metadata(&map).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn metadata_missing_required_fields_is_rejected() {
        let mut map = HashMap::new();
        map.insert("event_slug".to_string(), "x".to_string());
        assert!(RegistrationMetadata::from_metadata(&map).is_none());
    }
}
