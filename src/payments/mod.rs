use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const PROVIDER_API_URL: &str = "https://api.stripe.com/v1";

/// Signed webhook payloads older than this are rejected outright.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct PaymentClient {
    api_key: String,
    webhook_secret: Option<String>,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub receipt_email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer: String,
    pub status: SubscriptionStatus,
    pub current_period_end: i64,
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Paused,
    Trialing,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::PastDue => "past_due",
            Self::Paused => "paused",
            Self::Trialing => "trialing",
            Self::Unpaid => "unpaid",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub customer: String,
    pub subscription: Option<String>,
    pub amount_paid: i64,
    pub amount_due: i64,
    pub currency: String,
    #[serde(default)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
    pub created: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// A provider notification decoded into the shape the dispatcher branches on.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    PaymentSucceeded(PaymentIntent),
    InvoicePaid(Invoice),
    InvoicePaymentFailed(Invoice),
    SubscriptionCreated(Subscription),
    SubscriptionUpdated(Subscription),
    SubscriptionCanceled(Subscription),
    Unknown(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment API error: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid webhook: {0}")]
    InvalidWebhook(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("payment provider is not configured")]
    NotConfigured,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentIntentParams {
    pub amount_cents: i64,
    pub currency: String,
    pub receipt_email: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl PaymentClient {
    pub fn new(api_key: String, webhook_secret: Option<String>) -> Self {
        Self {
            api_key,
            webhook_secret,
            client: reqwest::Client::new(),
            base_url: PROVIDER_API_URL.to_string(),
        }
    }

    /// Points the client at a different API host. Used by tests talking to a
    /// local mock server.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub async fn create_payment_intent(
        &self,
        params: CreatePaymentIntentParams,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), params.amount_cents.to_string()),
            ("currency".to_string(), params.currency),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(email) = params.receipt_email {
            form.push(("receipt_email".to_string(), email));
        }
        for (key, value) in params.metadata {
            form.push((format!("metadata[{key}]"), value));
        }

        let response = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        self.handle_response(response).await
    }

    pub async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> Result<Customer, PaymentError> {
        let mut form: Vec<(String, String)> = vec![("email".to_string(), email.to_string())];
        if let Some(name) = name {
            form.push(("name".to_string(), name.to_string()));
        }
        for (key, value) in metadata {
            form.push((format!("metadata[{key}]"), value));
        }

        let response = self
            .client
            .post(format!("{}/customers", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        self.handle_response(response).await
    }

    pub async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Subscription, PaymentError> {
        let mut form: Vec<(String, String)> = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("items[0][price]".to_string(), price_id.to_string()),
            (
                "payment_behavior".to_string(),
                "default_incomplete".to_string(),
            ),
        ];
        for (key, value) in metadata {
            form.push((format!("metadata[{key}]"), value));
        }

        let response = self
            .client
            .post(format!("{}/subscriptions", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        self.handle_response(response).await
    }

    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<Subscription, PaymentError> {
        let url = format!("{}/subscriptions/{}", self.base_url, subscription_id);
        let request = if at_period_end {
            self.client
                .post(&url)
                .form(&[("cancel_at_period_end", "true")])
        } else {
            self.client.delete(&url)
        };

        let response = request
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Authenticates a webhook delivery. The signature header carries a
    /// timestamp and an HMAC-SHA256 of `timestamp.payload`; both must check
    /// out before the payload is even parsed.
    pub fn verify_webhook_signature(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<WebhookEvent, PaymentError> {
        let webhook_secret = self
            .webhook_secret
            .as_ref()
            .ok_or(PaymentError::NotConfigured)?;

        let parts: HashMap<&str, &str> = signature
            .split(',')
            .filter_map(|part| part.split_once('='))
            .collect();

        let timestamp = parts
            .get("t")
            .ok_or_else(|| PaymentError::InvalidWebhook("missing timestamp".to_string()))?;
        let received_sig = parts
            .get("v1")
            .ok_or_else(|| PaymentError::InvalidWebhook("missing signature".to_string()))?;

        let signed_payload = format!("{timestamp}.{payload}");

        use hmac::{Hmac, Mac};
        use sha2::Sha256;
        type HmacSha256 = Hmac<Sha256>;

        let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| PaymentError::InvalidWebhook("invalid webhook secret".to_string()))?;
        mac.update(signed_payload.as_bytes());
        let expected_sig = hex::encode(mac.finalize().into_bytes());

        if expected_sig != *received_sig {
            return Err(PaymentError::InvalidWebhook(
                "signature mismatch".to_string(),
            ));
        }

        let timestamp_i64: i64 = timestamp
            .parse()
            .map_err(|_| PaymentError::InvalidWebhook("invalid timestamp".to_string()))?;
        let now = chrono::Utc::now().timestamp();
        if (now - timestamp_i64).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(PaymentError::InvalidWebhook("timestamp too old".to_string()));
        }

        serde_json::from_str(payload).map_err(|e| PaymentError::Parse(e.to_string()))
    }

    pub fn parse_event(&self, event: &WebhookEvent) -> Result<ProviderEvent, PaymentError> {
        fn decode<T: serde::de::DeserializeOwned>(
            value: &serde_json::Value,
        ) -> Result<T, PaymentError> {
            serde_json::from_value(value.clone()).map_err(|e| PaymentError::Parse(e.to_string()))
        }

        match event.event_type.as_str() {
            "payment_intent.succeeded" => Ok(ProviderEvent::PaymentSucceeded(decode(
                &event.data.object,
            )?)),
            "invoice.paid" => Ok(ProviderEvent::InvoicePaid(decode(&event.data.object)?)),
            "invoice.payment_failed" => Ok(ProviderEvent::InvoicePaymentFailed(decode(
                &event.data.object,
            )?)),
            "customer.subscription.created" => Ok(ProviderEvent::SubscriptionCreated(decode(
                &event.data.object,
            )?)),
            "customer.subscription.updated" => Ok(ProviderEvent::SubscriptionUpdated(decode(
                &event.data.object,
            )?)),
            "customer.subscription.deleted" => Ok(ProviderEvent::SubscriptionCanceled(decode(
                &event.data.object,
            )?)),
            other => Ok(ProviderEvent::Unknown(other.to_string())),
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, PaymentError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        if !status.is_success() {
            #[derive(Deserialize)]
            struct ApiError {
                error: ApiErrorDetail,
            }
            #[derive(Deserialize)]
            struct ApiErrorDetail {
                message: String,
            }
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                return Err(PaymentError::Api(error.error.message));
            }
            return Err(PaymentError::Api(format!("HTTP {}: {}", status, body)));
        }

        serde_json::from_str(&body).map_err(|e| PaymentError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn sign(secret: &str, timestamp: i64, payload: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn client() -> PaymentClient {
        PaymentClient::new("sk_test_x".to_string(), Some("whsec_test".to_string()))
    }

    fn sample_payload() -> String {
        serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "created": chrono::Utc::now().timestamp(),
            "data": { "object": {
                "id": "pi_1",
                "client_secret": null,
                "amount": 2500,
                "currency": "usd",
                "status": "succeeded",
                "metadata": { "kind": "event_registration" }
            }}
        })
        .to_string()
    }

    #[test]
    fn accepts_correctly_signed_payload() {
        let payload = sample_payload();
        let sig = sign("whsec_test", chrono::Utc::now().timestamp(), &payload);
        let event = client()
            .verify_webhook_signature(&payload, &sig)
            .expect("valid signature should verify");
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "payment_intent.succeeded");
    }

    #[test]
    fn rejects_tampered_payload() {
        let payload = sample_payload();
        let sig = sign("whsec_test", chrono::Utc::now().timestamp(), &payload);
        let tampered = payload.replace("2500", "1");
        assert!(matches!(
            client().verify_webhook_signature(&tampered, &sig),
            Err(PaymentError::InvalidWebhook(_))
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = sample_payload();
        let sig = sign("whsec_other", chrono::Utc::now().timestamp(), &payload);
        assert!(client().verify_webhook_signature(&payload, &sig).is_err());
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = sample_payload();
        let stale = chrono::Utc::now().timestamp() - 3600;
        let sig = sign("whsec_test", stale, &payload);
        assert!(matches!(
            client().verify_webhook_signature(&payload, &sig),
            Err(PaymentError::InvalidWebhook(_))
        ));
    }

    #[test]
    fn rejects_when_secret_unconfigured() {
        let payload = sample_payload();
        let sig = sign("whsec_test", chrono::Utc::now().timestamp(), &payload);
        let unconfigured = PaymentClient::new("sk_test_x".to_string(), None);
        assert!(matches!(
            unconfigured.verify_webhook_signature(&payload, &sig),
            Err(PaymentError::NotConfigured)
        ));
    }

    #[test]
    fn parses_payment_succeeded_event() {
        let payload = sample_payload();
        let event: WebhookEvent = serde_json::from_str(&payload).unwrap();
        match client().parse_event(&event).unwrap() {
            ProviderEvent::PaymentSucceeded(intent) => {
                assert_eq!(intent.id, "pi_1");
                assert_eq!(intent.amount, 2500);
                assert_eq!(intent.metadata.get("kind").unwrap(), "event_registration");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_pass_through() {
        let event = WebhookEvent {
            id: "evt_2".to_string(),
            event_type: "charge.refunded".to_string(),
            data: WebhookEventData {
                object: serde_json::json!({}),
            },
            created: 0,
        };
        assert!(matches!(
            client().parse_event(&event).unwrap(),
            ProviderEvent::Unknown(t) if t == "charge.refunded"
        ));
    }
}
