use std::collections::HashMap;

use chapelserver::payments::{CreatePaymentIntentParams, PaymentClient, PaymentError, SubscriptionStatus};

fn client(base_url: String) -> PaymentClient {
    PaymentClient::new("sk_test_123".to_string(), Some("whsec_test".to_string()))
        .with_base_url(base_url)
}

#[tokio::test]
async fn create_payment_intent_decodes_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/payment_intents")
        .match_header("authorization", mockito::Matcher::Regex("Basic .*".to_string()))
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("amount".to_string(), "4500".to_string()),
            mockito::Matcher::UrlEncoded("currency".to_string(), "usd".to_string()),
            mockito::Matcher::UrlEncoded("receipt_email".to_string(), "ruth@example.org".to_string()),
            mockito::Matcher::UrlEncoded("metadata[kind]".to_string(), "event_registration".to_string()),
        ]))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "id": "pi_abc",
                "client_secret": "pi_abc_secret_xyz",
                "amount": 4500,
                "currency": "usd",
                "status": "requires_payment_method",
                "receipt_email": "ruth@example.org",
                "metadata": { "kind": "event_registration" }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut metadata = HashMap::new();
    metadata.insert("kind".to_string(), "event_registration".to_string());

    let intent = client(server.url())
        .create_payment_intent(CreatePaymentIntentParams {
            amount_cents: 4500,
            currency: "usd".to_string(),
            receipt_email: Some("ruth@example.org".to_string()),
            metadata,
        })
        .await
        .expect("intent should be created");

    mock.assert_async().await;
    assert_eq!(intent.id, "pi_abc");
    assert_eq!(intent.client_secret.as_deref(), Some("pi_abc_secret_xyz"));
    assert_eq!(intent.amount, 4500);
}

#[tokio::test]
async fn api_errors_surface_provider_message() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/payment_intents")
        .with_status(402)
        .with_body(
            serde_json::json!({
                "error": { "message": "Your card was declined." }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let err = client(server.url())
        .create_payment_intent(CreatePaymentIntentParams {
            amount_cents: 100,
            currency: "usd".to_string(),
            receipt_email: None,
            metadata: HashMap::new(),
        })
        .await
        .expect_err("declined payment should error");

    match err {
        PaymentError::Api(message) => assert_eq!(message, "Your card was declined."),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn create_customer_then_subscription() {
    let mut server = mockito::Server::new_async().await;
    let customer_mock = server
        .mock("POST", "/customers")
        .match_body(mockito::Matcher::UrlEncoded(
            "email".to_string(),
            "naomi@example.org".to_string(),
        ))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "id": "cus_1",
                "email": "naomi@example.org",
                "name": "Naomi",
                "metadata": {}
            })
            .to_string(),
        )
        .create_async()
        .await;
    let subscription_mock = server
        .mock("POST", "/subscriptions")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("customer".to_string(), "cus_1".to_string()),
            mockito::Matcher::UrlEncoded("items[0][price]".to_string(), "price_kb_monthly".to_string()),
            mockito::Matcher::UrlEncoded("payment_behavior".to_string(), "default_incomplete".to_string()),
        ]))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "id": "sub_1",
                "customer": "cus_1",
                "status": "incomplete",
                "current_period_end": 1780000000,
                "cancel_at_period_end": false,
                "metadata": { "kind": "kingdom_builder" }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = client(server.url());
    let customer = client
        .create_customer("naomi@example.org", Some("Naomi"), HashMap::new())
        .await
        .expect("customer should be created");
    assert_eq!(customer.id, "cus_1");

    let mut metadata = HashMap::new();
    metadata.insert("kind".to_string(), "kingdom_builder".to_string());
    let subscription = client
        .create_subscription("cus_1", "price_kb_monthly", metadata)
        .await
        .expect("subscription should be created");

    customer_mock.assert_async().await;
    subscription_mock.assert_async().await;
    assert_eq!(subscription.id, "sub_1");
    assert_eq!(subscription.status, SubscriptionStatus::Incomplete);
    assert!(!subscription.cancel_at_period_end);
}

#[tokio::test]
async fn cancel_subscription_at_period_end_posts_flag() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/subscriptions/sub_9")
        .match_body(mockito::Matcher::UrlEncoded(
            "cancel_at_period_end".to_string(),
            "true".to_string(),
        ))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "id": "sub_9",
                "customer": "cus_9",
                "status": "active",
                "current_period_end": 1780000000,
                "cancel_at_period_end": true,
                "metadata": {}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let subscription = client(server.url())
        .cancel_subscription("sub_9", true)
        .await
        .expect("cancellation should be scheduled");

    mock.assert_async().await;
    assert!(subscription.cancel_at_period_end);
    assert_eq!(subscription.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn immediate_cancel_uses_delete() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/subscriptions/sub_9")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "id": "sub_9",
                "customer": "cus_9",
                "status": "canceled",
                "current_period_end": 1780000000,
                "cancel_at_period_end": false,
                "metadata": {}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let subscription = client(server.url())
        .cancel_subscription("sub_9", false)
        .await
        .expect("cancellation should succeed");

    mock.assert_async().await;
    assert_eq!(subscription.status, SubscriptionStatus::Canceled);
}
