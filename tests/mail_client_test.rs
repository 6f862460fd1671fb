use chapelserver::email::{MailClient, MailError};

fn client(base_url: String) -> MailClient {
    MailClient::new(
        "re_test_key".to_string(),
        "hello@chapel.example".to_string(),
        "Grace Chapel".to_string(),
    )
    .with_base_url(base_url)
}

#[tokio::test]
async fn send_posts_bearer_authenticated_json() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/emails")
        .match_header("authorization", "Bearer re_test_key")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "from": "Grace Chapel <hello@chapel.example>",
            "to": ["ruth@example.org"],
            "subject": "You're registered"
        })))
        .with_status(200)
        .with_body(r#"{"id":"email_1"}"#)
        .create_async()
        .await;

    client(server.url())
        .send("ruth@example.org", "You're registered", "<p>See you there.</p>")
        .await
        .expect("send should succeed");

    mock.assert_async().await;
}

#[tokio::test]
async fn send_surfaces_api_failures() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/emails")
        .with_status(422)
        .with_body(r#"{"message":"Invalid `to` address"}"#)
        .create_async()
        .await;

    let err = client(server.url())
        .send("not-an-address", "Subject", "<p>Body</p>")
        .await
        .expect_err("bad address should error");

    match err {
        MailError::Api(message) => assert!(message.contains("422")),
        other => panic!("unexpected error: {other:?}"),
    }
}
