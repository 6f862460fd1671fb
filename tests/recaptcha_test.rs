use chapelserver::contact::recaptcha::RecaptchaClient;

#[tokio::test]
async fn verify_accepts_successful_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/siteverify")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("secret".to_string(), "captcha_secret".to_string()),
            mockito::Matcher::UrlEncoded("response".to_string(), "token123".to_string()),
        ]))
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .create_async()
        .await;

    let ok = RecaptchaClient::new("captcha_secret".to_string())
        .with_base_url(server.url())
        .verify("token123")
        .await
        .expect("verification should succeed");

    mock.assert_async().await;
    assert!(ok);
}

#[tokio::test]
async fn verify_rejects_failed_response() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/siteverify")
        .with_status(200)
        .with_body(r#"{"success":false,"error-codes":["invalid-input-response"]}"#)
        .create_async()
        .await;

    let ok = RecaptchaClient::new("captcha_secret".to_string())
        .with_base_url(server.url())
        .verify("bogus")
        .await
        .expect("API call should succeed");
    assert!(!ok);
}

#[tokio::test]
async fn empty_secret_fails_closed_without_network() {
    let ok = RecaptchaClient::new(String::new())
        .verify("anything")
        .await
        .expect("unconfigured client should not error");
    assert!(!ok);
}
