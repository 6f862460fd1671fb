use serde::Deserialize;

const VERIFY_API_URL: &str = "https://www.google.com/recaptcha/api";

/// Server-side reCAPTCHA verification for forms open to anonymous traffic.
#[derive(Debug, Clone)]
pub struct RecaptchaClient {
    secret: String,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecaptchaError {
    #[error("network error: {0}")]
    Network(String),
    #[error("verification API error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

impl RecaptchaClient {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            client: reqwest::Client::new(),
            base_url: VERIFY_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Returns whether the captcha response checks out. An unconfigured
    /// secret fails closed.
    pub async fn verify(&self, token: &str) -> Result<bool, RecaptchaError> {
        if self.secret.is_empty() {
            return Ok(false);
        }

        let response = self
            .client
            .post(format!("{}/siteverify", self.base_url))
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await
            .map_err(|e| RecaptchaError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecaptchaError::Api(format!("HTTP {status}")));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| RecaptchaError::Api(e.to_string()))?;
        if !body.success && !body.error_codes.is_empty() {
            tracing::debug!("captcha rejected: {:?}", body.error_codes);
        }
        Ok(body.success)
    }
}
