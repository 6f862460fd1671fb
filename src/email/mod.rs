use serde::Serialize;

pub mod templates;

const MAIL_API_URL: &str = "https://api.resend.com";

/// Thin client for the transactional email API. Callers are expected to log
/// and swallow failures; a lost email must never fail the payment flow that
/// triggered it.
#[derive(Debug, Clone)]
pub struct MailClient {
    api_key: String,
    from_address: String,
    from_name: String,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail API error: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: String,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl MailClient {
    pub fn new(api_key: String, from_address: String, from_name: String) -> Self {
        Self {
            api_key,
            from_address,
            from_name,
            client: reqwest::Client::new(),
            base_url: MAIL_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        let body = SendRequest {
            from: format!("{} <{}>", self.from_name, self.from_address),
            to: [to],
            subject,
            html,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MailError::Api(format!("HTTP {}: {}", status, text)));
        }
        Ok(())
    }
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_metacharacters() {
        assert_eq!(
            html_escape(r#"<b>"Tom & Jerry"</b>"#),
            "&lt;b&gt;&quot;Tom &amp; Jerry&quot;&lt;/b&gt;"
        );
    }
}
