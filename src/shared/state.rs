use crate::config::AppConfig;
use crate::contact::recaptcha::RecaptchaClient;
use crate::email::MailClient;
use crate::payments::PaymentClient;
use crate::shared::utils::DbPool;

/// Shared per-process state handed to every handler. All fields are cheap to
/// clone; the pool and the reqwest clients are internally reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub payments: PaymentClient,
    pub mailer: MailClient,
    pub recaptcha: RecaptchaClient,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig) -> Self {
        let payments = PaymentClient::new(
            config.payments.secret_key.clone(),
            config.payments.webhook_secret.clone(),
        );
        let mailer = MailClient::new(
            config.email.api_key.clone(),
            config.email.from_address.clone(),
            config.email.from_name.clone(),
        );
        let recaptcha = RecaptchaClient::new(config.recaptcha.secret.clone());
        Self {
            conn,
            config,
            payments,
            mailer,
            recaptcha,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("conn", &"DbPool")
            .field("base_url", &self.config.site.base_url)
            .finish()
    }
}
