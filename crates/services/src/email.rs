use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use taskhub_config::EmailSettings;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Email API error: {0}")]
    Api(String),
    #[error("Email provider rejected the send: {0}")]
    Rejected(String),
}

/// Narrow interface over the transactional email provider. Returns the
/// provider's message id on success.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        html: &str,
    ) -> Result<String, EmailError>;
}

// ---- HTTP implementation -------------------------------------------------

pub struct HttpEmailProvider {
    settings: EmailSettings,
    client: reqwest::Client,
}

impl HttpEmailProvider {
    pub fn new(settings: &EmailSettings) -> Self {
        Self {
            settings: settings.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        html: &str,
    ) -> Result<String, EmailError> {
        let body = serde_json::json!({
            "from": self.settings.from,
            "to": to,
            "subject": subject,
            "html": html,
        });

        let resp: serde_json::Value = self
            .client
            .post(format!("{}/emails", self.settings.base_url))
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::Api(e.to_string()))?
            .json()
            .await
            .map_err(|e| EmailError::Api(e.to_string()))?;

        if let Some(err) = resp.get("error") {
            return Err(EmailError::Rejected(
                err["message"]
                    .as_str()
                    .unwrap_or("Unknown provider error")
                    .to_string(),
            ));
        }

        let id = resp["id"]
            .as_str()
            .ok_or_else(|| EmailError::Api("No message id in response".to_string()))?
            .to_string();

        debug!(%id, recipients = to.len(), "Email accepted by provider");
        Ok(id)
    }
}

// ---- Mock implementation (tests, local dev) ------------------------------

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[derive(Default)]
pub struct MockEmailProvider {
    sent: Mutex<Vec<SentEmail>>,
    next_id: AtomicU64,
    fail_sends: AtomicU32,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` send calls fail.
    pub fn fail_next_sends(&self, n: u32) {
        self.fail_sends.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        html: &str,
    ) -> Result<String, EmailError> {
        if self
            .fail_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EmailError::Rejected("injected send failure".to_string()));
        }

        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_vec(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(format!("mock-email-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}
