use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use taskhub_config::DispatchSettings;
use taskhub_db::models::NotificationKind;
use tracing::debug;

// ---- Wire types ----------------------------------------------------------

/// Payload handed to the dispatch service at enqueue time and posted back to
/// our webhook at (or after) the scheduled instant. Field names are the
/// service's wire contract, hence the camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPayload {
    #[serde(rename = "notificationId")]
    pub notification_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(rename = "entityId")]
    pub entity_id: String,
}

// ---- Error type ----------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch API error: {0}")]
    Api(String),
    #[error("Dispatch response missing message id")]
    MissingMessageId,
    #[error("Invalid webhook signature")]
    InvalidSignature,
}

// ---- Client trait --------------------------------------------------------

/// Narrow interface over the delayed-message dispatch service. Delivery is
/// at-least-once: the service may call the webhook more than once per
/// message, or after the notification was cancelled. `cancel` is best
/// effort and callers never treat its failure as fatal.
#[async_trait]
pub trait DispatchClient: Send + Sync {
    async fn enqueue(
        &self,
        at: DateTime<Utc>,
        payload: &DispatchPayload,
    ) -> Result<String, DispatchError>;

    async fn cancel(&self, message_id: &str) -> Result<(), DispatchError>;
}

// ---- HTTP implementation -------------------------------------------------

pub struct HttpDispatchClient {
    settings: DispatchSettings,
    client: reqwest::Client,
}

impl HttpDispatchClient {
    pub fn new(settings: &DispatchSettings) -> Self {
        Self {
            settings: settings.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DispatchClient for HttpDispatchClient {
    async fn enqueue(
        &self,
        at: DateTime<Utc>,
        payload: &DispatchPayload,
    ) -> Result<String, DispatchError> {
        let body = serde_json::json!({
            "url": self.settings.callback_url,
            "not_before": at.timestamp(),
            "body": payload,
        });

        let resp: serde_json::Value = self
            .client
            .post(format!("{}/v1/messages", self.settings.base_url))
            .bearer_auth(&self.settings.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Api(e.to_string()))?
            .json()
            .await
            .map_err(|e| DispatchError::Api(e.to_string()))?;

        if let Some(err) = resp.get("error") {
            return Err(DispatchError::Api(
                err.as_str().unwrap_or("Unknown dispatch error").to_string(),
            ));
        }

        let message_id = resp["messageId"]
            .as_str()
            .ok_or(DispatchError::MissingMessageId)?
            .to_string();

        debug!(%message_id, at = %at, "Enqueued dispatch message");
        Ok(message_id)
    }

    async fn cancel(&self, message_id: &str) -> Result<(), DispatchError> {
        let resp = self
            .client
            .delete(format!(
                "{}/v1/messages/{}",
                self.settings.base_url, message_id
            ))
            .bearer_auth(&self.settings.token)
            .send()
            .await
            .map_err(|e| DispatchError::Api(e.to_string()))?;

        // 404 means the job already fired or was removed — fine either way
        if !resp.status().is_success() && resp.status().as_u16() != 404 {
            return Err(DispatchError::Api(format!(
                "cancel returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

// ---- Mock implementation (tests, local dev) ------------------------------

#[derive(Debug, Clone)]
pub struct EnqueuedMessage {
    pub message_id: String,
    pub at: DateTime<Utc>,
    pub payload: DispatchPayload,
}

#[derive(Default)]
pub struct MockDispatchClient {
    enqueued: Mutex<Vec<EnqueuedMessage>>,
    cancelled: Mutex<Vec<String>>,
    next_id: AtomicU64,
    fail_enqueues: AtomicU32,
    fail_cancels: AtomicU32,
}

impl MockDispatchClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` enqueue calls fail.
    pub fn fail_next_enqueues(&self, n: u32) {
        self.fail_enqueues.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_cancels(&self, n: u32) {
        self.fail_cancels.store(n, Ordering::SeqCst);
    }

    pub fn enqueued(&self) -> Vec<EnqueuedMessage> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl DispatchClient for MockDispatchClient {
    async fn enqueue(
        &self,
        at: DateTime<Utc>,
        payload: &DispatchPayload,
    ) -> Result<String, DispatchError> {
        if self
            .fail_enqueues
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DispatchError::Api("injected enqueue failure".to_string()));
        }

        let message_id = format!("mock-msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.enqueued.lock().unwrap().push(EnqueuedMessage {
            message_id: message_id.clone(),
            at,
            payload: payload.clone(),
        });
        Ok(message_id)
    }

    async fn cancel(&self, message_id: &str) -> Result<(), DispatchError> {
        if self
            .fail_cancels
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DispatchError::Api("injected cancel failure".to_string()));
        }

        self.cancelled.lock().unwrap().push(message_id.to_string());
        Ok(())
    }
}

// ---- Webhook signature ---------------------------------------------------

/// Verify the signature header on an inbound webhook call:
/// `t=<unix-ts>,v1=<hex hmac-sha256 of "{t}.{body}">`. Must pass before any
/// state is read.
pub fn verify_signature(
    webhook_secret: &str,
    payload: &[u8],
    sig_header: &str,
) -> Result<(), DispatchError> {
    let mut timestamp = None;
    let mut signatures: Vec<String> = Vec::new();

    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t.to_string());
        } else if let Some(v1) = part.strip_prefix("v1=") {
            signatures.push(v1.to_string());
        }
    }

    let timestamp = timestamp.ok_or(DispatchError::InvalidSignature)?;
    if signatures.is_empty() {
        return Err(DispatchError::InvalidSignature);
    }

    let expected = compute_signature(webhook_secret, &timestamp, payload)
        .ok_or(DispatchError::InvalidSignature)?;

    if signatures.iter().any(|s| s == &expected) {
        Ok(())
    } else {
        Err(DispatchError::InvalidSignature)
    }
}

/// Build a valid signature header for a payload. The dispatch service does
/// this on its side; we need it for the mock path and the webhook tests.
pub fn signature_header(webhook_secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let sig = compute_signature(webhook_secret, &timestamp.to_string(), payload)
        .unwrap_or_default();
    format!("t={timestamp},v1={sig}")
}

fn compute_signature(secret: &str, timestamp: &str, payload: &[u8]) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let signed_payload = format!("{timestamp}.{}", String::from_utf8_lossy(payload));
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(signed_payload.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}
