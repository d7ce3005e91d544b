use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// A persisted intent to send exactly one reminder email at a future
/// instant. Rows are never deleted; history stays queryable for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledNotification {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub kind: NotificationKind,
    /// Subtask or event id, depending on `kind`.
    pub entity_id: ObjectId,
    pub project_id: ObjectId,
    /// Exactly one recipient for subtask reminders; one or more for events.
    /// Fan-out happens at fulfillment time, not at creation.
    pub recipient_ids: Vec<ObjectId>,
    pub days_before: i64,
    /// Optional "HH:MM" send time in UTC; falls back to the target's own
    /// time-of-day.
    pub send_time: Option<String>,
    pub scheduled_for: DateTime,
    #[serde(default)]
    pub status: NotificationStatus,
    /// Id assigned by the delayed-message dispatch service.
    pub external_message_id: Option<String>,
    /// Id assigned by the email provider once the send succeeded.
    pub email_id: Option<String>,
    pub error: Option<String>,
    /// Set for every terminal processing attempt (sent, skipped, failed).
    pub sent_at: Option<DateTime>,
    pub created_by: ObjectId,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Subtask,
    Event,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Subtask => "subtask",
            NotificationKind::Event => "event",
        }
    }
}

/// `Pending` is the only non-terminal state. Every transition out of it is
/// final; nothing ever moves back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    /// Fulfillment fired but sending had become meaningless (subtask already
    /// completed, no resolvable recipients). A successful no-send.
    Skipped,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NotificationStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Skipped => "skipped",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Cancelled => "cancelled",
        }
    }
}

impl ScheduledNotification {
    pub const COLLECTION: &'static str = "scheduled_notifications";
}
