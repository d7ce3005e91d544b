use bson::oid::ObjectId;
use mongodb::Database;
use std::sync::Arc;
use taskhub_db::models::{
    Event, NotificationKind, NotificationStatus, ScheduledNotification, Subtask, SubtaskStatus,
};
use tracing::{info, warn};

use crate::dao::base::DaoError;
use crate::dao::event::EventDao;
use crate::dao::notification::NotificationDao;
use crate::dao::subtask::SubtaskDao;
use crate::dao::user::UserDao;
use crate::dispatch::DispatchPayload;
use crate::email::EmailProvider;

/// How a webhook delivery was handled. Every variant is an HTTP 200 to the
/// dispatch service — only infrastructure failures (`FulfillmentError`)
/// become 5xx and trigger a redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    /// Email accepted by the provider; row is `sent`.
    Sent,
    /// Sending had become meaningless (completed subtask, no resolvable
    /// recipients); row is `skipped`.
    Skipped,
    /// Entity or precondition gone, or the provider refused the send; row
    /// is `failed`. Still a 200: the engine owns retry policy, not the
    /// dispatch service.
    Failed,
    /// Nothing to do: unknown id, already-terminal row, or a lost race.
    NoOp,
}

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error("Store error: {0}")]
    Dao(#[from] DaoError),
}

/// Executes webhook callbacks from the dispatch service: loads the row,
/// enforces the idempotency guard, re-reads entity and recipients fresh,
/// sends the email and records the terminal outcome.
pub struct FulfillmentService {
    notifications: NotificationDao,
    subtasks: SubtaskDao,
    events: EventDao,
    users: UserDao,
    email: Arc<dyn EmailProvider>,
}

impl FulfillmentService {
    pub fn new(db: &Database, email: Arc<dyn EmailProvider>) -> Self {
        Self {
            notifications: NotificationDao::new(db),
            subtasks: SubtaskDao::new(db),
            events: EventDao::new(db),
            users: UserDao::new(db),
            email,
        }
    }

    pub async fn fulfill(
        &self,
        payload: &DispatchPayload,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        let Ok(notification_id) = ObjectId::parse_str(&payload.notification_id) else {
            warn!(id = %payload.notification_id, "Webhook carried a malformed notification id");
            return Ok(FulfillmentOutcome::NoOp);
        };

        // Missing row is success-no-op, not an error
        let Some(notification) = self
            .notifications
            .base
            .find_one(bson::doc! { "_id": notification_id })
            .await?
        else {
            info!(%notification_id, "Webhook for unknown notification, nothing to do");
            return Ok(FulfillmentOutcome::NoOp);
        };

        // Fast-path idempotency guard; the conditional transition below is
        // the authoritative one.
        if notification.status != NotificationStatus::Pending {
            info!(
                %notification_id,
                status = notification.status.as_str(),
                "Notification already terminal, ignoring redelivery"
            );
            return Ok(FulfillmentOutcome::NoOp);
        }

        let outcome = match notification.kind {
            NotificationKind::Subtask => self.fulfill_subtask(&notification).await?,
            NotificationKind::Event => self.fulfill_event(&notification).await?,
        };

        info!(%notification_id, ?outcome, "Webhook fulfillment handled");
        Ok(outcome)
    }

    /// Entity and recipient are resolved fresh: deadline, assignee and
    /// status may all have changed since scheduling time.
    async fn fulfill_subtask(
        &self,
        notification: &ScheduledNotification,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        let notification_id = notification.id.expect("loaded row has an id");

        let Some(subtask) = self
            .subtasks
            .base
            .find_one(bson::doc! { "_id": notification.entity_id, "deleted_at": null })
            .await?
        else {
            return self
                .finalize(
                    notification_id,
                    NotificationStatus::Failed,
                    None,
                    Some("subtask no longer exists"),
                    FulfillmentOutcome::Failed,
                )
                .await;
        };

        // Completed means there is nothing left to remind about — a
        // successful skip, not a failure, but the row must still leave
        // `pending` so redeliveries stay no-ops.
        if subtask.status == SubtaskStatus::Completed {
            return self
                .finalize(
                    notification_id,
                    NotificationStatus::Skipped,
                    None,
                    None,
                    FulfillmentOutcome::Skipped,
                )
                .await;
        }

        // The preconditions that held at scheduling time must still hold
        let (Some(deadline), Some(assignee_id)) = (subtask.deadline, subtask.assignee_id) else {
            return self
                .finalize(
                    notification_id,
                    NotificationStatus::Failed,
                    None,
                    Some("subtask lost its deadline or assignee"),
                    FulfillmentOutcome::Failed,
                )
                .await;
        };

        let recipients = self.users.resolve_emails(&[assignee_id]).await?;
        if recipients.is_empty() {
            return self
                .finalize(
                    notification_id,
                    NotificationStatus::Failed,
                    None,
                    Some("assignee has no resolvable email address"),
                    FulfillmentOutcome::Failed,
                )
                .await;
        }

        let (subject, html) = render_subtask_email(&subtask, deadline);
        self.send_and_record(notification_id, &recipients, &subject, &html)
            .await
    }

    async fn fulfill_event(
        &self,
        notification: &ScheduledNotification,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        let notification_id = notification.id.expect("loaded row has an id");

        let Some(event) = self
            .events
            .base
            .find_one(bson::doc! { "_id": notification.entity_id, "deleted_at": null })
            .await?
        else {
            return self
                .finalize(
                    notification_id,
                    NotificationStatus::Failed,
                    None,
                    Some("event no longer exists"),
                    FulfillmentOutcome::Failed,
                )
                .await;
        };

        // Recipient ids are resolved individually against the live user
        // store; stale ids drop out. Zero addresses is a no-op success.
        let recipients = self.users.resolve_emails(&notification.recipient_ids).await?;
        if recipients.is_empty() {
            return self
                .finalize(
                    notification_id,
                    NotificationStatus::Skipped,
                    None,
                    Some("no resolvable recipient addresses"),
                    FulfillmentOutcome::Skipped,
                )
                .await;
        }

        let (subject, html) = render_event_email(&event);
        self.send_and_record(notification_id, &recipients, &subject, &html)
            .await
    }

    async fn send_and_record(
        &self,
        notification_id: ObjectId,
        recipients: &[String],
        subject: &str,
        html: &str,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        match self.email.send(recipients, subject, html).await {
            Ok(email_id) => {
                self.finalize(
                    notification_id,
                    NotificationStatus::Sent,
                    Some(&email_id),
                    None,
                    FulfillmentOutcome::Sent,
                )
                .await
            }
            Err(e) => {
                warn!(%notification_id, error = %e, "Email provider send failed");
                self.finalize(
                    notification_id,
                    NotificationStatus::Failed,
                    None,
                    Some(&e.to_string()),
                    FulfillmentOutcome::Failed,
                )
                .await
            }
        }
    }

    /// Conditional pending → terminal write. Zero rows modified means a
    /// concurrent delivery or a cancel settled the row first; that caller
    /// wins and this one reports a no-op.
    async fn finalize(
        &self,
        notification_id: ObjectId,
        status: NotificationStatus,
        email_id: Option<&str>,
        error: Option<&str>,
        outcome: FulfillmentOutcome,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        let transitioned = self
            .notifications
            .transition(notification_id, status, email_id, error)
            .await?;

        if !transitioned {
            info!(%notification_id, "Lost the transition race, treating as no-op");
            return Ok(FulfillmentOutcome::NoOp);
        }
        Ok(outcome)
    }
}

// ---- Email rendering -----------------------------------------------------

fn render_subtask_email(subtask: &Subtask, deadline: bson::DateTime) -> (String, String) {
    let due = deadline.to_chrono().format("%Y-%m-%d %H:%M UTC");
    let subject = format!("Reminder: \"{}\" is due soon", subtask.title);
    let mut html = format!(
        "<h2>Task deadline reminder</h2>\
         <p><strong>{}</strong> is due on {due}.</p>",
        subtask.title
    );
    if let Some(ref description) = subtask.description {
        html.push_str(&format!("<p>{description}</p>"));
    }
    (subject, html)
}

fn render_event_email(event: &Event) -> (String, String) {
    let starts = event.starts_at.to_chrono().format("%Y-%m-%d %H:%M UTC");
    let subject = format!("Upcoming event: {}", event.title);
    let mut html = format!(
        "<h2>Event reminder</h2>\
         <p><strong>{}</strong> starts on {starts}.</p>",
        event.title
    );
    if let Some(ref location) = event.location {
        html.push_str(&format!("<p>Location: {location}</p>"));
    }
    if let Some(ref description) = event.description {
        html.push_str(&format!("<p>{description}</p>"));
    }
    (subject, html)
}
