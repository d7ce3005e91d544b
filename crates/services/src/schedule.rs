use bson::oid::ObjectId;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use mongodb::Database;
use std::sync::Arc;
use taskhub_db::models::{
    project::permissions, NotificationKind, ScheduledNotification, SubtaskStatus,
};
use tracing::{info, warn};

use crate::dao::base::DaoError;
use crate::dao::event::EventDao;
use crate::dao::notification::NotificationDao;
use crate::dao::project::ProjectDao;
use crate::dao::subtask::SubtaskDao;
use crate::dispatch::{DispatchClient, DispatchError, DispatchPayload};

// ---- Error type ----------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Validation: {0}")]
    Validation(String),
    #[error("Recipients are not project members: {}", .0.join(", "))]
    InvalidRecipients(Vec<String>),
    #[error("Access denied: {0}")]
    Denied(String),
    #[error("Not found")]
    NotFound,
    #[error("Notification is already terminal: {0}")]
    Terminal(String),
    #[error("Dispatch service error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Dao(DaoError),
}

impl From<DaoError> for ScheduleError {
    fn from(err: DaoError) -> Self {
        match err {
            DaoError::NotFound => ScheduleError::NotFound,
            other => ScheduleError::Dao(other),
        }
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

// ---- Time resolver -------------------------------------------------------

/// Compute the concrete send instant: `target − days_before days`, at the
/// supplied "HH:MM" (UTC) or at the target's own time-of-day. Past instants
/// are not clamped here; `ScheduleService` validation rejects them.
pub fn resolve_send_instant(
    target: DateTime<Utc>,
    days_before: i64,
    send_time: Option<&str>,
) -> ScheduleResult<DateTime<Utc>> {
    let base = target - Duration::days(days_before);

    match send_time {
        Some(raw) => {
            let time = parse_send_time(raw)?;
            Ok(base
                .date_naive()
                .and_time(time)
                .and_utc())
        }
        None => Ok(base),
    }
}

fn parse_send_time(raw: &str) -> ScheduleResult<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| ScheduleError::Validation(format!("Invalid send time (expected HH:MM): {raw}")))
}

fn validate_days_before(kind: NotificationKind, days_before: i64) -> ScheduleResult<()> {
    let min = match kind {
        // Same-day reminders only make sense for events
        NotificationKind::Subtask => 1,
        NotificationKind::Event => 0,
    };
    if days_before < min || days_before > 30 {
        return Err(ScheduleError::Validation(format!(
            "days_before must be between {min} and 30, got {days_before}"
        )));
    }
    Ok(())
}

// ---- Service -------------------------------------------------------------

/// Orchestrates permission gate, time resolver, notification store and
/// dispatch client for creation, cancellation and rescheduling.
pub struct ScheduleService {
    notifications: NotificationDao,
    projects: ProjectDao,
    subtasks: SubtaskDao,
    events: EventDao,
    dispatch: Arc<dyn DispatchClient>,
    /// Configured fallback "HH:MM" applied when a request carries no
    /// explicit send time.
    default_send_time: Option<String>,
}

impl ScheduleService {
    pub fn new(
        db: &Database,
        dispatch: Arc<dyn DispatchClient>,
        default_send_time: Option<String>,
    ) -> Self {
        Self {
            notifications: NotificationDao::new(db),
            projects: ProjectDao::new(db),
            subtasks: SubtaskDao::new(db),
            events: EventDao::new(db),
            dispatch,
            default_send_time,
        }
    }

    pub async fn schedule_for_subtask(
        &self,
        project_id: ObjectId,
        subtask_id: ObjectId,
        days_before: i64,
        send_time: Option<String>,
        created_by: ObjectId,
    ) -> ScheduleResult<ScheduledNotification> {
        validate_days_before(NotificationKind::Subtask, days_before)?;
        let send_time = send_time.or_else(|| self.default_send_time.clone());

        let subtask = self
            .subtasks
            .base
            .find_by_id_in_project(project_id, subtask_id)
            .await?;

        // Leader / granted permission / entity creator or assignee
        let access = self
            .projects
            .check_access(project_id, created_by, Some(permissions::MANAGE_NOTIFICATIONS))
            .await?;
        let is_involved =
            subtask.created_by == created_by || subtask.assignee_id == Some(created_by);
        if !access.has_access && !is_involved {
            return Err(ScheduleError::Denied(
                "No permission to schedule notifications in this project".to_string(),
            ));
        }

        let deadline = subtask.deadline.ok_or_else(|| {
            ScheduleError::Validation("Subtask has no deadline to remind about".to_string())
        })?;
        let assignee_id = subtask.assignee_id.ok_or_else(|| {
            ScheduleError::Validation("Subtask has no assignee to notify".to_string())
        })?;
        if subtask.status == SubtaskStatus::Completed {
            return Err(ScheduleError::Validation(
                "Subtask is already completed".to_string(),
            ));
        }

        if self
            .notifications
            .find_pending_for_entity(subtask_id)
            .await?
            .is_some()
        {
            return Err(ScheduleError::Validation(
                "A pending notification already exists for this subtask".to_string(),
            ));
        }

        let scheduled_for =
            resolve_send_instant(deadline.to_chrono(), days_before, send_time.as_deref())?;
        if scheduled_for <= Utc::now() {
            return Err(ScheduleError::Validation(format!(
                "Computed send instant {scheduled_for} is in the past"
            )));
        }

        self.persist_and_enqueue(
            NotificationKind::Subtask,
            subtask_id,
            project_id,
            vec![assignee_id],
            days_before,
            send_time,
            scheduled_for,
            created_by,
        )
        .await
    }

    pub async fn schedule_for_event(
        &self,
        project_id: ObjectId,
        event_id: ObjectId,
        days_before: i64,
        send_time: Option<String>,
        recipient_ids: Vec<ObjectId>,
        created_by: ObjectId,
    ) -> ScheduleResult<ScheduledNotification> {
        validate_days_before(NotificationKind::Event, days_before)?;
        let send_time = send_time.or_else(|| self.default_send_time.clone());

        if recipient_ids.is_empty() {
            return Err(ScheduleError::Validation(
                "recipient_ids must not be empty".to_string(),
            ));
        }

        let event = self
            .events
            .base
            .find_by_id_in_project(project_id, event_id)
            .await?;

        let access = self
            .projects
            .check_access(project_id, created_by, Some(permissions::MANAGE_NOTIFICATIONS))
            .await?;
        if !access.has_access && event.created_by != created_by {
            return Err(ScheduleError::Denied(
                "No permission to schedule notifications in this project".to_string(),
            ));
        }

        // Every recipient must be a current member; name the invalid subset
        let member_ids = self.projects.list_member_ids(project_id).await?;
        let invalid: Vec<String> = recipient_ids
            .iter()
            .filter(|id| !member_ids.contains(id))
            .map(|id| id.to_hex())
            .collect();
        if !invalid.is_empty() {
            return Err(ScheduleError::InvalidRecipients(invalid));
        }

        if self
            .notifications
            .find_pending_for_entity(event_id)
            .await?
            .is_some()
        {
            return Err(ScheduleError::Validation(
                "A pending notification already exists for this event".to_string(),
            ));
        }

        let scheduled_for =
            resolve_send_instant(event.starts_at.to_chrono(), days_before, send_time.as_deref())?;
        if scheduled_for <= Utc::now() {
            return Err(ScheduleError::Validation(format!(
                "Computed send instant {scheduled_for} is in the past"
            )));
        }

        self.persist_and_enqueue(
            NotificationKind::Event,
            event_id,
            project_id,
            recipient_ids,
            days_before,
            send_time,
            scheduled_for,
            created_by,
        )
        .await
    }

    /// Insert the pending row, enqueue the dispatch message (one retry),
    /// then attach the external id. A row whose enqueue failed twice is
    /// removed again before the error is surfaced — no permanently
    /// pending-but-undispatchable rows.
    #[allow(clippy::too_many_arguments)]
    async fn persist_and_enqueue(
        &self,
        kind: NotificationKind,
        entity_id: ObjectId,
        project_id: ObjectId,
        recipient_ids: Vec<ObjectId>,
        days_before: i64,
        send_time: Option<String>,
        scheduled_for: DateTime<Utc>,
        created_by: ObjectId,
    ) -> ScheduleResult<ScheduledNotification> {
        let mut notification = self
            .notifications
            .create(
                kind,
                entity_id,
                project_id,
                recipient_ids,
                days_before,
                send_time,
                bson::DateTime::from_chrono(scheduled_for),
                created_by,
            )
            .await?;
        let notification_id = notification.id.expect("inserted row has an id");

        let payload = DispatchPayload {
            notification_id: notification_id.to_hex(),
            kind,
            entity_id: entity_id.to_hex(),
        };

        let message_id = match self.dispatch.enqueue(scheduled_for, &payload).await {
            Ok(id) => id,
            Err(first) => {
                warn!(%notification_id, error = %first, "Dispatch enqueue failed, retrying once");
                match self.dispatch.enqueue(scheduled_for, &payload).await {
                    Ok(id) => id,
                    Err(second) => {
                        self.notifications.remove_undispatched(notification_id).await?;
                        return Err(second.into());
                    }
                }
            }
        };

        self.notifications
            .attach_external_message_id(notification_id, &message_id)
            .await?;
        notification.external_message_id = Some(message_id);

        info!(
            %notification_id,
            kind = kind.as_str(),
            %entity_id,
            scheduled_for = %scheduled_for,
            "Scheduled notification"
        );
        Ok(notification)
    }

    pub async fn cancel(
        &self,
        project_id: ObjectId,
        notification_id: ObjectId,
        caller: ObjectId,
    ) -> ScheduleResult<()> {
        let notification = self
            .notifications
            .base
            .find_by_id_in_project(project_id, notification_id)
            .await?;

        self.check_mutation_access(&notification, caller).await?;

        if notification.status.is_terminal() {
            return Err(ScheduleError::Terminal(
                notification.status.as_str().to_string(),
            ));
        }

        // Best effort; the webhook idempotency guard is the real backstop
        // if the external job fires anyway.
        if let Some(ref message_id) = notification.external_message_id {
            if let Err(e) = self.dispatch.cancel(message_id).await {
                warn!(%notification_id, %message_id, error = %e, "External cancel failed");
            }
        }

        let cancelled = self.notifications.cancel(notification_id).await?;
        if !cancelled {
            // Lost a race with a webhook delivery between read and write
            let current = self.notifications.base.find_by_id(notification_id).await?;
            return Err(ScheduleError::Terminal(current.status.as_str().to_string()));
        }

        info!(%notification_id, "Cancelled notification");
        Ok(())
    }

    /// Reschedule a pending notification. The replacement dispatch job is
    /// enqueued before the old one is cancelled, so a failure leaves the
    /// original schedule intact.
    pub async fn update(
        &self,
        project_id: ObjectId,
        notification_id: ObjectId,
        new_days_before: Option<i64>,
        new_send_time: Option<String>,
        caller: ObjectId,
    ) -> ScheduleResult<ScheduledNotification> {
        let notification = self
            .notifications
            .base
            .find_by_id_in_project(project_id, notification_id)
            .await?;

        self.check_mutation_access(&notification, caller).await?;

        if notification.status.is_terminal() {
            return Err(ScheduleError::Terminal(
                notification.status.as_str().to_string(),
            ));
        }

        let days_before = new_days_before.unwrap_or(notification.days_before);
        validate_days_before(notification.kind, days_before)?;
        let send_time = new_send_time.or_else(|| notification.send_time.clone());

        // Target instant is read fresh: deadlines and event dates may have
        // moved since the original scheduling call.
        let target = match notification.kind {
            NotificationKind::Subtask => {
                let subtask = self
                    .subtasks
                    .base
                    .find_by_id_in_project(notification.project_id, notification.entity_id)
                    .await?;
                subtask
                    .deadline
                    .ok_or_else(|| {
                        ScheduleError::Validation(
                            "Subtask no longer has a deadline".to_string(),
                        )
                    })?
                    .to_chrono()
            }
            NotificationKind::Event => {
                let event = self
                    .events
                    .base
                    .find_by_id_in_project(notification.project_id, notification.entity_id)
                    .await?;
                event.starts_at.to_chrono()
            }
        };

        let scheduled_for = resolve_send_instant(target, days_before, send_time.as_deref())?;
        if scheduled_for <= Utc::now() {
            return Err(ScheduleError::Validation(format!(
                "Computed send instant {scheduled_for} is in the past"
            )));
        }

        let payload = DispatchPayload {
            notification_id: notification_id.to_hex(),
            kind: notification.kind,
            entity_id: notification.entity_id.to_hex(),
        };
        let new_message_id = self.dispatch.enqueue(scheduled_for, &payload).await?;

        if let Some(ref old_message_id) = notification.external_message_id {
            if let Err(e) = self.dispatch.cancel(old_message_id).await {
                warn!(%notification_id, %old_message_id, error = %e, "External cancel of old job failed");
            }
        }

        let updated = self
            .notifications
            .reschedule(
                notification_id,
                days_before,
                send_time.as_deref(),
                bson::DateTime::from_chrono(scheduled_for),
                &new_message_id,
            )
            .await?;
        if !updated {
            // Webhook fired between read and write; withdraw the new job
            if let Err(e) = self.dispatch.cancel(&new_message_id).await {
                warn!(%notification_id, %new_message_id, error = %e, "Cancel of replacement job failed");
            }
            let current = self.notifications.base.find_by_id(notification_id).await?;
            return Err(ScheduleError::Terminal(current.status.as_str().to_string()));
        }

        info!(%notification_id, scheduled_for = %scheduled_for, "Rescheduled notification");
        self.notifications
            .base
            .find_by_id(notification_id)
            .await
            .map_err(Into::into)
    }

    /// Creator, or anyone the permission gate passes for the owning project.
    async fn check_mutation_access(
        &self,
        notification: &ScheduledNotification,
        caller: ObjectId,
    ) -> ScheduleResult<()> {
        if notification.created_by == caller {
            return Ok(());
        }

        let access = self
            .projects
            .check_access(
                notification.project_id,
                caller,
                Some(permissions::MANAGE_NOTIFICATIONS),
            )
            .await?;
        if !access.has_access {
            return Err(ScheduleError::Denied(
                "Only the creator or a member with notification access may modify this"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
