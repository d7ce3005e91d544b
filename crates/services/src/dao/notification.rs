use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use taskhub_db::models::{NotificationKind, NotificationStatus, ScheduledNotification};

use super::base::{BaseDao, DaoResult, PaginatedResult, PaginationParams};

/// Single source of truth for scheduled-notification rows. Nothing else in
/// the workspace writes to this collection.
pub struct NotificationDao {
    pub base: BaseDao<ScheduledNotification>,
}

impl NotificationDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, ScheduledNotification::COLLECTION),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        kind: NotificationKind,
        entity_id: ObjectId,
        project_id: ObjectId,
        recipient_ids: Vec<ObjectId>,
        days_before: i64,
        send_time: Option<String>,
        scheduled_for: DateTime,
        created_by: ObjectId,
    ) -> DaoResult<ScheduledNotification> {
        let now = DateTime::now();
        let notification = ScheduledNotification {
            id: None,
            kind,
            entity_id,
            project_id,
            recipient_ids,
            days_before,
            send_time,
            scheduled_for,
            status: NotificationStatus::Pending,
            external_message_id: None,
            email_id: None,
            error: None,
            sent_at: None,
            created_by,
            created_at: now,
            updated_at: now,
        };

        let id = self.base.insert_one(&notification).await?;
        self.base.find_by_id(id).await
    }

    pub async fn attach_external_message_id(
        &self,
        id: ObjectId,
        message_id: &str,
    ) -> DaoResult<bool> {
        self.base
            .update_by_id(id, doc! { "$set": { "external_message_id": message_id } })
            .await
    }

    /// Rollback for a row whose dispatch enqueue never succeeded. The only
    /// deletion this collection ever sees.
    pub async fn remove_undispatched(&self, id: ObjectId) -> DaoResult<u64> {
        self.base
            .hard_delete(doc! { "_id": id, "external_message_id": null })
            .await
    }

    pub async fn find_pending_for_entity(
        &self,
        entity_id: ObjectId,
    ) -> DaoResult<Option<ScheduledNotification>> {
        self.base
            .find_one(doc! { "entity_id": entity_id, "status": "pending" })
            .await
    }

    pub async fn list_by_project(
        &self,
        project_id: ObjectId,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<ScheduledNotification>> {
        self.base
            .find_paginated(
                doc! { "project_id": project_id },
                Some(doc! { "created_at": -1 }),
                params,
            )
            .await
    }

    /// Atomic pending → terminal transition. The `status: "pending"` filter
    /// is the idempotency guard under at-least-once webhook delivery: a
    /// second delivery (or a cancel racing a fulfillment) matches zero
    /// documents and `false` comes back, which callers treat as "someone
    /// else already settled this row".
    pub async fn transition(
        &self,
        id: ObjectId,
        to: NotificationStatus,
        email_id: Option<&str>,
        error: Option<&str>,
    ) -> DaoResult<bool> {
        let mut set = doc! {
            "status": to.as_str(),
            "sent_at": DateTime::now(),
        };
        if let Some(email_id) = email_id {
            set.insert("email_id", email_id);
        }
        if let Some(error) = error {
            set.insert("error", error);
        }

        self.base
            .update_one(
                doc! { "_id": id, "status": "pending" },
                doc! { "$set": set },
            )
            .await
    }

    /// Pending → cancelled, same conditional guard. Separate from
    /// `transition` because cancellation is not a processing attempt and
    /// must not stamp `sent_at`.
    pub async fn cancel(&self, id: ObjectId) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": id, "status": "pending" },
                doc! { "$set": { "status": NotificationStatus::Cancelled.as_str() } },
            )
            .await
    }

    /// Rewrites the schedule of a still-pending row. Conditional on status
    /// for the same reason as `transition`: a webhook that fired in the
    /// meantime must not be overwritten back to a live schedule.
    pub async fn reschedule(
        &self,
        id: ObjectId,
        days_before: i64,
        send_time: Option<&str>,
        scheduled_for: DateTime,
        external_message_id: &str,
    ) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": id, "status": "pending" },
                doc! { "$set": {
                    "days_before": days_before,
                    "send_time": send_time,
                    "scheduled_for": scheduled_for,
                    "external_message_id": external_message_id,
                } },
            )
            .await
    }
}
