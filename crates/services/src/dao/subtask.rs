use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use taskhub_db::models::{Subtask, SubtaskStatus};

use super::base::{BaseDao, DaoResult};

pub struct SubtaskDao {
    pub base: BaseDao<Subtask>,
}

impl SubtaskDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Subtask::COLLECTION),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        project_id: ObjectId,
        title: String,
        description: Option<String>,
        assignee_id: Option<ObjectId>,
        deadline: Option<DateTime>,
        created_by: ObjectId,
    ) -> DaoResult<Subtask> {
        let now = DateTime::now();
        let subtask = Subtask {
            id: None,
            project_id,
            title,
            description,
            assignee_id,
            deadline,
            status: SubtaskStatus::Todo,
            created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let id = self.base.insert_one(&subtask).await?;
        self.base.find_by_id(id).await
    }

    pub async fn find_by_project(&self, project_id: ObjectId) -> DaoResult<Vec<Subtask>> {
        self.base
            .find_many(
                doc! { "project_id": project_id, "deleted_at": null },
                Some(doc! { "created_at": -1 }),
            )
            .await
    }

    pub async fn set_status(
        &self,
        project_id: ObjectId,
        subtask_id: ObjectId,
        status: &SubtaskStatus,
    ) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": subtask_id, "project_id": project_id },
                doc! { "$set": { "status": bson::to_bson(status)? } },
            )
            .await
    }

    pub async fn set_deadline(
        &self,
        project_id: ObjectId,
        subtask_id: ObjectId,
        deadline: Option<DateTime>,
        assignee_id: Option<ObjectId>,
    ) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": subtask_id, "project_id": project_id },
                doc! { "$set": { "deadline": deadline, "assignee_id": assignee_id } },
            )
            .await
    }
}
