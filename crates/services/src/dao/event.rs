use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use taskhub_db::models::Event;

use super::base::{BaseDao, DaoResult};

pub struct EventDao {
    pub base: BaseDao<Event>,
}

impl EventDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Event::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        project_id: ObjectId,
        title: String,
        description: Option<String>,
        location: Option<String>,
        starts_at: DateTime,
        created_by: ObjectId,
    ) -> DaoResult<Event> {
        let now = DateTime::now();
        let event = Event {
            id: None,
            project_id,
            title,
            description,
            location,
            starts_at,
            created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let id = self.base.insert_one(&event).await?;
        self.base.find_by_id(id).await
    }

    pub async fn find_by_project(&self, project_id: ObjectId) -> DaoResult<Vec<Event>> {
        self.base
            .find_many(
                doc! { "project_id": project_id, "deleted_at": null },
                Some(doc! { "starts_at": 1 }),
            )
            .await
    }
}
