use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use taskhub_db::models::User;

use super::base::{BaseDao, DaoError, DaoResult};

pub struct UserDao {
    pub base: BaseDao<User>,
}

impl UserDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, User::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        email: String,
        username: String,
        display_name: String,
        password_hash: String,
    ) -> DaoResult<User> {
        let now = DateTime::now();
        let user = User {
            id: None,
            email,
            username,
            display_name,
            password_hash: Some(password_hash),
            timezone: "UTC".to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let id = self.base.insert_one(&user).await?;
        self.base.find_by_id(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> DaoResult<User> {
        self.base
            .find_one(doc! { "email": email, "deleted_at": null })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_by_username(&self, username: &str) -> DaoResult<User> {
        self.base
            .find_one(doc! { "username": username, "deleted_at": null })
            .await?
            .ok_or(DaoError::NotFound)
    }

    /// Resolves each id to its user's email address. Ids that don't resolve
    /// (deleted users, stale references) are silently dropped — fulfillment
    /// decides what an empty result means.
    pub async fn resolve_emails(&self, user_ids: &[ObjectId]) -> DaoResult<Vec<String>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = self
            .base
            .find_many(
                doc! { "_id": { "$in": user_ids.to_vec() }, "deleted_at": null },
                None,
            )
            .await?;

        Ok(users.into_iter().map(|u| u.email).collect())
    }
}
