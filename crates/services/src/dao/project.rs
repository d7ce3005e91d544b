use bson::{doc, oid::ObjectId, DateTime};
use mongodb::Database;
use taskhub_db::models::{project::permissions, Project, ProjectMember};

use super::base::{BaseDao, DaoError, DaoResult};

/// Outcome of the permission gate. `has_access` already accounts for the
/// required permission bit, so route handlers only branch on it.
#[derive(Debug, Clone, Copy)]
pub struct AccessSummary {
    pub has_access: bool,
    pub is_leader: bool,
    pub permissions: u64,
}

pub struct ProjectDao {
    pub base: BaseDao<Project>,
    pub members: BaseDao<ProjectMember>,
}

impl ProjectDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Project::COLLECTION),
            members: BaseDao::new(db, ProjectMember::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        name: String,
        description: Option<String>,
        leader_id: ObjectId,
    ) -> DaoResult<Project> {
        let now = DateTime::now();
        let project = Project {
            id: None,
            name,
            description,
            leader_id,
            is_archived: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        let project_id = self.base.insert_one(&project).await?;

        // The leader is also a member row so member listings include them
        self.add_member(project_id, leader_id, permissions::ALL, None)
            .await?;

        self.base.find_by_id(project_id).await
    }

    pub async fn add_member(
        &self,
        project_id: ObjectId,
        user_id: ObjectId,
        member_permissions: u64,
        invited_by: Option<ObjectId>,
    ) -> DaoResult<ProjectMember> {
        let now = DateTime::now();
        let member = ProjectMember {
            id: None,
            project_id,
            user_id,
            permissions: member_permissions,
            joined_at: now,
            invited_by,
            created_at: now,
            updated_at: now,
        };

        let id = self.members.insert_one(&member).await?;
        self.members.find_by_id(id).await
    }

    pub async fn grant_permissions(
        &self,
        project_id: ObjectId,
        user_id: ObjectId,
        granted: u64,
    ) -> DaoResult<bool> {
        self.members
            .update_one(
                doc! { "project_id": project_id, "user_id": user_id },
                doc! { "$bit": { "permissions": { "or": granted as i64 } } },
            )
            .await
    }

    pub async fn find_user_projects(&self, user_id: ObjectId) -> DaoResult<Vec<Project>> {
        let memberships = self
            .members
            .find_many(doc! { "user_id": user_id }, None)
            .await?;

        let project_ids: Vec<ObjectId> = memberships.iter().map(|m| m.project_id).collect();

        if project_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.base
            .find_many(
                doc! { "_id": { "$in": project_ids }, "deleted_at": null },
                Some(doc! { "name": 1 }),
            )
            .await
    }

    pub async fn list_member_ids(&self, project_id: ObjectId) -> DaoResult<Vec<ObjectId>> {
        let members = self
            .members
            .find_many(doc! { "project_id": project_id }, None)
            .await?;
        Ok(members.into_iter().map(|m| m.user_id).collect())
    }

    /// The permission gate. Re-run on every call — permissions can be
    /// revoked between requests, so nothing here is cached.
    ///
    /// Unknown project is `DaoError::NotFound` (callers map it to 404, not
    /// 403, so absence and denial stay distinguishable). A leader always
    /// passes; a member passes only if the required bit, when given, is in
    /// their granted permissions.
    pub async fn check_access(
        &self,
        project_id: ObjectId,
        user_id: ObjectId,
        required: Option<u64>,
    ) -> DaoResult<AccessSummary> {
        let project = self
            .base
            .find_one(doc! { "_id": project_id, "deleted_at": null })
            .await?
            .ok_or(DaoError::NotFound)?;

        if project.leader_id == user_id {
            return Ok(AccessSummary {
                has_access: true,
                is_leader: true,
                permissions: permissions::ALL,
            });
        }

        let member = self
            .members
            .find_one(doc! { "project_id": project_id, "user_id": user_id })
            .await?;

        let Some(member) = member else {
            return Ok(AccessSummary {
                has_access: false,
                is_leader: false,
                permissions: 0,
            });
        };

        let has_access = match required {
            Some(bit) => permissions::has(member.permissions, bit),
            None => true,
        };

        Ok(AccessSummary {
            has_access,
            is_leader: false,
            permissions: member.permissions,
        })
    }
}
