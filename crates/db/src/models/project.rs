use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: Option<String>,
    pub leader_id: ObjectId,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub deleted_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMember {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub project_id: ObjectId,
    pub user_id: ObjectId,
    #[serde(default)]
    pub permissions: u64,
    pub joined_at: DateTime,
    pub invited_by: Option<ObjectId>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Permission bits (u64 bitfield)
pub mod permissions {
    pub const VIEW_PROJECT: u64 = 1 << 0;
    pub const MANAGE_TASKS: u64 = 1 << 1;
    pub const MANAGE_EVENTS: u64 = 1 << 2;
    pub const MANAGE_NOTIFICATIONS: u64 = 1 << 3;
    pub const MANAGE_MEMBERS: u64 = 1 << 4;
    pub const MANAGE_PROJECT: u64 = 1 << 5;
    pub const ADMINISTRATOR: u64 = 1 << 6;

    /// Default member permissions
    pub const DEFAULT_MEMBER: u64 = VIEW_PROJECT | MANAGE_TASKS | MANAGE_EVENTS;

    /// Everything a leader holds implicitly
    pub const ALL: u64 = (1 << 7) - 1;

    pub fn has(permissions: u64, flag: u64) -> bool {
        permissions & ADMINISTRATOR != 0 || permissions & flag == flag
    }
}

impl Project {
    pub const COLLECTION: &'static str = "projects";
}

impl ProjectMember {
    pub const COLLECTION: &'static str = "project_members";
}
