use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub project_id: ObjectId,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<ObjectId>,
    pub deadline: Option<DateTime>,
    #[serde(default)]
    pub status: SubtaskStatus,
    pub created_by: ObjectId,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub deleted_at: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl Subtask {
    pub const COLLECTION: &'static str = "subtasks";
}
