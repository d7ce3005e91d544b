use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskhub_db::models::{Subtask, SubtaskStatus, project::permissions};

use super::project::parse_oid;
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateSubtaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<String>,
    /// RFC 3339 instant.
    pub deadline: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubtaskRequest {
    pub status: Option<SubtaskStatus>,
    pub deadline: Option<String>,
    pub assignee_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubtaskResponse {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<String>,
    pub deadline: Option<String>,
    pub status: SubtaskStatus,
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<CreateSubtaskRequest>,
) -> Result<(StatusCode, Json<SubtaskResponse>), ApiError> {
    let pid = parse_oid(&project_id)?;
    require_task_access(&state, pid, auth.user_id).await?;

    let assignee_id = body
        .assignee_id
        .as_deref()
        .map(parse_oid)
        .transpose()?;
    let deadline = body.deadline.as_deref().map(parse_instant).transpose()?;

    let subtask = state
        .subtasks
        .create(
            pid,
            body.title,
            body.description,
            assignee_id,
            deadline.map(bson::DateTime::from_chrono),
            auth.user_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(to_response(subtask))))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<SubtaskResponse>>, ApiError> {
    let pid = parse_oid(&project_id)?;
    require_member(&state, pid, auth.user_id).await?;

    let subtasks = state.subtasks.find_by_project(pid).await?;
    Ok(Json(subtasks.into_iter().map(to_response).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, subtask_id)): Path<(String, String)>,
) -> Result<Json<SubtaskResponse>, ApiError> {
    let pid = parse_oid(&project_id)?;
    let sid = parse_oid(&subtask_id)?;
    require_member(&state, pid, auth.user_id).await?;

    let subtask = state.subtasks.base.find_by_id_in_project(pid, sid).await?;
    Ok(Json(to_response(subtask)))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, subtask_id)): Path<(String, String)>,
    Json(body): Json<UpdateSubtaskRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pid = parse_oid(&project_id)?;
    let sid = parse_oid(&subtask_id)?;
    require_task_access(&state, pid, auth.user_id).await?;

    if let Some(ref status) = body.status {
        state.subtasks.set_status(pid, sid, status).await?;
    }

    if body.deadline.is_some() || body.assignee_id.is_some() {
        let current = state.subtasks.base.find_by_id_in_project(pid, sid).await?;
        let deadline = match body.deadline.as_deref() {
            Some(raw) => Some(bson::DateTime::from_chrono(parse_instant(raw)?)),
            None => current.deadline,
        };
        let assignee_id = match body.assignee_id.as_deref() {
            Some(raw) => Some(parse_oid(raw)?),
            None => current.assignee_id,
        };
        state
            .subtasks
            .set_deadline(pid, sid, deadline, assignee_id)
            .await?;
    }

    Ok(Json(serde_json::json!({ "updated": true })))
}

async fn require_member(
    state: &AppState,
    project_id: ObjectId,
    user_id: ObjectId,
) -> Result<(), ApiError> {
    let access = state.projects.check_access(project_id, user_id, None).await?;
    if !access.has_access {
        return Err(ApiError::Forbidden("Not a project member".to_string()));
    }
    Ok(())
}

async fn require_task_access(
    state: &AppState,
    project_id: ObjectId,
    user_id: ObjectId,
) -> Result<(), ApiError> {
    let access = state
        .projects
        .check_access(project_id, user_id, Some(permissions::MANAGE_TASKS))
        .await?;
    if !access.has_access {
        return Err(ApiError::Forbidden(
            "Missing task management permission".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn parse_instant(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ApiError::BadRequest(format!("Invalid RFC 3339 instant: {raw}")))
}

fn to_response(subtask: Subtask) -> SubtaskResponse {
    SubtaskResponse {
        id: subtask.id.map(|id| id.to_hex()).unwrap_or_default(),
        project_id: subtask.project_id.to_hex(),
        title: subtask.title,
        description: subtask.description,
        assignee_id: subtask.assignee_id.map(|id| id.to_hex()),
        deadline: subtask.deadline.map(|d| d.to_chrono().to_rfc3339()),
        status: subtask.status,
    }
}
