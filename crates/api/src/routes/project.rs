use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use taskhub_db::models::{Project, project::permissions};

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub leader_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    /// Named permissions; defaults to the standard member set.
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct GrantPermissionsRequest {
    pub permissions: Vec<String>,
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>), ApiError> {
    let project = state
        .projects
        .create(body.name, body.description, auth.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(to_response(project))))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ProjectResponse>>, ApiError> {
    let projects = state.projects.find_user_projects(auth.user_id).await?;
    Ok(Json(projects.into_iter().map(to_response).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let pid = parse_oid(&project_id)?;

    let access = state.projects.check_access(pid, auth.user_id, None).await?;
    if !access.has_access {
        return Err(ApiError::Forbidden("Not a project member".to_string()));
    }

    let project = state.projects.base.find_by_id(pid).await?;
    Ok(Json(to_response(project)))
}

pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pid = parse_oid(&project_id)?;
    let uid = parse_oid(&body.user_id)?;

    let access = state
        .projects
        .check_access(pid, auth.user_id, Some(permissions::MANAGE_MEMBERS))
        .await?;
    if !access.has_access {
        return Err(ApiError::Forbidden(
            "Missing member management permission".to_string(),
        ));
    }

    let perms = match body.permissions {
        Some(names) => parse_permission_names(&names)?,
        None => permissions::DEFAULT_MEMBER,
    };

    state
        .projects
        .add_member(pid, uid, perms, Some(auth.user_id))
        .await?;

    Ok(Json(serde_json::json!({ "added": true })))
}

pub async fn grant_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, user_id)): Path<(String, String)>,
    Json(body): Json<GrantPermissionsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pid = parse_oid(&project_id)?;
    let uid = parse_oid(&user_id)?;

    let access = state
        .projects
        .check_access(pid, auth.user_id, Some(permissions::MANAGE_MEMBERS))
        .await?;
    if !access.has_access {
        return Err(ApiError::Forbidden(
            "Missing member management permission".to_string(),
        ));
    }

    let granted = parse_permission_names(&body.permissions)?;
    let updated = state.projects.grant_permissions(pid, uid, granted).await?;

    Ok(Json(serde_json::json!({ "granted": updated })))
}

pub async fn members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let pid = parse_oid(&project_id)?;

    let access = state.projects.check_access(pid, auth.user_id, None).await?;
    if !access.has_access {
        return Err(ApiError::Forbidden("Not a project member".to_string()));
    }

    let ids = state.projects.list_member_ids(pid).await?;
    Ok(Json(ids.into_iter().map(|id| id.to_hex()).collect()))
}

fn parse_permission_names(names: &[String]) -> Result<u64, ApiError> {
    let mut bits = 0u64;
    for name in names {
        bits |= match name.as_str() {
            "view_project" => permissions::VIEW_PROJECT,
            "manage_tasks" => permissions::MANAGE_TASKS,
            "manage_events" => permissions::MANAGE_EVENTS,
            "manage_notifications" => permissions::MANAGE_NOTIFICATIONS,
            "manage_members" => permissions::MANAGE_MEMBERS,
            "manage_project" => permissions::MANAGE_PROJECT,
            "administrator" => permissions::ADMINISTRATOR,
            other => {
                return Err(ApiError::Validation(format!("Unknown permission: {other}")));
            }
        };
    }
    Ok(bits)
}

fn to_response(project: Project) -> ProjectResponse {
    ProjectResponse {
        id: project.id.map(|id| id.to_hex()).unwrap_or_default(),
        name: project.name,
        description: project.description,
        leader_id: project.leader_id.to_hex(),
    }
}

pub(crate) fn parse_oid(s: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(s).map_err(|_| ApiError::BadRequest(format!("Invalid id: {s}")))
}
