use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use taskhub_db::models::{Event, project::permissions};

use super::project::parse_oid;
use super::subtask::parse_instant;
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// RFC 3339 instant.
    pub starts_at: String,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: String,
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), ApiError> {
    let pid = parse_oid(&project_id)?;

    let access = state
        .projects
        .check_access(pid, auth.user_id, Some(permissions::MANAGE_EVENTS))
        .await?;
    if !access.has_access {
        return Err(ApiError::Forbidden(
            "Missing event management permission".to_string(),
        ));
    }

    let starts_at = parse_instant(&body.starts_at)?;

    let event = state
        .events
        .create(
            pid,
            body.title,
            body.description,
            body.location,
            bson::DateTime::from_chrono(starts_at),
            auth.user_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(to_response(event))))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<EventResponse>>, ApiError> {
    let pid = parse_oid(&project_id)?;

    let access = state.projects.check_access(pid, auth.user_id, None).await?;
    if !access.has_access {
        return Err(ApiError::Forbidden("Not a project member".to_string()));
    }

    let events = state.events.find_by_project(pid).await?;
    Ok(Json(events.into_iter().map(to_response).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, event_id)): Path<(String, String)>,
) -> Result<Json<EventResponse>, ApiError> {
    let pid = parse_oid(&project_id)?;
    let eid = parse_oid(&event_id)?;

    let access = state.projects.check_access(pid, auth.user_id, None).await?;
    if !access.has_access {
        return Err(ApiError::Forbidden("Not a project member".to_string()));
    }

    let event = state.events.base.find_by_id_in_project(pid, eid).await?;
    Ok(Json(to_response(event)))
}

fn to_response(event: Event) -> EventResponse {
    EventResponse {
        id: event.id.map(|id| id.to_hex()).unwrap_or_default(),
        project_id: event.project_id.to_hex(),
        title: event.title,
        description: event.description,
        location: event.location,
        starts_at: event.starts_at.to_chrono().to_rfc3339(),
    }
}
