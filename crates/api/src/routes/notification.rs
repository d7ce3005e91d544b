use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use taskhub_db::models::ScheduledNotification;
use taskhub_services::dao::base::PaginationParams;

use super::project::parse_oid;
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ScheduleSubtaskRequest {
    pub subtask_id: String,
    pub days_before: i64,
    /// "HH:MM" in UTC; defaults to the deadline's own time-of-day.
    pub send_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleEventRequest {
    pub event_id: String,
    pub days_before: i64,
    pub send_time: Option<String>,
    pub recipient_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub days_before: Option<i64>,
    pub send_time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: String,
    pub kind: String,
    pub entity_id: String,
    pub project_id: String,
    pub recipient_ids: Vec<String>,
    pub days_before: i64,
    pub send_time: Option<String>,
    pub scheduled_for: String,
    pub status: String,
    pub external_message_id: Option<String>,
    pub email_id: Option<String>,
    pub error: Option<String>,
    pub sent_at: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub items: Vec<NotificationResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

pub async fn schedule_subtask(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<ScheduleSubtaskRequest>,
) -> Result<(StatusCode, Json<NotificationResponse>), ApiError> {
    let pid = parse_oid(&project_id)?;
    let sid = parse_oid(&body.subtask_id)?;

    let notification = state
        .scheduler
        .schedule_for_subtask(pid, sid, body.days_before, body.send_time, auth.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(to_response(notification))))
}

pub async fn schedule_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<ScheduleEventRequest>,
) -> Result<(StatusCode, Json<NotificationResponse>), ApiError> {
    let pid = parse_oid(&project_id)?;
    let eid = parse_oid(&body.event_id)?;

    let recipient_ids = body
        .recipient_ids
        .iter()
        .map(|s| parse_oid(s))
        .collect::<Result<Vec<_>, _>>()?;

    let notification = state
        .scheduler
        .schedule_for_event(
            pid,
            eid,
            body.days_before,
            body.send_time,
            recipient_ids,
            auth.user_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(to_response(notification))))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(project_id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let pid = parse_oid(&project_id)?;

    let access = state.projects.check_access(pid, auth.user_id, None).await?;
    if !access.has_access {
        return Err(ApiError::Forbidden("Not a project member".to_string()));
    }

    let page = state.notifications.list_by_project(pid, &params).await?;
    Ok(Json(NotificationListResponse {
        items: page.items.into_iter().map(to_response).collect(),
        total: page.total,
        page: page.page,
        per_page: page.per_page,
        total_pages: page.total_pages,
    }))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, notification_id)): Path<(String, String)>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let pid = parse_oid(&project_id)?;
    let nid = parse_oid(&notification_id)?;

    let access = state.projects.check_access(pid, auth.user_id, None).await?;
    if !access.has_access {
        return Err(ApiError::Forbidden("Not a project member".to_string()));
    }

    let notification = state
        .notifications
        .base
        .find_by_id_in_project(pid, nid)
        .await?;
    Ok(Json(to_response(notification)))
}

pub async fn reschedule(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, notification_id)): Path<(String, String)>,
    Json(body): Json<RescheduleRequest>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let pid = parse_oid(&project_id)?;
    let nid = parse_oid(&notification_id)?;

    let notification = state
        .scheduler
        .update(pid, nid, body.days_before, body.send_time, auth.user_id)
        .await?;

    Ok(Json(to_response(notification)))
}

pub async fn cancel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((project_id, notification_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pid = parse_oid(&project_id)?;
    let nid = parse_oid(&notification_id)?;

    state.scheduler.cancel(pid, nid, auth.user_id).await?;

    Ok(Json(serde_json::json!({ "cancelled": true })))
}

fn to_response(n: ScheduledNotification) -> NotificationResponse {
    NotificationResponse {
        id: n.id.map(|id| id.to_hex()).unwrap_or_default(),
        kind: n.kind.as_str().to_string(),
        entity_id: n.entity_id.to_hex(),
        project_id: n.project_id.to_hex(),
        recipient_ids: n.recipient_ids.iter().map(|id| id.to_hex()).collect(),
        days_before: n.days_before,
        send_time: n.send_time,
        scheduled_for: n.scheduled_for.to_chrono().to_rfc3339(),
        status: n.status.as_str().to_string(),
        external_message_id: n.external_message_id,
        email_id: n.email_id,
        error: n.error,
        sent_at: n.sent_at.map(|d| d.to_chrono().to_rfc3339()),
        created_by: n.created_by.to_hex(),
    }
}
