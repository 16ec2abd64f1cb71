//! REST origination of notifications by admin screens.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use notify_common::NotificationContent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::auth::middleware::AdminUser;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::fanout::Target;
use crate::AppState;

/// Type tag for system notifications that do not name one.
pub const DEFAULT_SYSTEM_TYPE: &str = "system";
pub const ANNOUNCEMENT_TYPE: &str = "announcement";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notification/system", post(send_system))
        .route("/notification/announcement", post(send_announcement))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SystemNotificationRequest {
    pub title: String,
    pub message: String,
    /// Type tag; defaults to `system`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Map<String, Value>>,
    /// Deliver only to this user's connections.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnnouncementRequest {
    pub title: String,
    pub message: String,
    /// Deliver only to connections that joined this group.
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DispatchResponse {
    /// Live connections matched at send time. Not a delivery receipt.
    pub recipients: usize,
}

// ---------------------------------------------------------------------------
// POST /notification/system
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/notification/system",
    tag = "Notifications",
    security(("bearer" = [])),
    request_body = SystemNotificationRequest,
    responses(
        (status = 202, description = "Notification dispatched", body = DispatchResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Admin role required", body = ApiErrorBody),
    ),
)]
pub async fn send_system(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(body): Json<SystemNotificationRequest>,
) -> Result<(StatusCode, Json<DispatchResponse>), ApiError> {
    validate_text(&body.title, &body.message)?;

    let target = match non_empty(body.user_id) {
        Some(user_id) => Target::User(user_id),
        None => Target::All,
    };
    let kind = non_empty(body.kind).unwrap_or_else(|| DEFAULT_SYSTEM_TYPE.to_string());

    let mut content = NotificationContent::new(body.title, body.message, kind);
    content.data = body.data;

    tracing::info!(admin = %admin.user_id, ?target, kind = %content.kind, "system notification");
    Ok(dispatch(&state, target, content))
}

// ---------------------------------------------------------------------------
// POST /notification/announcement
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/notification/announcement",
    tag = "Notifications",
    security(("bearer" = [])),
    request_body = AnnouncementRequest,
    responses(
        (status = 202, description = "Announcement dispatched", body = DispatchResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Admin role required", body = ApiErrorBody),
    ),
)]
pub async fn send_announcement(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(body): Json<AnnouncementRequest>,
) -> Result<(StatusCode, Json<DispatchResponse>), ApiError> {
    validate_text(&body.title, &body.message)?;

    let target = match non_empty(body.group) {
        Some(group) => Target::Group(group),
        None => Target::All,
    };
    let content = NotificationContent::new(body.title, body.message, ANNOUNCEMENT_TYPE);

    tracing::info!(admin = %admin.user_id, ?target, "announcement");
    Ok(dispatch(&state, target, content))
}

fn dispatch(
    state: &AppState,
    target: Target,
    content: NotificationContent,
) -> (StatusCode, Json<DispatchResponse>) {
    let recipients = state.connections.count_matching(&target);
    state.broadcast.dispatch(target, content);
    (StatusCode::ACCEPTED, Json(DispatchResponse { recipients }))
}

fn validate_text(title: &str, message: &str) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    if title.trim().is_empty() {
        errors.push(FieldError::new("title", "must not be empty"));
    }
    if message.trim().is_empty() {
        errors.push(FieldError::new("message", "must not be empty"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(errors))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
