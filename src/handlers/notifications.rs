use axum::{
    extract::{Extension, Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::AuthUser;
use crate::models::Notification;
use crate::services::notifications;
use crate::AppState;

#[derive(Deserialize)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

pub async fn get_notifications(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<NotificationsQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let rows = notifications::list_for_user(&state.db_pool, auth_user.user_id, query.unread_only, limit)
        .await
        .map_err(|e| {
            tracing::error!("Error loading notifications: {:?}", e);
            ApiError::Internal("Database error".to_string())
        })?;
    Ok(Json(rows))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = notifications::mark_read(&state.db_pool, auth_user.user_id, id)
        .await
        .map_err(|e| {
            tracing::error!("Error marking notification read: {:?}", e);
            ApiError::Internal("Database error".to_string())
        })?;
    if !updated {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }
    Ok(Json(serde_json::json!({"success": true})))
}
