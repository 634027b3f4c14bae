use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::AuthUser;
use crate::models::WalletTransaction;
use crate::services::wallets::{self, WalletSummary};
use crate::AppState;

pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<WalletSummary>> {
    let summary = wallets::wallet_summary(&state.db_pool, auth_user.user_id, state.config.default_currency)
        .await
        .map_err(|e| {
            tracing::error!("Error loading wallet: {:?}", e);
            ApiError::Internal("Database error".to_string())
        })?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<i64>,
}

pub async fn get_wallet_transactions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<TransactionsQuery>,
) -> ApiResult<Json<Vec<WalletTransaction>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let rows = wallets::recent_transactions(&state.db_pool, auth_user.user_id, limit)
        .await
        .map_err(|e| {
            tracing::error!("Error loading wallet transactions: {:?}", e);
            ApiError::Internal("Database error".to_string())
        })?;
    Ok(Json(rows))
}

/// Errors answer 400 with `{success: false, error}` so the balance widget can show them inline.
pub async fn sync_wallet_balance(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Response {
    match wallets::sync_provider_balance(
        &state.db_pool,
        state.gateway.as_ref(),
        auth_user.user_id,
        state.config.default_currency,
    )
    .await
    {
        Ok(sync) => Json(sync).into_response(),
        Err(e) => {
            tracing::error!(user_id = %auth_user.user_id, "Balance sync failed: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"success": false, "error": e.to_string()})),
            )
                .into_response()
        }
    }
}
