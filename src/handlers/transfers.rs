use axum::{
    extract::{Extension, Query, State},
    response::Json,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::AuthUser;
use crate::services::transfers::{self, RecipientLookup, SendMoneyOutcome, SendMoneyRequest};
use crate::websocket;
use crate::AppState;

pub async fn send_money(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<SendMoneyRequest>,
) -> ApiResult<Json<SendMoneyOutcome>> {
    let outcome = transfers::send_money(
        &state.db_pool,
        state.gateway.as_ref(),
        &state.config,
        auth_user.user_id,
        auth_user.email.as_deref(),
        &request,
    )
    .await
    .map_err(|e| {
        tracing::warn!(user_id = %auth_user.user_id, "Send money failed: {}", e);
        ApiError::from(e)
    })?;

    websocket::broadcast_notifications(&state.broadcast_tx, outcome.notifications());
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct LookupQuery {
    pub email: String,
}

pub async fn lookup_recipient(
    State(state): State<AppState>,
    Extension(_auth_user): Extension<AuthUser>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<Json<RecipientLookup>> {
    Ok(Json(transfers::lookup_recipient(&state.db_pool, &query.email).await?))
}
