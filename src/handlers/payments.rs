use axum::{
    extract::{Extension, Path, State},
    response::Json,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::AuthUser;
use crate::services::payments::{self, CheckoutStarted, InitializePaymentRequest, PaymentStatusView};
use crate::AppState;

pub async fn initialize_payment(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<InitializePaymentRequest>,
) -> ApiResult<Json<CheckoutStarted>> {
    let started = payments::initialize_payment(
        &state.db_pool,
        state.gateway.as_ref(),
        &state.config,
        auth_user.user_id,
        auth_user.email.as_deref(),
        request,
    )
    .await?;
    Ok(Json(started))
}

pub async fn get_payment_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(reference): Path<String>,
) -> ApiResult<Json<PaymentStatusView>> {
    payments::payment_status(&state.db_pool, auth_user.user_id, &reference)
        .await
        .map_err(|e| {
            tracing::error!("Error loading payment {}: {:?}", reference, e);
            ApiError::Internal("Database error".to_string())
        })?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))
}
