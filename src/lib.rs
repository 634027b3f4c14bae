// Library root: the router and state are exported so the binaries and tests share them.

pub mod background;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod paystack;
pub mod services;
pub mod websocket;

pub use config::{Config, LogFormat};

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use database::DatabasePool;
use middleware::RateLimiter;
use paystack::{PaymentGateway, PaystackClient};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabasePool,
    pub config: Arc<Config>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub broadcast_tx: websocket::BroadcastChannel,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(db_pool: DatabasePool, config: Arc<Config>, gateway: Arc<dyn PaymentGateway>) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window_seconds)
            .with_token_secret(&config.jwt_secret);
        Self {
            db_pool,
            config,
            gateway,
            broadcast_tx: websocket::create_broadcast_channel(),
            rate_limiter,
        }
    }

    /// State backed by the real Paystack client.
    pub fn with_paystack(db_pool: DatabasePool, config: Arc<Config>) -> Self {
        let gateway: Arc<dyn PaymentGateway> = Arc::new(PaystackClient::new(
            config.paystack_base_url.clone(),
            config.paystack_secret_key.clone(),
        ));
        Self::new(db_pool, config, gateway)
    }
}

pub fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/api/transfers/send", post(handlers::send_money))
        .route("/api/recipients/lookup", get(handlers::lookup_recipient))
        .route("/api/payments/initialize", post(handlers::initialize_payment))
        .route("/api/payments/:reference", get(handlers::get_payment_status))
        .route("/api/wallet", get(handlers::get_wallet))
        .route("/api/wallet/transactions", get(handlers::get_wallet_transactions))
        .route("/api/wallet/sync", post(handlers::sync_wallet_balance))
        .route("/api/notifications", get(handlers::get_notifications))
        .route("/api/notifications/:id/read", post(handlers::mark_notification_read))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth::auth_middleware));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/webhooks/paystack", post(handlers::paystack_webhook))
        .route("/ws", get(websocket::websocket_handler))
        .merge(authenticated)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(from_fn(middleware::security_headers::security_headers_middleware))
                .layer(from_fn_with_state(
                    state.rate_limiter.clone(),
                    middleware::rate_limit::rate_limit_middleware,
                )),
        )
        .with_state(state)
}

pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "chama_payments_api=debug,tower_http=debug".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // A second init (tests, tooling) keeps the first subscriber.
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
}
