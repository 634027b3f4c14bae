use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use chama_payments_api::{background, build_router, database, init_tracing, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Arc::new(Config::from_env()?);
    init_tracing(config.log_format);

    info!("Starting chama payments API...");
    if config.paystack_secret_key.is_none() {
        error!("PAYSTACK_SECRET_KEY is not set; webhooks will be refused and checkouts will fail");
    }
    if config.allow_unsigned_webhooks {
        tracing::warn!("PAYSTACK_ALLOW_UNSIGNED_WEBHOOKS is on; do not run this way in production");
    }

    let db_pool = database::new_pool(&config.database_url).await?;
    info!("Database connection pool created");
    database::run_migrations(&db_pool).await?;

    let app_state = AppState::with_paystack(db_pool.clone(), config.clone());

    let mut scheduler = background::scheduler::BackgroundScheduler::new(
        db_pool.clone(),
        config.clone(),
        app_state.gateway.clone(),
        app_state.broadcast_tx.clone(),
    )
    .await?;

    let app = build_router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        error!("Server error: {}", e);
    }

    info!("Shutting down gracefully...");
    scheduler.shutdown().await;
    db_pool.close().await;

    served.map_err(Into::into)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
