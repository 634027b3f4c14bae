use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::config::Config;
use crate::database::DatabasePool;
use crate::paystack::PaymentGateway;
use crate::services::reconciliation;
use crate::websocket::{self, BroadcastChannel};

/// Every five minutes, on the minute.
pub const RECONCILE_SCHEDULE: &str = "0 */5 * * * *";

pub struct BackgroundScheduler {
    scheduler: JobScheduler,
}

impl BackgroundScheduler {
    pub async fn new(
        db_pool: DatabasePool,
        config: Arc<Config>,
        gateway: Arc<dyn PaymentGateway>,
        broadcast_tx: BroadcastChannel,
    ) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;

        scheduler
            .add(Job::new_async(RECONCILE_SCHEDULE, move |_uuid, _l| {
                let db_pool = db_pool.clone();
                let config = config.clone();
                let gateway = gateway.clone();
                let broadcast_tx = broadcast_tx.clone();
                Box::pin(async move {
                    let result = reconciliation::reconcile_stale_payments(
                        &db_pool,
                        gateway.as_ref(),
                        &config,
                        config.reconcile_after_minutes,
                        config.reconcile_batch_size,
                        false,
                    )
                    .await;
                    match result {
                        Ok(report) => websocket::broadcast_notifications(&broadcast_tx, &report.notifications),
                        Err(e) => tracing::error!("Scheduled reconciliation failed: {:?}", e),
                    }
                })
            })?)
            .await?;

        scheduler.start().await?;
        info!("Background scheduler started (reconciliation: {})", RECONCILE_SCHEDULE);

        Ok(Self { scheduler })
    }

    pub async fn shutdown(&mut self) {
        if let Err(e) = self.scheduler.shutdown().await {
            tracing::warn!("Background scheduler shutdown error: {:?}", e);
        }
        info!("Background scheduler stopped");
    }
}
