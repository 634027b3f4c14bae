// One reconciliation pass from the command line.
// Usage: cargo run --bin reconcile -- --older-than-minutes 30 --limit 100 --dry-run

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use chama_payments_api::paystack::{PaymentGateway, PaystackClient};
use chama_payments_api::services::reconciliation;
use chama_payments_api::{database, init_tracing, Config};

#[derive(Parser, Debug)]
#[command(author, version, about = "Settle pending Paystack payments whose webhook never arrived")]
struct Args {
    /// Only payments pending for at least this many minutes
    #[arg(long)]
    older_than_minutes: Option<i64>,

    /// Maximum payments to check in this pass
    #[arg(long)]
    limit: Option<i64>,

    /// Ask Paystack but write nothing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let config = Arc::new(Config::from_env()?);
    init_tracing(config.log_format);

    let pool = database::create_pool(&config.database_url)
        .await
        .context("connecting to the database")?;
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PaystackClient::new(
        config.paystack_base_url.clone(),
        config.paystack_secret_key.clone(),
    ));

    let report = reconciliation::reconcile_stale_payments(
        &pool,
        gateway.as_ref(),
        &config,
        args.older_than_minutes.unwrap_or(config.reconcile_after_minutes),
        args.limit.unwrap_or(config.reconcile_batch_size),
        args.dry_run,
    )
    .await
    .context("reconciliation pass")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    pool.close().await;
    Ok(())
}
