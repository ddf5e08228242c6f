use flow_orchestrator::{FlowOrchestrator, RunConfig};
use notification_service::{NotificationConfig, NotificationService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flow_orchestrator=info,yahoo_client=warn".into()),
        )
        .init();

    let config = RunConfig::from_env();
    tracing::info!(
        "Options flow collection: {} tickers, batches of {}",
        config.tickers.len(),
        config.batch_size
    );

    let notifier = NotificationService::new(&NotificationConfig::from_env());
    let orchestrator = FlowOrchestrator::new(config, notifier);

    let report = orchestrator.run().await?;
    tracing::info!(
        "{} {} run: {} processed, {} failed, {} gamma records, {} skew records",
        report.trading_date,
        report.session,
        report.processed,
        report.failed.len(),
        report.gamma_records,
        report.skew_records
    );

    Ok(())
}
