use std::sync::Arc;

use eventlog_collector::authority::FileAuthority;
use eventlog_collector::channel::SpoolChannel;
use eventlog_collector::config::{AppConfig, CollectorSettings};
use eventlog_collector::sink::TracingSink;
use eventlog_collector::{Collector, CollectorContext, logging};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    let app_config = AppConfig::from_env();

    // Initialize logging; the guard must outlive the collector
    let (logging_config, _log_guard) = logging::init_logging(&app_config.log_dir)?;

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.clone());

    let ctx = CollectorContext::new(
        app_config.agent.clone(),
        app_config.monitor.clone(),
        CollectorSettings::default(),
        Arc::new(TracingSink),
        Arc::new(TracingSink),
    );
    info!(
        agent = %app_config.agent,
        monitor = %app_config.monitor,
        host = %ctx.hostname(),
        authority = %app_config.authority_file.display(),
        spool_dir = %app_config.spool_dir.display(),
        "eventlog-collector initialized"
    );

    let collector = Collector::new(
        ctx,
        Arc::new(FileAuthority::new(&app_config.authority_file)),
        Arc::new(SpoolChannel::new(&app_config.spool_dir)),
        app_config.monitor.clone(),
    )
    .with_single_pass(app_config.single_pass)
    .with_cancellation_token(shutdown.child_token());

    let collector_token = collector.cancellation_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                collector_token.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let result = collector.run().await;
    shutdown.cancel();
    result?;

    Ok(())
}
