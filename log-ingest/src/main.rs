use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use log_ingest::app::{create_router, AppState};
use log_ingest::config::Config;
use log_ingest::fetch::Fetcher;
use log_ingest::notify::{ErrorNotifier, KafkaMessageBus};
use log_ingest::pipeline::IngestionPipeline;
use log_ingest::prometheus::{setup_metrics_recorder, setup_metrics_routes};
use log_ingest::source::CloudLoggingSource;
use log_ingest::warehouse::{BatchInserter, ClickHouseWarehouse};

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn listen(app: Router, bind: String) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on {}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::load().wrap_err("invalid configuration")?;
    let services = config.services();
    let range = config.time_range()?;
    let notify_mode = config.notify_mode()?;

    let source = CloudLoggingSource::new(
        &config.logging_api_url,
        config.logging_token(),
        Duration::from_secs(config.logging_request_timeout_secs),
    )?;

    let warehouse = ClickHouseWarehouse::new(
        &config.clickhouse_url,
        &config.clickhouse_user,
        &config.clickhouse_password,
    );
    if config.create_table {
        warehouse
            .ensure_table(&config.dataset_id, &config.table_id)
            .await
            .wrap_err("failed to create warehouse table")?;
    }

    let bus = KafkaMessageBus::new(&config.kafka)?;

    let pipeline = IngestionPipeline::new(
        Fetcher::new(Arc::new(source), &config.project_id, config.page_size()),
        ErrorNotifier::new(Arc::new(bus), &config.error_topic_id),
        BatchInserter::new(Arc::new(warehouse), &config.dataset_id, &config.table_id),
        notify_mode,
    );

    info!(
        services = ?services,
        start = %range.start(),
        end = %range.end(),
        dataset = %config.dataset_id,
        table = %config.table_id,
        topic = %config.error_topic_id,
        notify_mode = %notify_mode,
        "pipeline configured"
    );

    let recorder = setup_metrics_recorder().wrap_err("failed to install metrics recorder")?;
    let app = create_router(AppState::new(pipeline, services, range));
    let app = setup_metrics_routes(app, recorder);

    listen(app, config.bind()).await.wrap_err("server error")
}
