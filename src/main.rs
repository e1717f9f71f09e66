use anyhow::Context;
use axum::http::StatusCode;
use axum::{
    extract::Extension,
    routing::{get, post},
    Json, Router,
};
use stream_analytics::analysis::http::HttpAnalysisClient;
use stream_analytics::config::PipelineConfig;
use stream_analytics::consumer::handler::{BatchConsumer, ConsumerOptions};
use stream_analytics::log::memory::MemoryLog;
use stream_analytics::log::subscriber::{subscribe, SubscriptionOptions};
use stream_analytics::log::types::now_ms;
use stream_analytics::producer::batcher::{BatchingProducer, ProducerOptions};
use stream_analytics::producer::supervisor::{ProducerSupervisor, SupervisorOptions};
use stream_analytics::sink::fs::FsObjectStore;
use stream_analytics::sink::writer::SinkWriter;
use stream_analytics::source::handlers::handle_post_records;
use stream_analytics::source::stream::{channel_source, HttpStreamSource};
use stream_analytics::source::RecordSource;
use stream_analytics::stats::{PipelineStats, StatsSnapshot};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Name of the analytics subscription on the append log.
const SUBSCRIPTION: &str = "analytics";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();

    let config = PipelineConfig::load()?;
    tracing::info!("Starting pipeline with {:?}", config);

    let stats = Arc::new(PipelineStats::default());

    // 1. Append log:
    let log = Arc::new(MemoryLog::new(config.log_shards, config.retention()));

    // 2. Consumer side (analysis + sink):
    let store = Arc::new(FsObjectStore::new(&config.output_dir));
    tracing::info!("Writing output objects under {}", store.root().display());

    let analysis = Arc::new(
        HttpAnalysisClient::new(&config.analysis_endpoint)
            .with_retry(config.analysis_timeout(), config.analysis_attempts),
    );
    let consumer = Arc::new(BatchConsumer::new(
        analysis,
        SinkWriter::new(store),
        ConsumerOptions {
            language_code: config.language_code.clone(),
            sentiment_folder: config.sentiment_folder.clone(),
            entities_folder: config.entities_folder.clone(),
        },
        stats.clone(),
    ));

    let subscription = subscribe(
        log.clone(),
        SUBSCRIPTION,
        consumer,
        SubscriptionOptions {
            max_batch: config.consumer_batch_size,
            invocation_timeout: config.invocation_timeout(),
            max_attempts: config.max_delivery_attempts,
            ..SubscriptionOptions::default()
        },
        stats.clone(),
    );
    tracing::info!(
        "Subscription '{}' running with {} workers",
        subscription.name(),
        subscription.worker_count()
    );

    // 3. Record source (stream URL or push endpoint):
    let (source, push_sender) = match &config.stream_url {
        Some(url) => {
            tracing::info!("Reading records from stream {}", url);
            let source: Arc<dyn RecordSource> = Arc::new(
                HttpStreamSource::new(url.as_str())
                    .with_context(|| format!("invalid stream url {}", url))?,
            );
            (source, None)
        }
        None => {
            tracing::info!("No stream url configured, accepting records on POST /records");
            let (sender, channel) = channel_source(config.batch_size * 100);
            let source: Arc<dyn RecordSource> = Arc::new(channel);
            (source, Some(sender))
        }
    };

    // 4. Producer:
    let producer = BatchingProducer::new(
        log.clone(),
        ProducerOptions {
            batch_size: config.batch_size,
            default_partition_key: config.default_partition_key.clone(),
            put_attempts: config.put_attempts,
            ..ProducerOptions::default()
        },
        stats.clone(),
    );
    let mut supervisor = ProducerSupervisor::new(
        source,
        producer,
        SupervisorOptions {
            flush_interval: config.flush_interval(),
            ..SupervisorOptions::default()
        },
        stats.clone(),
    );
    tokio::spawn(async move {
        match supervisor.run().await {
            Ok(()) => tracing::info!("Record source finished, producer stopped"),
            Err(e) => tracing::error!("Producer stopped: {:#}", e),
        }
    });

    // 5. HTTP Router:
    let mut app = Router::new()
        .route("/stats", get(handle_get_stats))
        .route("/health", get(handle_health))
        .layer(Extension(stats.clone()));

    if let Some(sender) = push_sender {
        app = app.merge(
            Router::new()
                .route("/records", post(handle_post_records))
                .layer(Extension(sender)),
        );
    }

    // 6. Spawn stats reporter:
    let report_stats = stats.clone();
    let report_log = log.clone();
    let interval = config.stats_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            let trimmed = report_log.trim_expired(now_ms());
            if trimmed > 0 {
                tracing::debug!("Trimmed {} expired log entries", trimmed);
            }

            let s = report_stats.snapshot();
            tracing::info!(
                "Pipeline stats: ingested={} put={} dropped={} lost={} delivered={} \
                 delivery_failures={} abandoned={} skipped={} objects={} retained={}",
                s.records_ingested,
                s.records_put,
                s.records_dropped,
                s.records_lost,
                s.batches_delivered,
                s.delivery_failures,
                s.batches_abandoned,
                s.records_skipped,
                s.objects_written,
                report_log.retained_count()
            );
        }
    });

    // 7. Start HTTP server:
    tracing::info!("HTTP server listening on {}", config.http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `SA_LOG` first, then `RUST_LOG`, then `info`.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("SA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

async fn handle_get_stats(
    Extension(stats): Extension<Arc<PipelineStats>>,
) -> (StatusCode, Json<StatsSnapshot>) {
    (StatusCode::OK, Json(stats.snapshot()))
}

async fn handle_health() -> &'static str {
    "ok"
}
