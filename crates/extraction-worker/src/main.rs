//! InvoiceFlow Extraction Worker
//!
//! Consumes extraction jobs from the SQS queue:
//! 1. Receives a job message for one uploaded invoice
//! 2. Downloads the stored PDF and runs document understanding
//! 3. Extracts fields, enriches gaps, matches an open issue
//! 4. Persists the terminal result, or re-enqueues with backoff

mod address;
mod enrich;
mod errors;
mod extract;
mod matcher;
mod processor;

use crate::processor::{ExtractionProcessor, JobOutcome};
use invoiceflow_common::{
    ai::{create_chat_model, create_document_ai},
    config::AppConfig,
    db::{DbPool, Repository},
    metrics::{self, METRICS_PREFIX},
    queue::{ExtractionJobMessage, Queue, QueueConfig},
    storage::{BlobStore, FsBlobStore},
    VERSION,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting InvoiceFlow Extraction Worker v{}", VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_pipeline_duration_seconds", METRICS_PREFIX)),
                metrics::PIPELINE_BUCKETS,
            )?
            .install()?;
        info!(port = config.observability.metrics_port, "Metrics exporter listening");
    }

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db);

    // Shared service clients, constructed once and injected
    let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.storage.root.clone()));
    let document_ai = create_document_ai(&config.document_ai)?;
    let chat = create_chat_model(&config.llm)?;

    let processor = ExtractionProcessor::new(
        repository,
        store,
        document_ai,
        chat,
        config.pipeline.clone(),
    );

    // Initialize extraction queue
    let queue = match config.queue.extraction_queue_url.clone() {
        Some(url) => {
            info!(url = %url, "Connecting to extraction queue...");
            let queue_config = QueueConfig {
                url,
                dlq_url: config.queue.dlq_url.clone(),
                visibility_timeout: config.queue.visibility_timeout_secs as i32,
                wait_time_seconds: config.queue.poll_timeout_secs as i32,
                max_messages: config.queue.batch_size as i32,
                ..Default::default()
            };
            Queue::new(queue_config).await?
        }
        None => {
            warn!("queue.extraction_queue_url not set, waiting for shutdown signal...");
            tokio::signal::ctrl_c().await?;
            info!("Extraction worker shutting down");
            return Ok(());
        }
    };

    // Circuit breaker state
    let mut consecutive_failures = 0;
    const MAX_FAILURES: u32 = 5;
    const CIRCUIT_BREAK_DURATION: std::time::Duration = std::time::Duration::from_secs(30);

    info!("Extraction worker ready, starting queue polling...");

    // Start polling loop
    loop {
        // Circuit breaker check
        if consecutive_failures >= MAX_FAILURES {
            warn!(
                failures = consecutive_failures,
                "Circuit breaker open, pausing..."
            );
            tokio::time::sleep(CIRCUIT_BREAK_DURATION).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming...");
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            result = queue.receive() => {
                match result {
                    Ok(messages) => {
                        for raw in messages {
                            let Some(receipt_handle) = raw.receipt_handle.clone() else {
                                warn!("Message without receipt handle, skipping");
                                continue;
                            };

                            let job: ExtractionJobMessage = match Queue::parse_message(&raw) {
                                Ok(job) => job,
                                Err(e) => {
                                    // Poison message: log and drop it
                                    error!(error = %e, "Unparseable queue message, deleting");
                                    if let Err(e) = queue.delete(&receipt_handle).await {
                                        error!(error = %e, "Failed to delete message");
                                    }
                                    continue;
                                }
                            };

                            info!(
                                invoice_id = %job.invoice_id,
                                attempt = job.attempt,
                                "Received extraction job"
                            );

                            match processor.process_job(&job).await {
                                Ok(JobOutcome::Completed) | Ok(JobOutcome::Failed) => {
                                    consecutive_failures = 0;
                                    if let Err(e) = queue.delete(&receipt_handle).await {
                                        error!(error = %e, "Failed to delete message");
                                    }
                                }
                                Ok(JobOutcome::Retry { message, delay }) => {
                                    consecutive_failures = 0;
                                    ::metrics::counter!(
                                        format!("{}_invoices_retried_total", METRICS_PREFIX)
                                    )
                                    .increment(1);

                                    match queue.send_delayed(&message, delay.as_secs() as i32).await {
                                        Ok(_) => {
                                            if let Err(e) = queue.delete(&receipt_handle).await {
                                                error!(error = %e, "Failed to delete message");
                                            }
                                        }
                                        Err(e) => {
                                            // Leave the original message for
                                            // redelivery instead of losing the job
                                            error!(error = %e, "Failed to re-enqueue, leaving message");
                                        }
                                    }
                                }
                                Err(e) => {
                                    consecutive_failures += 1;
                                    error!(
                                        invoice_id = %job.invoice_id,
                                        error = %e,
                                        failures = consecutive_failures,
                                        "Failed to process extraction job"
                                    );
                                    // Message will be re-delivered or moved to DLQ
                                }
                            }
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(error = %e, "Failed to receive messages from queue");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }
            }
        }
    }

    info!("Extraction worker shutting down");
    Ok(())
}
