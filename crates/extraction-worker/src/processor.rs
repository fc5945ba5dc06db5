//! Extraction processor
//!
//! Drives the pipeline end-to-end for one invoice: download, document
//! understanding, field extraction, address parsing, fallback
//! enrichment, issue matching, terminal persistence. Each run reads
//! issues and writes only its own invoice record, so concurrent runs
//! need no coordination.

use crate::address::parse_receiver_address;
use crate::enrich::{enrich_fields, needs_enrichment};
use crate::errors::PipelineError;
use crate::extract::{apply_receiver_address, extract_fields, ExtractedFields};
use crate::matcher::{match_issue, CandidateIssue};
use invoiceflow_common::ai::{ChatModel, DocumentAi};
use invoiceflow_common::config::PipelineConfig;
use invoiceflow_common::db::Repository;
use invoiceflow_common::metrics::{record_enrichment, record_match, PipelineMetrics};
use invoiceflow_common::queue::ExtractionJobMessage;
use invoiceflow_common::storage::BlobStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// What the worker loop should do with the queue message
#[derive(Debug)]
pub enum JobOutcome {
    /// Terminal success; delete the message
    Completed,
    /// Transient failure; re-enqueue the next attempt after `delay`
    Retry {
        message: ExtractionJobMessage,
        delay: Duration,
    },
    /// Attempts exhausted; the invoice is now failed, delete the message
    Failed,
}

/// Extraction pipeline processor
pub struct ExtractionProcessor {
    repository: Repository,
    store: Arc<dyn BlobStore>,
    document_ai: Arc<dyn DocumentAi>,
    chat: Arc<dyn ChatModel>,
    config: PipelineConfig,
}

impl ExtractionProcessor {
    pub fn new(
        repository: Repository,
        store: Arc<dyn BlobStore>,
        document_ai: Arc<dyn DocumentAi>,
        chat: Arc<dyn ChatModel>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            repository,
            store,
            document_ai,
            chat,
            config,
        }
    }

    /// Process one extraction job. Returns Err only when the
    /// bookkeeping writes themselves fail; the message is then left for
    /// queue redelivery.
    #[instrument(skip(self, message), fields(invoice_id = %message.invoice_id, attempt = message.attempt))]
    pub async fn process_job(
        &self,
        message: &ExtractionJobMessage,
    ) -> Result<JobOutcome, PipelineError> {
        info!("Processing extraction job");
        let timer = PipelineMetrics::start();

        self.repository
            .mark_processing(message.invoice_id, message.attempt)
            .await
            .map_err(|e| PipelineError::Database(e.to_string()))?;

        match self.run_pipeline(message).await {
            Ok(issue_id) => {
                info!(matched = issue_id.is_some(), "Invoice extraction completed");
                timer.finish("completed");
                Ok(JobOutcome::Completed)
            }
            Err(e) if attempts_exhausted(message.attempt, self.config.max_attempts) => {
                error!(
                    error = %e,
                    attempts = message.attempt + 1,
                    "Extraction failed, marking invoice failed"
                );
                self.repository
                    .fail_extraction(message.invoice_id, e.to_string())
                    .await
                    .map_err(|pe| PipelineError::Database(pe.to_string()))?;
                timer.finish("failed");
                Ok(JobOutcome::Failed)
            }
            Err(e) => {
                let delay = self.config.retry_delay(message.attempt);
                warn!(
                    error = %e,
                    delay_secs = delay.as_secs(),
                    "Extraction failed, scheduling retry"
                );
                timer.finish("retried");
                Ok(JobOutcome::Retry {
                    message: message.next_attempt(),
                    delay,
                })
            }
        }
    }

    /// The pipeline proper. Any error here aborts this invoice's run;
    /// no partial field values are written.
    async fn run_pipeline(
        &self,
        message: &ExtractionJobMessage,
    ) -> Result<Option<Uuid>, PipelineError> {
        // Download the stored file
        let timeout = Duration::from_secs(self.config.stage_timeout_secs);
        let pdf = match tokio::time::timeout(timeout, self.store.get(&message.file_path)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(PipelineError::Download {
                    path: message.file_path.clone(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(PipelineError::StageTimeout {
                    stage: "download",
                    seconds: self.config.stage_timeout_secs,
                })
            }
        };

        // Document understanding
        let document = self
            .stage("document_service", self.document_ai.process(&pdf))
            .await?;

        debug!(
            entity_count = document.entities.len(),
            text_len = document.text.len(),
            "Document processed"
        );

        // Primary extraction, then receiver-address integration
        let mut extraction = extract_fields(&document.entities);
        if let Some(ref address) = extraction.receiver_address {
            let parsed = parse_receiver_address(address);
            debug!(?parsed, "Parsed receiver address");
            apply_receiver_address(&mut extraction.fields, &parsed);
        }

        // Fallback enrichment for whatever is still missing
        if needs_enrichment(&extraction.fields) {
            debug!("Primary extraction incomplete, running fallback enrichment");
            let parsed_ok = self
                .stage(
                    "enrichment",
                    enrich_fields(
                        self.chat.as_ref(),
                        &mut extraction.fields,
                        &document.text,
                        self.config.enrichment_text_limit,
                    ),
                )
                .await?;
            record_enrichment(parsed_ok);
        }

        // Candidates are read fresh per invoice; the pipeline never
        // writes issues
        let issues = self.stage("load_issues", self.repository.list_issues()).await?;
        let candidates: Vec<CandidateIssue> = issues.iter().map(CandidateIssue::from).collect();

        let issue_id = self
            .stage(
                "match",
                match_issue(self.chat.as_ref(), &extraction.fields, &candidates),
            )
            .await?;
        record_match(issue_id.is_some());

        // Single terminal write for a successful run
        let ExtractedFields {
            building,
            unit,
            description,
            amount,
        } = extraction.fields;

        self.stage(
            "persist",
            self.repository.complete_extraction(
                message.invoice_id,
                building,
                unit,
                description,
                amount,
                issue_id,
            ),
        )
        .await?;

        Ok(issue_id)
    }

    /// Run a stage under the per-stage timeout
    async fn stage<T, F>(&self, name: &'static str, fut: F) -> Result<T, PipelineError>
    where
        F: Future<Output = invoiceflow_common::errors::Result<T>>,
    {
        let timeout = Duration::from_secs(self.config.stage_timeout_secs);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(PipelineError::StageTimeout {
                stage: name,
                seconds: self.config.stage_timeout_secs,
            }),
        }
    }
}

/// The attempt that just ran was the last one allowed
fn attempts_exhausted(attempt: u32, max_attempts: u32) -> bool {
    attempt + 1 >= max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts_exhausted() {
        // max_attempts = 3: attempts 0 and 1 retry, attempt 2 is final
        assert!(!attempts_exhausted(0, 3));
        assert!(!attempts_exhausted(1, 3));
        assert!(attempts_exhausted(2, 3));
        // max_attempts = 1 never retries
        assert!(attempts_exhausted(0, 1));
    }
}
