//! Batch processing for multi-document chunking.
//!
//! Dispatches at most `concurrency` documents at a time onto a worker
//! pool. Chunking and enrichment are stateless per document, so workers
//! share nothing but the progress counters, which live behind a single
//! lock per batch run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::ChunkingEngine;
use crate::enrich::MetadataEnricher;
use crate::types::{Chunk, Document, Sentence};

/// Configuration for batch processing.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum documents processed concurrently
    pub concurrency: usize,

    /// Whether to continue after individual document failures
    pub continue_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            continue_on_error: true,
        }
    }
}

/// Error recorded for one document.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub document_id: Uuid,
    pub error: String,
}

/// Result of batch processing.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub total_documents: usize,
    pub processed_documents: usize,
    pub failed_documents: usize,
    pub total_chunks: usize,
    pub errors: Vec<BatchError>,
}

/// Shared progress counters for one batch run.
///
/// Updated from worker tasks under a single mutex; no I/O happens while
/// the lock is held.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchProgress {
    pub scheduled: usize,
    pub completed: usize,
    pub failed: usize,
    pub chunks_emitted: usize,
}

/// Cooperative cancellation flag.
///
/// Cancelling stops scheduling of new documents; documents already in
/// flight finish or fail on their own. There is no rollback.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a flag in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs chunking and enrichment for many documents on a bounded pool.
pub struct BatchProcessor {
    engine: Arc<ChunkingEngine>,
    enricher: Arc<MetadataEnricher>,
    config: BatchConfig,
}

impl BatchProcessor {
    /// Create a new batch processor.
    pub fn new(engine: Arc<ChunkingEngine>, config: BatchConfig) -> Self {
        Self {
            engine,
            enricher: Arc::new(MetadataEnricher::new()),
            config,
        }
    }

    /// Process a batch of documents and return all enriched chunks in
    /// document order.
    pub async fn process_batch(
        &self,
        documents: Vec<(Document, Vec<Sentence>)>,
        cancel: &CancelFlag,
    ) -> Result<(Vec<Chunk>, BatchResult)> {
        let progress = Arc::new(Mutex::new(BatchProgress::default()));
        self.process_batch_with_progress(documents, cancel, progress)
            .await
    }

    /// Process a batch, reporting into an externally owned progress handle.
    pub async fn process_batch_with_progress(
        &self,
        documents: Vec<(Document, Vec<Sentence>)>,
        cancel: &CancelFlag,
        progress: Arc<Mutex<BatchProgress>>,
    ) -> Result<(Vec<Chunk>, BatchResult)> {
        let total_documents = documents.len();
        info!(total_documents, "starting batch processing");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(total_documents);

        for (index, (document, sentences)) in documents.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    remaining = total_documents - index,
                    "cancellation requested; not scheduling further documents"
                );
                break;
            }
            let permit = semaphore.clone().acquire_owned().await?;
            {
                let mut p = progress.lock().unwrap();
                p.scheduled += 1;
            }

            let engine = Arc::clone(&self.engine);
            let enricher = Arc::clone(&self.enricher);
            let progress = Arc::clone(&progress);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let document_id = document.id;
                let outcome = chunk_one(&engine, &enricher, &document, &sentences);
                {
                    let mut p = progress.lock().unwrap();
                    match &outcome {
                        Ok(chunks) => {
                            p.completed += 1;
                            p.chunks_emitted += chunks.len();
                        }
                        Err(_) => p.failed += 1,
                    }
                }
                (index, document_id, outcome)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(error = %e, "worker task aborted");
                    results.push((usize::MAX, Uuid::nil(), Err(format!("worker aborted: {}", e))));
                }
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut all_chunks = Vec::new();
        let mut errors = Vec::new();
        let mut processed_documents = 0;
        let mut failed_documents = 0;
        for (_, document_id, outcome) in results {
            match outcome {
                Ok(chunks) => {
                    processed_documents += 1;
                    all_chunks.extend(chunks);
                }
                Err(error) => {
                    failed_documents += 1;
                    warn!(
                        document_id = %document_id,
                        error = %error,
                        "failed to process document, siblings unaffected"
                    );
                    errors.push(BatchError { document_id, error });
                }
            }
        }

        if failed_documents > 0 && !self.config.continue_on_error {
            anyhow::bail!(
                "batch aborted: {} of {} documents failed",
                failed_documents,
                total_documents
            );
        }

        let result = BatchResult {
            total_documents,
            processed_documents,
            failed_documents,
            total_chunks: all_chunks.len(),
            errors,
        };
        info!(
            processed = processed_documents,
            failed = failed_documents,
            chunks = result.total_chunks,
            "batch processing complete"
        );
        Ok((all_chunks, result))
    }
}

/// Chunk and enrich one document.
fn chunk_one(
    engine: &ChunkingEngine,
    enricher: &MetadataEnricher,
    document: &Document,
    sentences: &[Sentence],
) -> std::result::Result<Vec<Chunk>, String> {
    let raw: Vec<Chunk> = engine
        .chunk_document(document, sentences)
        .map_err(|e| e.to_string())?
        .collect();
    Ok(enricher.enrich_all(raw, &document.metadata))
}
