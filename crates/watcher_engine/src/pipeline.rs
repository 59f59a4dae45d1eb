//! One scan-store-notify cycle.
//!
//! Fetch -> Extract -> Scan runs per source with bounded concurrency; results
//! are consumed in configured order, aggregated, inserted into the store, and
//! the resulting batch goes to every notification channel. The store phase runs
//! on tokio's blocking pool so a busy database never stalls the runtime. Source
//! and channel failures are recorded in the report; only a store failure ends
//! the run early.

use std::sync::Arc;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use futures_util::{stream, StreamExt};
use thiserror::Error;
use watcher_core::{
    aggregate, CodeHit, CodeScanner, NotificationBatch, RunReport, Source, SourceOutcome,
    SourceResult,
};

use crate::extract::{ExtractionError, Extractor};
use crate::fetch::{Fetcher, ProgressSink};
use crate::notify::Notifier;
use crate::store::{CodeStore, InsertOutcome, StoreError};
use crate::{FetchError, SourceProgress, Stage, WatchEvent};

pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Why one source contributed nothing to the run.
#[derive(Debug, Error)]
pub enum SourceFailure {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

pub struct Watcher {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    scanner: CodeScanner,
    notifier: Notifier,
    max_in_flight: usize,
}

impl Watcher {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        scanner: CodeScanner,
        notifier: Notifier,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            scanner,
            notifier,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Cap on simultaneous fetches; values below 1 are raised to 1.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn scanner(&self) -> &CodeScanner {
        &self.scanner
    }

    /// Fetch, extract and scan one source.
    pub async fn scan_source(
        &self,
        source: &Source,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<String>, SourceFailure> {
        sink.emit(progress(source, Stage::Queued));
        let fetched = self.fetcher.fetch(source, sink).await?;
        let meta = &fetched.metadata;
        if meta.redirect_count > 0 {
            engine_info!(
                "{} redirected {} time(s) to {}",
                meta.original_url,
                meta.redirect_count,
                meta.final_url
            );
        }
        engine_debug!(
            "Fetched {} ({} bytes, {}, content-type {})",
            meta.final_url,
            meta.byte_len,
            meta.encoding,
            meta.content_type.as_deref().unwrap_or("unknown")
        );

        let text = if source.is_html() {
            sink.emit(progress(source, Stage::Extracting));
            self.extractor.extract_visible_text(&fetched.body)?
        } else {
            fetched.body
        };

        sink.emit(progress(source, Stage::Scanning));
        let codes = self.scanner.find_codes(&text);
        sink.emit(progress(source, Stage::Done));
        Ok(codes)
    }

    /// Scan every source, returning per-source outcomes and all hits in
    /// configured source order.
    pub async fn scan_all(
        &self,
        sources: &[Source],
        sink: &dyn ProgressSink,
    ) -> (Vec<SourceOutcome>, Vec<CodeHit>) {
        let results: Vec<_> = stream::iter(sources)
            .map(|source| async move { (source, self.scan_source(source, sink).await) })
            .buffered(self.max_in_flight)
            .collect()
            .await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut hits = Vec::new();
        for (source, result) in results {
            let result = match result {
                Ok(codes) => {
                    engine_info!("Scanned {}: {} candidate(s)", source.url, codes.len());
                    let candidates = codes.len();
                    hits.extend(codes.into_iter().map(|code| CodeHit::new(code, &source.url)));
                    SourceResult::Scanned { candidates }
                }
                Err(err) => {
                    engine_warn!("Skipping source {}: {}", source.url, err);
                    SourceResult::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            let outcome = SourceOutcome {
                url: source.url.clone(),
                result,
            };
            sink.emit(WatchEvent::SourceCompleted(outcome.clone()));
            outcomes.push(outcome);
        }
        (outcomes, hits)
    }

    /// Run the full cycle once.
    pub async fn run_once(
        &self,
        sources: &[Source],
        store: &CodeStore,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, StoreError> {
        let (outcomes, hits) = self.scan_all(sources, sink).await;
        let merged = aggregate(hits);
        let candidates = merged.len();

        let blocking_store = store.clone();
        let batch = tokio::task::spawn_blocking(move || record_new_codes(merged, &blocking_store))
            .await
            .map_err(|err| StoreError::Task(err.to_string()))
            .and_then(|inserted| inserted)
            .map_err(|err| {
                engine_error!("Code store failed, skipping notifications: {}", err);
                err
            })?;

        let channels = if batch.is_empty() {
            engine_info!("No new codes this run");
            Vec::new()
        } else {
            self.notifier.notify(&batch).await
        };
        for outcome in &channels {
            sink.emit(WatchEvent::ChannelCompleted(outcome.clone()));
        }

        Ok(RunReport {
            sources: outcomes,
            candidates,
            new_codes: batch.entries().to_vec(),
            channels,
        })
    }
}

/// Insert aggregated hits; the ones the store accepted as new form the batch.
fn record_new_codes(
    hits: Vec<CodeHit>,
    store: &CodeStore,
) -> Result<NotificationBatch, StoreError> {
    let mut batch = NotificationBatch::default();
    for hit in hits {
        match store.insert_if_new(&hit.code, &hit.source)? {
            InsertOutcome::Inserted { .. } => {
                engine_info!("New code {} from {}", hit.code, hit.source);
                batch.push(hit);
            }
            InsertOutcome::AlreadyExists => {
                engine_debug!("Code {} already recorded", hit.code);
            }
        }
    }
    Ok(batch)
}

fn progress(source: &Source, stage: Stage) -> WatchEvent {
    WatchEvent::Progress(SourceProgress {
        url: source.url.clone(),
        stage,
        bytes: None,
    })
}
