use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::crawler::batch::BatchScheduler;
use crate::crawler::error::CrawlError;
use crate::crawler::extractor::ContactExtractor;
use crate::crawler::fetcher::{RenderSession, SessionLauncher};
use crate::crawler::gate::{CancelHandle, CancellationGate};
use crate::crawler::listing::ListingCollector;
use crate::crawler::models::{
    CandidateRef, CrawlOutcome, CrawlRequest, CrawlResult, ExtractionResult,
};
use crate::crawler::progress::{ProgressSink, ResultAggregator};
use crate::messages::{self, MessagePool};

pub struct ScrapingService {
    cfg: Config,
    messages: MessagePool,
    launcher: Arc<dyn SessionLauncher>,
}

impl ScrapingService {
    pub fn new(cfg: Config, messages: MessagePool, launcher: Arc<dyn SessionLauncher>) -> Self {
        Self {
            cfg,
            messages,
            launcher,
        }
    }

    pub fn messages(&self) -> &MessagePool {
        &self.messages
    }

    /// One crawl: listing discovery, then batched contact extraction.
    ///
    /// Returns a possibly partial result, or a single fatal error. The session
    /// is released on every path out of here.
    pub async fn run(
        &self,
        req: &CrawlRequest,
        cancel: &CancelHandle,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<CrawlOutcome, CrawlError> {
        req.validate()?;

        let started = Instant::now();
        let _deadline = cancel.arm_deadline(self.cfg.run_timeout());
        let gate = cancel.gate();

        let mut collector = ListingCollector::new(&self.cfg)?;
        let extractor = ContactExtractor::new(&self.cfg)?;

        info!(
            city = %req.city_slug,
            start_page = req.start_page,
            end_page = req.end_page,
            at = %chrono::Local::now().format("%H:%M:%S"),
            "Starting crawl"
        );

        let session = self.launcher.launch().await.map_err(|e| {
            error!(error = %e, "Could not start rendering session");
            CrawlError::SessionStart(e)
        })?;

        let phases = AssertUnwindSafe(self.run_phases(
            session.as_ref(),
            req,
            &gate,
            &mut collector,
            &extractor,
            progress,
        ))
        .catch_unwind()
        .await;

        info!("Closing rendering session");
        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close rendering session");
        }

        let outcome = phases.map_err(|panic| {
            let reason = panic_message(panic.as_ref());
            error!(reason = %reason, "Crawl aborted");
            CrawlError::Fatal(reason)
        })?;

        let elapsed = started.elapsed();
        let total = outcome.result().total_count;
        info!(
            city = %req.city_slug,
            total,
            incomplete = outcome.result().incomplete,
            elapsed_secs = elapsed.as_secs(),
            avg_secs_per_entry = if total > 0 { elapsed.as_secs() / total as u64 } else { 0 },
            finished_at = %chrono::Local::now().format("%H:%M:%S"),
            "Crawl finished"
        );

        Ok(outcome)
    }

    async fn run_phases(
        &self,
        session: &dyn RenderSession,
        req: &CrawlRequest,
        gate: &CancellationGate,
        collector: &mut ListingCollector,
        extractor: &ContactExtractor,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> CrawlOutcome {
        let phase1 = Instant::now();
        info!("Phase 1: collecting listing");
        let discovery = collector.collect(session, req, gate).await;
        info!(
            candidates = discovery.candidates.len(),
            pages_fetched = discovery.pages_fetched,
            elapsed_ms = phase1.elapsed().as_millis() as u64,
            "Phase 1 done"
        );

        let mut results = ResultAggregator::new(discovery.candidates.len(), progress);

        let cancelled = match discovery.cancelled {
            Some(reason) => Some(reason),
            None => {
                let phase2 = Instant::now();
                let scheduler = BatchScheduler::new(self.cfg.batch_size, self.cfg.batch_delay());
                info!(
                    batch_size = self.cfg.batch_size,
                    batches = scheduler.batch_count(discovery.candidates.len()),
                    "Phase 2: extracting contacts"
                );

                let outcome = scheduler
                    .run(&discovery.candidates, gate, &mut results, |ordinal, candidate| {
                        self.extract_one(session, extractor, req, ordinal, candidate)
                    })
                    .await;

                info!(
                    batches_run = outcome.batches_run,
                    with_phone = results.with_phone(),
                    without_phone = results.len() - results.with_phone(),
                    elapsed_ms = phase2.elapsed().as_millis() as u64,
                    "Phase 2 done"
                );
                outcome.cancelled
            }
        };

        let entries = results.into_entries();
        let result = CrawlResult {
            city_slug: req.city_slug.clone(),
            pages_requested: req.pages_requested(),
            total_count: entries.len(),
            entries,
            incomplete: cancelled.is_some(),
        };

        match cancelled {
            Some(reason) => {
                warn!(?reason, kept = result.total_count, "Returning partial result");
                CrawlOutcome::Cancelled {
                    reason,
                    partial: result,
                }
            }
            None => CrawlOutcome::Completed(result),
        }
    }

    async fn extract_one(
        &self,
        session: &dyn RenderSession,
        extractor: &ContactExtractor,
        req: &CrawlRequest,
        ordinal: usize,
        candidate: &CandidateRef,
    ) -> ExtractionResult {
        let contact = extractor.extract(session, candidate).await;

        let whatsapp_link = match &contact.phone {
            Some(phone) => messages::whatsapp_link(
                &self.cfg.country_code,
                phone,
                self.messages.message_for(&req.message, ordinal),
            ),
            None => String::new(),
        };

        ExtractionResult {
            id: candidate.id.clone(),
            slug: candidate.slug.clone(),
            name: contact.name,
            phone: contact.phone,
            whatsapp_link,
            page_number: candidate.page_number,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected panic".to_string()
    }
}
