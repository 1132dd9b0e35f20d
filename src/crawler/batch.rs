use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::future::join_all;
use futures::FutureExt;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::crawler::gate::CancellationGate;
use crate::crawler::models::{CancelReason, CandidateRef, ExtractionResult};
use crate::crawler::progress::ResultAggregator;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batches_run: usize,
    pub cancelled: Option<CancelReason>,
}

/// Runs candidates in fixed-size groups: all of a group in flight at once,
/// the group fully joined before the next one starts.
pub struct BatchScheduler {
    batch_size: usize,
    batch_delay: Duration,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    pub fn batch_count(&self, candidates: usize) -> usize {
        candidates.div_ceil(self.batch_size)
    }

    /// `extract` gets each candidate with its position in the whole run.
    pub async fn run<'a, F, Fut>(
        &self,
        candidates: &'a [CandidateRef],
        gate: &CancellationGate,
        results: &mut ResultAggregator,
        extract: F,
    ) -> BatchOutcome
    where
        F: Fn(usize, &'a CandidateRef) -> Fut,
        Fut: Future<Output = ExtractionResult>,
    {
        let total_batches = self.batch_count(candidates.len());
        let mut outcome = BatchOutcome::default();

        for (batch, chunk) in candidates.chunks(self.batch_size).enumerate() {
            if let Err(reason) = gate.check() {
                warn!(batch, ?reason, "Batch scheduling cancelled");
                outcome.cancelled = Some(reason);
                break;
            }

            let started = Instant::now();
            let offset = batch * self.batch_size;

            // Every task settles before the join returns; a panic is contained to its candidate.
            let settled = join_all(chunk.iter().enumerate().map(|(i, candidate)| {
                AssertUnwindSafe(extract(offset + i, candidate)).catch_unwind()
            }))
            .await;

            let batch_results: Vec<ExtractionResult> = settled
                .into_iter()
                .zip(chunk)
                .map(|(res, candidate)| {
                    res.unwrap_or_else(|_| {
                        error!(slug = %candidate.slug, "Extraction panicked");
                        unresolved(candidate)
                    })
                })
                .collect();

            let found = batch_results.iter().filter(|r| r.phone.is_some()).count();
            results.merge_batch(batch, batch_results);
            outcome.batches_run += 1;

            info!(
                batch = batch + 1,
                total_batches,
                size = chunk.len(),
                found,
                processed = results.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch processed"
            );

            if batch + 1 < total_batches {
                sleep(self.batch_delay).await;
            }
        }

        outcome
    }
}

/// The result recorded when extraction could not run at all.
pub fn unresolved(candidate: &CandidateRef) -> ExtractionResult {
    ExtractionResult {
        id: candidate.id.clone(),
        slug: candidate.slug.clone(),
        name: candidate.slug.clone(),
        phone: None,
        whatsapp_link: String::new(),
        page_number: candidate.page_number,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::crawler::gate::CancelHandle;
    use crate::crawler::progress::ProgressEvent;

    fn candidates(n: usize) -> Vec<CandidateRef> {
        (0..n)
            .map(|i| CandidateRef {
                id: i.to_string(),
                slug: format!("c-{i}"),
                page_number: 1,
            })
            .collect()
    }

    fn found(candidate: &CandidateRef) -> ExtractionResult {
        ExtractionResult {
            phone: Some("3199998888".into()),
            name: candidate.slug.to_uppercase(),
            ..unresolved(candidate)
        }
    }

    #[tokio::test]
    async fn twenty_five_candidates_make_three_ordered_batches() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink_batches = Arc::clone(&batches);
        let sink = move |e: ProgressEvent<'_>| sink_batches.lock().unwrap().push(e.batch);

        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let all = candidates(25);
        let mut results = ResultAggregator::new(all.len(), Some(Arc::new(sink)));
        let scheduler = BatchScheduler::new(10, Duration::ZERO);

        let outcome = scheduler
            .run(&all, &CancelHandle::new().gate(), &mut results, |i, c| {
                let in_flight = &in_flight;
                let peak = &peak;
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    // Later candidates finish first; order must still hold.
                    sleep(Duration::from_millis(20 - (i % 10) as u64)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    found(c)
                }
            })
            .await;

        assert_eq!(outcome, BatchOutcome { batches_run: 3, cancelled: None });
        assert_eq!(peak.load(Ordering::SeqCst), 10);

        let per_batch = batches.lock().unwrap().clone();
        let sizes: Vec<usize> = (0..3)
            .map(|b| per_batch.iter().filter(|&&x| x == b).count())
            .collect();
        assert_eq!(sizes, [10, 10, 5]);
        assert!(per_batch.windows(2).all(|w| w[0] <= w[1]));

        let ids: Vec<String> = results.into_entries().into_iter().map(|r| r.id).collect();
        let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_spaced_by_the_delay_except_after_the_last() {
        let delay = Duration::from_secs(1);
        let started = tokio::time::Instant::now();
        let batch_starts = Mutex::new(Vec::new());

        let all = candidates(25);
        let mut results = ResultAggregator::new(all.len(), None);
        let scheduler = BatchScheduler::new(10, delay);

        scheduler
            .run(&all, &CancelHandle::new().gate(), &mut results, |i, c| {
                if i % 10 == 0 {
                    batch_starts.lock().unwrap().push(started.elapsed());
                }
                async move { found(c) }
            })
            .await;

        assert_eq!(
            *batch_starts.lock().unwrap(),
            [Duration::ZERO, delay, delay * 2]
        );
        assert_eq!(started.elapsed(), delay * 2);
        assert_eq!(results.len(), 25);
    }

    #[tokio::test]
    async fn one_panicking_candidate_leaves_the_rest() {
        let all = candidates(10);
        let mut results = ResultAggregator::new(all.len(), None);
        let scheduler = BatchScheduler::new(10, Duration::ZERO);

        scheduler
            .run(&all, &CancelHandle::new().gate(), &mut results, |i, c| async move {
                if i == 4 {
                    panic!("renderer blew up");
                }
                found(c)
            })
            .await;

        let entries = results.into_entries();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries.iter().filter(|e| e.phone.is_some()).count(), 9);
        assert_eq!(entries[4], unresolved(&all[4]));
    }

    #[tokio::test]
    async fn cancellation_stops_before_the_next_batch() {
        let handle = CancelHandle::new();
        let gate = handle.gate();
        let all = candidates(25);
        let mut results = ResultAggregator::new(all.len(), None);
        let scheduler = BatchScheduler::new(10, Duration::ZERO);
        let calls = AtomicUsize::new(0);

        let outcome = scheduler
            .run(&all, &gate, &mut results, |_, c| {
                let calls = &calls;
                let handle = handle.clone();
                async move {
                    // Cancel from inside the first batch; that batch still finishes.
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        handle.cancel();
                    }
                    found(c)
                }
            })
            .await;

        assert_eq!(outcome.batches_run, 1);
        assert_eq!(outcome.cancelled, Some(CancelReason::Requested));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(results.len(), 10);
    }
}
