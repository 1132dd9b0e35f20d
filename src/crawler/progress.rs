use std::sync::Arc;

use crate::crawler::models::ExtractionResult;

#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    /// Zero-based index of the batch the result came from.
    pub batch: usize,
    pub processed: usize,
    pub total_known: usize,
    pub latest: &'a ExtractionResult,
}

/// Receives one event per completed candidate. Purely informational.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent<'_>);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent<'_>) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent<'_>) {
        self(event)
    }
}

/// Ordered results of one run plus the optional progress hook.
pub struct ResultAggregator {
    entries: Vec<ExtractionResult>,
    total_known: usize,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl ResultAggregator {
    pub fn new(total_known: usize, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            entries: Vec::with_capacity(total_known),
            total_known,
            sink,
        }
    }

    /// Appends a finished batch in submission order and reports each result.
    pub fn merge_batch(&mut self, batch: usize, results: Vec<ExtractionResult>) {
        for result in results {
            self.entries.push(result);
            if let Some(sink) = &self.sink {
                if let Some(latest) = self.entries.last() {
                    sink.on_progress(ProgressEvent {
                        batch,
                        processed: self.entries.len(),
                        total_known: self.total_known,
                        latest,
                    });
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn with_phone(&self) -> usize {
        self.entries.iter().filter(|e| e.phone.is_some()).count()
    }

    pub fn into_entries(self) -> Vec<ExtractionResult> {
        self.entries
    }
}
