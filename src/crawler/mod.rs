pub mod batch;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod gate;
pub mod listing;
pub mod models;
pub mod parser;
pub mod progress;
pub mod service;

#[cfg(test)]
pub mod testing;

pub use error::CrawlError;
pub use fetcher::HttpLauncher;
pub use gate::CancelHandle;
pub use models::{CancelReason, CrawlOutcome, CrawlRequest, CrawlResult};
pub use progress::ProgressEvent;
pub use service::ScrapingService;
