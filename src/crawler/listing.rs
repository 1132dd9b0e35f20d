use regex::Regex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crawler::dedup::DedupIndex;
use crate::crawler::error::FetchError;
use crate::crawler::fetcher::RenderSession;
use crate::crawler::gate::CancellationGate;
use crate::crawler::models::{CancelReason, CandidateRef, CrawlRequest};
use crate::crawler::parser::{self, DetailLink};

/// What phase 1 produced, and whether it was cut short.
#[derive(Debug, Default)]
pub struct Discovery {
    pub candidates: Vec<CandidateRef>,
    pub pages_fetched: u32,
    pub cancelled: Option<CancelReason>,
}

pub struct ListingCollector {
    cfg: Config,
    detail_links: Regex,
    index: DedupIndex,
}

impl ListingCollector {
    pub fn new(cfg: &Config) -> Result<Self, regex::Error> {
        Ok(Self {
            cfg: cfg.clone(),
            detail_links: parser::detail_link_pattern(&cfg.detail_path_segment)?,
            index: DedupIndex::new(),
        })
    }

    /// Walks the requested pages in order until the listing runs dry.
    pub async fn collect(
        &mut self,
        session: &dyn RenderSession,
        req: &CrawlRequest,
        gate: &CancellationGate,
    ) -> Discovery {
        let mut discovery = Discovery::default();

        for page in req.start_page..=req.end_page {
            if let Err(reason) = gate.check() {
                warn!(page, ?reason, "Listing walk cancelled");
                discovery.cancelled = Some(reason);
                break;
            }

            debug!(page, "Fetching listing page");
            let links = match self.fetch_links(session, &req.city_slug, page).await {
                Ok(links) => links,
                Err(e) => {
                    warn!(page, error = %e, "Failed to crawl page links");
                    self.pause(page, req.end_page).await;
                    continue;
                }
            };
            discovery.pages_fetched += 1;

            if links.is_empty() {
                info!(page, "No items on page, end of listing");
                break;
            }

            let raw = links.len();
            let fresh = self.admit(links, page);
            info!(page, raw, new = fresh.len(), seen = self.index.len(), "Found item links");
            discovery.candidates.extend(fresh);

            self.pause(page, req.end_page).await;
        }

        discovery
    }

    /// Filters out keys already seen this run and tags the rest with `page`.
    fn admit(&mut self, links: Vec<DetailLink>, page: u32) -> Vec<CandidateRef> {
        links
            .into_iter()
            .map(|link| CandidateRef {
                id: link.id,
                slug: link.slug,
                page_number: page,
            })
            .filter(|candidate| self.index.insert(candidate.key()))
            .collect()
    }

    async fn fetch_links(
        &self,
        session: &dyn RenderSession,
        city_slug: &str,
        page: u32,
    ) -> Result<Vec<DetailLink>, FetchError> {
        let url = self.cfg.listing_url(city_slug, page);
        let mut tab = session.open_page().await?;

        let loaded = tokio::time::timeout(self.cfg.fetch_timeout(), tab.navigate(&url)).await;
        tab.close().await;

        let html = loaded.map_err(|_| FetchError::Timeout {
            what: url.clone(),
            secs: self.cfg.fetch_timeout_secs,
        })??;

        Ok(parser::extract_detail_links(&html, &self.detail_links))
    }

    async fn pause(&self, page: u32, last: u32) {
        if page < last {
            sleep(self.cfg.page_delay()).await;
        }
    }
}
