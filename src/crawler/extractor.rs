use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crawler::error::FetchError;
use crate::crawler::fetcher::{PageQuery, RenderSession, RenderedPage, RevealPredicate};
use crate::crawler::models::CandidateRef;
use crate::crawler::parser::{self, PhoneMatcher};

/// Name and phone for one candidate. `phone: None` covers both misses and failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub phone: Option<String>,
}

pub struct ContactExtractor {
    phones: PhoneMatcher,
    reveal: RevealPredicate,
    link_needles: Vec<String>,
    fetch_timeout: Duration,
    render_wait: Duration,
    reveal_wait: Duration,
    cfg: Config,
}

impl ContactExtractor {
    pub fn new(cfg: &Config) -> Result<Self, regex::Error> {
        Ok(Self {
            phones: PhoneMatcher::new(&cfg.country_code)?,
            reveal: RevealPredicate::contact_button(),
            link_needles: vec!["wa.me".into(), "whatsapp".into()],
            fetch_timeout: cfg.fetch_timeout(),
            render_wait: cfg.render_wait(),
            reveal_wait: cfg.reveal_wait(),
            cfg: cfg.clone(),
        })
    }

    /// Never fails: every error degrades to a contact without phone.
    pub async fn extract(&self, session: &dyn RenderSession, candidate: &CandidateRef) -> Contact {
        let mut page = match session.open_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!(slug = %candidate.slug, error = %e, "Could not open page");
                return self.fallback(candidate);
            }
        };

        let contact = self.extract_on(page.as_mut(), candidate).await;
        page.close().await;

        match contact {
            Ok(contact) => contact,
            Err(e) => {
                warn!(slug = %candidate.slug, error = %e, "Failed to load detail page");
                self.fallback(candidate)
            }
        }
    }

    async fn extract_on(
        &self,
        page: &mut dyn RenderedPage,
        candidate: &CandidateRef,
    ) -> Result<Contact, FetchError> {
        let url = self.cfg.detail_url(&candidate.id, &candidate.slug);
        info!(id = %candidate.id, slug = %candidate.slug, "Fetching detail page");

        self.timed(&url, page.navigate(&url)).await?;
        sleep(self.render_wait).await;

        let title = page.evaluate(PageQuery::Title).await?.into_text();
        let name = parser::display_name(&title, &candidate.slug);

        // Past this point a failure still keeps the name.
        let phone = match self.reveal_phone(page, &url).await {
            Ok(phone) => phone,
            Err(e) => {
                warn!(slug = %candidate.slug, error = %e, "Failed to reveal phone");
                None
            }
        };

        debug!(slug = %candidate.slug, found = phone.is_some(), "Detail page done");
        Ok(Contact { name, phone })
    }

    async fn reveal_phone(
        &self,
        page: &mut dyn RenderedPage,
        url: &str,
    ) -> Result<Option<String>, FetchError> {
        let activated = self
            .timed(url, page.simulate_activation(&self.reveal))
            .await?;
        if !activated {
            return Ok(None);
        }
        sleep(self.reveal_wait).await;

        let text = page.evaluate(PageQuery::BodyText).await?.into_text();
        if let Some(phone) = self.phones.find_in_text(&text) {
            return Ok(Some(phone));
        }

        let links = page
            .evaluate(PageQuery::AnchorTargets {
                contains: self.link_needles.clone(),
            })
            .await?
            .into_links();

        Ok(links
            .first()
            .and_then(|href| self.phones.find_in_link(href)))
    }

    async fn timed<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        tokio::time::timeout(self.fetch_timeout, fut)
            .await
            .map_err(|_| FetchError::Timeout {
                what: what.to_string(),
                secs: self.fetch_timeout.as_secs(),
            })?
    }

    fn fallback(&self, candidate: &CandidateRef) -> Contact {
        Contact {
            name: candidate.slug.clone(),
            phone: None,
        }
    }
}
