//! The rendering capability the crawler drives.
//!
//! A [`RenderSession`] lives for one run and hands out isolated
//! [`RenderedPage`]s, one per concurrent fetch. [`HttpSession`] is the
//! production implementation: a shared `reqwest` client (cookies included)
//! with each page keeping its own document state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::crawler::error::FetchError;
use crate::crawler::parser;

/// Typed stand-in for evaluating a script against the loaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageQuery {
    Title,
    BodyText,
    /// `href` of every anchor whose target contains one of the needles.
    AnchorTargets { contains: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Text(String),
    Links(Vec<String>),
}

impl QueryValue {
    pub fn into_text(self) -> String {
        match self {
            QueryValue::Text(text) => text,
            QueryValue::Links(links) => links.join("\n"),
        }
    }

    pub fn into_links(self) -> Vec<String> {
        match self {
            QueryValue::Links(links) => links,
            QueryValue::Text(text) if text.is_empty() => Vec::new(),
            QueryValue::Text(text) => vec![text],
        }
    }
}

/// Which interactive element counts as the reveal control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealPredicate {
    keywords: Vec<String>,
}

impl RevealPredicate {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn contact_button() -> Self {
        Self::new(["whatsapp", "chamar"])
    }

    pub fn matches(&self, visible_text: &str) -> bool {
        let text = visible_text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

#[async_trait]
pub trait RenderSession: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn RenderedPage>, FetchError>;

    /// Releases the session. Safe to call more than once.
    async fn close(&self) -> Result<(), FetchError>;
}

#[async_trait]
pub trait RenderedPage: Send {
    /// Loads `url` and returns the rendered document.
    async fn navigate(&mut self, url: &str) -> Result<String, FetchError>;

    async fn evaluate(&self, query: PageQuery) -> Result<QueryValue, FetchError>;

    /// Activates the first element matching `predicate`. `false` when none matched.
    async fn simulate_activation(
        &mut self,
        predicate: &RevealPredicate,
    ) -> Result<bool, FetchError>;

    async fn close(&mut self);
}

/// Acquires the run's session. Failing here is fatal to the run.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, FetchError>;
}

pub struct HttpLauncher {
    cfg: Config,
}

impl HttpLauncher {
    pub fn new(cfg: &Config) -> Self {
        Self { cfg: cfg.clone() }
    }
}

#[async_trait]
impl SessionLauncher for HttpLauncher {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, FetchError> {
        Ok(Box::new(HttpSession::launch(&self.cfg)?))
    }
}

pub struct HttpSession {
    client: Client,
    timeout: Duration,
    open_pages: Arc<AtomicUsize>,
    closed: AtomicBool,
}

impl HttpSession {
    pub fn launch(cfg: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .cookie_store(true)
            .timeout(cfg.fetch_timeout())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            timeout: cfg.fetch_timeout(),
            open_pages: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl RenderSession for HttpSession {
    async fn open_page(&self) -> Result<Box<dyn RenderedPage>, FetchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FetchError::SessionClosed);
        }
        self.open_pages.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            timeout: self.timeout,
            location: None,
            html: String::new(),
            open_pages: Arc::clone(&self.open_pages),
            closed: false,
        }))
    }

    async fn close(&self) -> Result<(), FetchError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let leaked = self.open_pages.load(Ordering::SeqCst);
        if leaked > 0 {
            warn!(leaked, "Closing session with pages still open");
        }
        debug!("Rendering session closed");
        Ok(())
    }
}

struct HttpPage {
    client: Client,
    timeout: Duration,
    location: Option<Url>,
    html: String,
    open_pages: Arc<AtomicUsize>,
    closed: bool,
}

impl HttpPage {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let secs = self.timeout.as_secs();
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e, secs))?;

        if !res.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: res.status().as_u16(),
            });
        }

        res.text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e, secs))
    }

    fn loaded(&self) -> Result<&Url, FetchError> {
        self.location.as_ref().ok_or(FetchError::NoDocument)
    }
}

#[async_trait]
impl RenderedPage for HttpPage {
    async fn navigate(&mut self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let html = self.fetch_html(url).await?;
        self.location = Some(parsed);
        self.html = html.clone();
        Ok(html)
    }

    async fn evaluate(&self, query: PageQuery) -> Result<QueryValue, FetchError> {
        let base = self.loaded()?;
        let value = match query {
            PageQuery::Title => QueryValue::Text(parser::document_title(&self.html)),
            PageQuery::BodyText => QueryValue::Text(parser::body_text(&self.html)),
            PageQuery::AnchorTargets { contains } => {
                QueryValue::Links(parser::anchor_targets(&self.html, base, &contains))
            }
        };
        Ok(value)
    }

    async fn simulate_activation(
        &mut self,
        predicate: &RevealPredicate,
    ) -> Result<bool, FetchError> {
        let base = self.loaded()?.clone();
        let Some(element) = parser::find_reveal_element(&self.html, predicate) else {
            return Ok(false);
        };

        // A plain request stands in for the click: follow whatever the control
        // points at on the same site and splice the response into the document.
        let target = parser::reveal_target(&base, element.target.as_deref());

        if let Some(target) = target {
            debug!(target = %target, "Following reveal control");
            let fragment = self.fetch_html(target.as_str()).await?;
            self.html.push('\n');
            self.html.push_str(&fragment);
        }

        Ok(true)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for HttpPage {
    fn drop(&mut self) {
        if !self.closed {
            self.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
