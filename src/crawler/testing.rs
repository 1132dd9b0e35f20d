//! Scripted rendering session for tests: canned documents per URL, injected
//! failures and delays, and a log of every navigation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::crawler::error::FetchError;
use crate::crawler::fetcher::{
    PageQuery, QueryValue, RenderSession, RenderedPage, RevealPredicate, SessionLauncher,
};
use crate::crawler::parser;

#[derive(Default)]
struct Script {
    pages: HashMap<String, String>,
    failures: HashSet<String>,
    panics: HashSet<String>,
    delays: HashMap<String, Duration>,
    fetched: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedSession {
    script: Arc<Mutex<Script>>,
    open_pages: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, url: &str, html: &str) {
        self.script.lock().unwrap().pages.insert(url.to_string(), html.to_string());
    }

    pub fn fail(&self, url: &str) {
        self.script.lock().unwrap().failures.insert(url.to_string());
    }

    /// Navigating to `url` panics inside the renderer.
    pub fn explode(&self, url: &str) {
        self.script.lock().unwrap().panics.insert(url.to_string());
    }

    pub fn delay(&self, url: &str, by: Duration) {
        self.script.lock().unwrap().delays.insert(url.to_string(), by);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.script.lock().unwrap().fetched.clone()
    }

    pub fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn load(&self, url: &str) -> Result<String, FetchError> {
        let delay = {
            let mut script = self.script.lock().unwrap();
            script.fetched.push(url.to_string());
            script.delays.get(url).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (explode, result) = {
            let script = self.script.lock().unwrap();
            let result = if script.failures.contains(url) {
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                })
            } else {
                script.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            };
            (script.panics.contains(url), result)
        };
        // Outside the lock so the script is not poisoned.
        if explode {
            panic!("scripted renderer crash at {url}");
        }
        result
    }
}

#[async_trait]
impl RenderSession for ScriptedSession {
    async fn open_page(&self) -> Result<Box<dyn RenderedPage>, FetchError> {
        if self.is_closed() {
            return Err(FetchError::SessionClosed);
        }
        self.open_pages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedPage {
            session: self.clone(),
            location: None,
            html: String::new(),
            closed: false,
        }))
    }

    async fn close(&self) -> Result<(), FetchError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SessionLauncher for ScriptedSession {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, FetchError> {
        Ok(Box::new(self.clone()))
    }
}

/// A launcher whose session never comes up.
pub struct BrokenLauncher;

#[async_trait]
impl SessionLauncher for BrokenLauncher {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, FetchError> {
        Err(FetchError::Other("browser binary not found".into()))
    }
}

struct ScriptedPage {
    session: ScriptedSession,
    location: Option<Url>,
    html: String,
    closed: bool,
}

#[async_trait]
impl RenderedPage for ScriptedPage {
    async fn navigate(&mut self, url: &str) -> Result<String, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let html = self.session.load(url).await?;
        self.location = Some(parsed);
        self.html = html.clone();
        Ok(html)
    }

    async fn evaluate(&self, query: PageQuery) -> Result<QueryValue, FetchError> {
        let base = self.location.as_ref().ok_or(FetchError::NoDocument)?;
        Ok(match query {
            PageQuery::Title => QueryValue::Text(parser::document_title(&self.html)),
            PageQuery::BodyText => QueryValue::Text(parser::body_text(&self.html)),
            PageQuery::AnchorTargets { contains } => {
                QueryValue::Links(parser::anchor_targets(&self.html, base, &contains))
            }
        })
    }

    async fn simulate_activation(
        &mut self,
        predicate: &RevealPredicate,
    ) -> Result<bool, FetchError> {
        let base = self.location.clone().ok_or(FetchError::NoDocument)?;
        let Some(element) = parser::find_reveal_element(&self.html, predicate) else {
            return Ok(false);
        };
        let target = parser::reveal_target(&base, element.target.as_deref());
        if let Some(target) = target {
            let fragment = self.session.load(target.as_str()).await?;
            self.html.push('\n');
            self.html.push_str(&fragment);
        }
        Ok(true)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.session.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedPage {
    fn drop(&mut self) {
        if !self.closed {
            self.session.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// A listing page with one card per `(id, slug)`.
pub fn listing_page(cards: &[(&str, &str)]) -> String {
    let cards: String = cards
        .iter()
        .map(|(id, slug)| {
            format!(r#"<div class="card"><a href="/profile/{id}/{slug}">{slug}</a></div>"#)
        })
        .collect();
    format!("<html><head><title>Listing</title></head><body>{cards}</body></html>")
}

pub fn detail_page(title: &str, body: &str) -> String {
    format!("<html><head><title>{title}</title></head><body>{body}</body></html>")
}
