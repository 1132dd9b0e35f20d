//! Outreach message templates and deep-link construction.

use std::path::Path;

use anyhow::Context;
use rand::seq::SliceRandom;

const DEFAULT_TEMPLATES: [&str; 4] = [
    "Hello! I found your listing and would like to get in touch.",
    "Hi, how are you? I saw your profile and would like to talk.",
    "Hello, is this still available? I would like more details.",
    "Hi! Could we talk for a moment about your listing?",
];

#[derive(Debug, Clone)]
pub struct MessagePool {
    templates: Vec<String>,
}

impl Default for MessagePool {
    fn default() -> Self {
        Self {
            templates: DEFAULT_TEMPLATES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl MessagePool {
    /// Templates separated by blank lines. An empty file falls back to the defaults.
    pub fn parse(raw: &str) -> Self {
        let mut templates = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in raw.lines().chain(std::iter::once("")) {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    templates.push(current.join("\n"));
                    current.clear();
                }
            } else {
                current.push(line.trim_end());
            }
        }

        if templates.is_empty() {
            Self::default()
        } else {
            Self { templates }
        }
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read message templates from {}", path.display()))?;
        Ok(Self::parse(&raw))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Cycles through the pool so consecutive entries get different texts.
    pub fn by_index(&self, index: usize) -> &str {
        &self.templates[index % self.templates.len()]
    }

    pub fn random(&self) -> &str {
        self.templates
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// The request's own message wins; a blank one picks from the pool.
    pub fn message_for<'a>(&'a self, requested: &'a str, index: usize) -> &'a str {
        if requested.trim().is_empty() {
            self.by_index(index)
        } else {
            requested
        }
    }
}

/// `https://wa.me/<cc><phone>?text=<message>`, message percent-encoded.
pub fn whatsapp_link(country_code: &str, phone: &str, message: &str) -> String {
    format!(
        "https://wa.me/{}{}?text={}",
        country_code,
        phone,
        urlencoding::encode(message)
    )
}
