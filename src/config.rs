use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub listing_url_template: String,
    pub detail_path_segment: String,
    pub page_delay_ms: u64,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub fetch_timeout_secs: u64,
    pub render_wait_ms: u64,
    pub reveal_wait_ms: u64,
    pub run_timeout_secs: u64,
    pub country_code: String,
    pub messages_file: Option<String>,
    pub bind_addr: String,
    pub user_agent: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let cfg = Self {
            base_url: env::var("LISTING_BASE_URL")
                .context("LISTING_BASE_URL must be set")?
                .trim_end_matches('/')
                .to_string(),
            listing_url_template: env::var("LISTING_URL_TEMPLATE")
                .unwrap_or_else(|_| "{base}/listings/{city}?page={page}".into()),
            detail_path_segment: env::var("DETAIL_PATH_SEGMENT")
                .unwrap_or_else(|_| "profile".into()),
            page_delay_ms: parse_or("PAGE_DELAY_MS", 1000)?,
            batch_size: parse_or("BATCH_SIZE", 10)?,
            batch_delay_ms: parse_or("BATCH_DELAY_MS", 1000)?,
            fetch_timeout_secs: parse_or("FETCH_TIMEOUT_SECS", 30)?,
            render_wait_ms: parse_or("RENDER_WAIT_MS", 2000)?,
            reveal_wait_ms: parse_or("REVEAL_WAIT_MS", 3000)?,
            run_timeout_secs: parse_or("RUN_TIMEOUT_SECS", 600)?,
            country_code: env::var("PHONE_COUNTRY_CODE").unwrap_or_else(|_| "55".into()),
            messages_file: env::var("MESSAGES_FILE").ok(),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into()),
            user_agent: env::var("USER_AGENT").unwrap_or_else(|_| {
                concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into()
            }),
        };

        anyhow::ensure!(cfg.batch_size > 0, "BATCH_SIZE must be at least 1");
        Ok(cfg)
    }

    pub fn listing_url(&self, city_slug: &str, page: u32) -> String {
        self.listing_url_template
            .replace("{base}", &self.base_url)
            .replace("{city}", city_slug)
            .replace("{page}", &page.to_string())
    }

    pub fn detail_url(&self, id: &str, slug: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url, self.detail_path_segment, id, slug
        )
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn render_wait(&self) -> Duration {
        Duration::from_millis(self.render_wait_ms)
    }

    pub fn reveal_wait(&self) -> Duration {
        Duration::from_millis(self.reveal_wait_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Zero delays, short timeouts, fixed site layout.
    pub fn for_tests() -> Self {
        Self {
            base_url: "https://listing.test".into(),
            listing_url_template: "{base}/listings/{city}?page={page}".into(),
            detail_path_segment: "profile".into(),
            page_delay_ms: 0,
            batch_size: 10,
            batch_delay_ms: 0,
            fetch_timeout_secs: 2,
            render_wait_ms: 0,
            reveal_wait_ms: 0,
            run_timeout_secs: 60,
            country_code: "55".into(),
            messages_file: None,
            bind_addr: "127.0.0.1:0".into(),
            user_agent: "listing-harvester-tests".into(),
        }
    }
}
