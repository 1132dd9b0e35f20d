use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::crawler::fetcher::RevealPredicate;

static ANCHORS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static CONTROLS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("button, a").unwrap());

/// Attributes a reveal control may carry its target in, checked in order after `href`.
const TARGET_ATTRS: [&str; 3] = ["data-href", "data-url", "data-target-url"];

/// A detail link as it appears on a listing page, duplicates included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailLink {
    pub id: String,
    pub slug: String,
}

/// Builds the matcher for `/{segment}/{numeric id}/{slug}` hrefs.
pub fn detail_link_pattern(segment: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"/{}/(\d+)/([^/?#\s]+)",
        regex::escape(segment.trim_matches('/'))
    ))
}

/// Every detail link on the page, in document order.
pub fn extract_detail_links(html: &str, pattern: &Regex) -> Vec<DetailLink> {
    let document = Html::parse_document(html);

    document
        .select(&ANCHORS)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| pattern.captures(href))
        .map(|caps| DetailLink {
            id: caps[1].to_string(),
            slug: caps[2].to_string(),
        })
        .collect()
}

pub fn document_title(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Display name from a page title such as `"Ana Paula | Listing Site"`.
pub fn display_name(title: &str, fallback: &str) -> String {
    let name = title.split('|').next().unwrap_or_default().trim();
    if name.is_empty() {
        fallback.to_string()
    } else {
        name.to_string()
    }
}

/// Visible text of every `<body>` in the document, one token per line.
///
/// Spliced-in fragments may carry their own `<body>`, so all of them count.
pub fn body_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut tokens: Vec<&str> = Vec::new();
    for body in document.select(&BODY) {
        for t in body.text() {
            let s = t.trim();
            if !s.is_empty() {
                tokens.push(s);
            }
        }
    }
    tokens.join("\n")
}

/// Absolute `href` of anchors whose target contains any of `needles`.
pub fn anchor_targets(html: &str, base: &Url, needles: &[String]) -> Vec<String> {
    let document = Html::parse_document(html);

    document
        .select(&ANCHORS)
        .filter_map(|el| el.value().attr("href"))
        .filter(|href| needles.iter().any(|n| href.contains(n.as_str())))
        .map(|href| {
            base.join(href)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| href.to_string())
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealElement {
    pub text: String,
    pub target: Option<String>,
}

/// First `button` or `a` whose visible text satisfies `predicate`.
pub fn find_reveal_element(html: &str, predicate: &RevealPredicate) -> Option<RevealElement> {
    let document = Html::parse_document(html);

    let el = document
        .select(&CONTROLS)
        .find(|el| predicate.matches(&el.text().collect::<String>()))?;

    let attrs = el.value();
    let href = attrs
        .attr("href")
        .filter(|h| !h.starts_with('#') && !h.starts_with("javascript:"));
    let target = href
        .or_else(|| TARGET_ATTRS.iter().find_map(|a| attrs.attr(a)))
        .map(str::to_string);

    Some(RevealElement {
        text: el.text().collect::<String>().trim().to_string(),
        target,
    })
}

/// Where activating the control leads, when that is another page on the same site.
pub fn reveal_target(base: &Url, target: Option<&str>) -> Option<Url> {
    target
        .and_then(|t| base.join(t).ok())
        .filter(|t| t.host_str() == base.host_str() && t.path() != base.path())
}

/// Phone-shaped patterns in priority order, each exposing the number as `num`.
#[derive(Debug, Clone)]
pub struct PhoneMatcher {
    text_patterns: Vec<Regex>,
    link_pattern: Regex,
    country_code: String,
}

impl PhoneMatcher {
    pub fn new(country_code: &str) -> Result<Self, regex::Error> {
        let cc = regex::escape(country_code);
        let text_patterns = vec![
            // (31) 99999-9999, 31 9 9999 9999, 3199999-9999
            Regex::new(r"(?:^|\D)(?P<num>\(?\d{2}\)?\s*9?\s*\d{4}[-\s]?\d{4})(?:\D|$)")?,
            // a bare run of exactly 10 or 11 digits
            Regex::new(r"(?:^|\D)(?P<num>\d{10,11})(?:\D|$)")?,
            Regex::new(&format!(r"wa\.me/\+?(?:{cc})?(?P<num>\d{{10,11}})(?:\D|$)"))?,
        ];
        let link_pattern = Regex::new(r"(?:wa\.me/|phone=)\+?(?P<num>\d+)")?;

        Ok(Self {
            text_patterns,
            link_pattern,
            country_code: country_code.to_string(),
        })
    }

    /// First match of the highest-priority pattern that normalizes to a phone.
    pub fn find_in_text(&self, text: &str) -> Option<String> {
        self.text_patterns.iter().find_map(|pattern| {
            let caps = pattern.captures(text)?;
            normalize_phone(&caps["num"], &self.country_code)
        })
    }

    /// Phone from a deep link target such as `https://wa.me/5531999999999`.
    pub fn find_in_link(&self, href: &str) -> Option<String> {
        let caps = self.link_pattern.captures(href)?;
        normalize_phone(&caps["num"], &self.country_code)
    }
}

/// Digits only, country code stripped, length 10 or 11; anything else is `None`.
pub fn normalize_phone(raw: &str, country_code: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    let local = match digits.len() {
        10 | 11 => digits.as_str(),
        _ if !country_code.is_empty() && digits.starts_with(country_code) => {
            &digits[country_code.len()..]
        }
        _ => return None,
    };

    matches!(local.len(), 10 | 11).then(|| local.to_string())
}
