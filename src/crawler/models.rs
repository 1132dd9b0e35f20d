use serde::{Deserialize, Serialize};

/// Most pages a single run may request (`end - start` is capped at one less).
pub const MAX_PAGE_SPAN: u32 = 19;

/// A detail record discovered on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRef {
    pub id: String,
    pub slug: String,
    pub page_number: u32,
}

impl CandidateRef {
    pub fn key(&self) -> DedupKey {
        DedupKey {
            id: self.id.clone(),
            slug: self.slug.clone(),
        }
    }
}

/// Identity of a candidate across the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub id: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub phone: Option<String>,
    pub whatsapp_link: String,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    pub city_slug: String,
    pub start_page: u32,
    pub end_page: u32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("city slug is required")]
    MissingCity,

    #[error("page numbers must be greater than 0")]
    PageBelowOne,

    #[error("end page {end} is before start page {start}")]
    InvertedRange { start: u32, end: u32 },

    #[error("at most {max} pages per run", max = MAX_PAGE_SPAN + 1)]
    RangeTooLarge,
}

impl CrawlRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.city_slug.trim().is_empty() {
            return Err(ValidationError::MissingCity);
        }
        if self.start_page < 1 || self.end_page < 1 {
            return Err(ValidationError::PageBelowOne);
        }
        if self.end_page < self.start_page {
            return Err(ValidationError::InvertedRange {
                start: self.start_page,
                end: self.end_page,
            });
        }
        if self.end_page - self.start_page > MAX_PAGE_SPAN {
            return Err(ValidationError::RangeTooLarge);
        }
        Ok(())
    }

    pub fn pages_requested(&self) -> u32 {
        self.end_page.saturating_sub(self.start_page) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub city_slug: String,
    /// The requested range, not the number of pages fetched before the listing ran out.
    #[serde(rename = "pagesProcessed")]
    pub pages_requested: u32,
    pub total_count: usize,
    pub entries: Vec<ExtractionResult>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Requested,
    Deadline,
}

/// How a run ended when it did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    Completed(CrawlResult),
    Cancelled {
        reason: CancelReason,
        partial: CrawlResult,
    },
}

impl CrawlOutcome {
    pub fn result(&self) -> &CrawlResult {
        match self {
            CrawlOutcome::Completed(result) => result,
            CrawlOutcome::Cancelled { partial, .. } => partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: u32, end: u32) -> CrawlRequest {
        CrawlRequest {
            city_slug: "arcos-mg".into(),
            start_page: start,
            end_page: end,
            message: "Oi".into(),
        }
    }

    #[test]
    fn accepts_twenty_pages() {
        assert_eq!(request(1, 20).validate(), Ok(()));
        assert_eq!(request(1, 20).pages_requested(), 20);
    }

    #[test]
    fn rejects_more_than_twenty_pages() {
        assert_eq!(request(1, 21).validate(), Err(ValidationError::RangeTooLarge));
        assert_eq!(request(5, 40).validate(), Err(ValidationError::RangeTooLarge));
    }

    #[test]
    fn rejects_zero_pages_and_missing_city() {
        assert_eq!(request(0, 3).validate(), Err(ValidationError::PageBelowOne));
        let mut req = request(1, 2);
        req.city_slug = "  ".into();
        assert_eq!(req.validate(), Err(ValidationError::MissingCity));
    }

    #[test]
    fn result_serializes_with_wire_names() {
        let result = CrawlResult {
            city_slug: "arcos-mg".into(),
            pages_requested: 2,
            total_count: 1,
            entries: vec![ExtractionResult {
                id: "42".into(),
                slug: "ana".into(),
                name: "Ana".into(),
                phone: None,
                whatsapp_link: String::new(),
                page_number: 1,
            }],
            incomplete: false,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["citySlug"], "arcos-mg");
        assert_eq!(json["pagesProcessed"], 2);
        assert_eq!(json["totalCount"], 1);
        assert_eq!(json["entries"][0]["whatsappLink"], "");
        assert_eq!(json["entries"][0]["pageNumber"], 1);
        assert!(json["entries"][0]["phone"].is_null());
        assert!(json.get("incomplete").is_none());
    }
}
