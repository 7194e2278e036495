//! Semantic Scholar Bulk Search Client
//!
//! Issues a single boolean keyword query against the bulk search endpoint
//! and normalizes raw paper objects into `Candidate` records.
//!
//! API Details:
//! - Bulk endpoint: GET /graph/v1/paper/search/bulk
//! - Boolean query syntax: quoted terms joined with `+` (AND) or `|` (OR)
//! - Rate limit: 1 req/s (unauthenticated), higher with API key

use crate::error::{Result, ScholarError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Semantic Scholar API base URL
const SS_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Fields requested for every paper in the search response
const SEARCH_FIELDS: &str =
    "paperId,title,year,authors.name,abstract,venue,citationCount,url,isOpenAccess,openAccessPdf";

/// How the keywords are combined in the boolean query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// All keywords must match (`"a" + "b"`)
    And,
    /// Any keyword may match (`"a" | "b"`)
    Or,
}

/// A single retrieved scholarly work with bibliographic metadata.
///
/// Identity is `paper_id`; immutable once created by the search client or
/// restored from the corpus cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub paper_id: String,
    pub year: Option<i32>,
    pub title: String,
    pub authors: Vec<String>,
    pub venue: String,
    pub citation_count: u64,
    pub abstract_text: String,
    pub is_open_access: bool,
    /// Direct open-access PDF location, absent for paywalled works
    pub pdf_url: Option<String>,
}

/// Compose the boolean query string from keywords.
///
/// Each keyword is double-quoted; AND joins with `" + "`, OR with `" | "`.
pub fn build_query(keywords: &[String], mode: SearchMode) -> String {
    let quoted: Vec<String> = keywords.iter().map(|kw| format!("\"{}\"", kw)).collect();
    match mode {
        SearchMode::And => quoted.join(" + "),
        SearchMode::Or => quoted.join(" | "),
    }
}

/// Search client holding one long-lived HTTP handle.
pub struct SearchClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SearchClient {
    /// Create a new SearchClient.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Optional Semantic Scholar API key for higher rate limits
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: SS_API_BASE.to_string(),
            api_key,
        })
    }

    /// Override the API base URL (used by tests against a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run one bulk search and return the normalized candidate set.
    ///
    /// Results are filtered to `year_low` onwards and sorted by citation
    /// count descending by the service. Any non-200 status is fatal at this
    /// layer; there is no retry.
    pub async fn search(
        &self,
        keywords: &[String],
        mode: SearchMode,
        year_low: i32,
    ) -> Result<Vec<Candidate>> {
        let query = build_query(keywords, mode);
        let year_filter = format!("{}-", year_low);
        let url = format!("{}/paper/search/bulk", self.base_url);

        info!(query = %query, year_low = year_low, "Starting Semantic Scholar bulk search");

        let mut request = self.client.get(&url).query(&[
            ("query", query.as_str()),
            ("fields", SEARCH_FIELDS),
            ("year", year_filter.as_str()),
            ("sort", "citationCount:desc"),
        ]);

        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), error = %error_text, "Search API error");
            return Err(ScholarError::Api {
                code: status.as_u16() as i32,
                message: format!("Semantic Scholar API error: {} - {}", status, error_text),
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            ScholarError::Parse(format!("Failed to parse search response: {}", e))
        })?;

        let candidates: Vec<Candidate> = body.data.into_iter().map(normalize_paper).collect();

        info!(total = candidates.len(), "Search complete");
        debug!(
            open_access = candidates.iter().filter(|c| c.is_open_access).count(),
            "Open-access candidates in result set"
        );

        Ok(candidates)
    }
}

// === Semantic Scholar API Response Types ===

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<RawPaper>,
}

#[derive(Debug, Deserialize)]
struct RawPaper {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    year: Option<i32>,
    title: Option<String>,
    #[serde(default)]
    authors: Vec<RawAuthor>,
    venue: Option<String>,
    #[serde(rename = "citationCount")]
    citation_count: Option<u64>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "isOpenAccess")]
    is_open_access: Option<bool>,
    #[serde(rename = "openAccessPdf")]
    open_access_pdf: Option<RawOpenAccessPdf>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOpenAccessPdf {
    url: Option<String>,
}

/// Normalize a raw paper object into a Candidate.
///
/// Missing abstract or PDF URL is legal for non-open-access works.
fn normalize_paper(paper: RawPaper) -> Candidate {
    let authors = paper
        .authors
        .into_iter()
        .filter_map(|a| a.name)
        .collect::<Vec<_>>();

    let pdf_url = paper
        .open_access_pdf
        .and_then(|p| p.url)
        .filter(|u| !u.is_empty());

    Candidate {
        paper_id: paper.paper_id.unwrap_or_default(),
        year: paper.year,
        title: paper.title.unwrap_or_default(),
        authors,
        venue: paper.venue.unwrap_or_default(),
        citation_count: paper.citation_count.unwrap_or(0),
        abstract_text: paper.abstract_text.unwrap_or_default(),
        is_open_access: paper.is_open_access.unwrap_or(false),
        pdf_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_query_and() {
        let keywords = vec!["generative ai".to_string(), "review".to_string()];
        assert_eq!(
            build_query(&keywords, SearchMode::And),
            r#""generative ai" + "review""#
        );
    }

    #[test]
    fn test_build_query_or() {
        let keywords = vec!["a".to_string(), "b".to_string()];
        assert_eq!(build_query(&keywords, SearchMode::Or), r#""a" | "b""#);
    }

    #[test]
    fn test_normalize_paper_defaults() {
        let raw: RawPaper = serde_json::from_str(r#"{"paperId": "p1", "title": "T"}"#)
            .expect("Failed to parse fixture");
        let candidate = normalize_paper(raw);
        assert_eq!(candidate.paper_id, "p1");
        assert_eq!(candidate.title, "T");
        assert!(candidate.abstract_text.is_empty());
        assert!(!candidate.is_open_access);
        assert!(candidate.pdf_url.is_none());
    }

    #[test]
    fn test_normalize_paper_open_access() {
        let raw: RawPaper = serde_json::from_str(
            r#"{
                "paperId": "p2",
                "title": "Open Paper",
                "year": 2021,
                "authors": [{"name": "Ada Lovelace"}, {"name": null}],
                "venue": "ACL",
                "citationCount": 42,
                "abstract": "An abstract.",
                "isOpenAccess": true,
                "openAccessPdf": {"url": "https://example.org/p2.pdf"}
            }"#,
        )
        .expect("Failed to parse fixture");
        let candidate = normalize_paper(raw);
        assert_eq!(candidate.year, Some(2021));
        assert_eq!(candidate.authors, vec!["Ada Lovelace".to_string()]);
        assert_eq!(candidate.citation_count, 42);
        assert!(candidate.is_open_access);
        assert_eq!(candidate.pdf_url.as_deref(), Some("https://example.org/p2.pdf"));
    }

    #[tokio::test]
    async fn test_search_normalizes_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/search/bulk"))
            .and(query_param("query", r#""ml""#))
            .and(query_param("sort", "citationCount:desc"))
            .and(query_param("year", "2020-"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data": [{"paperId": "x", "title": "X", "citationCount": 7}]}"#,
            ))
            .mount(&server)
            .await;

        let client = SearchClient::new(None)
            .expect("Failed to build client")
            .with_base_url(server.uri());
        let candidates = client
            .search(&["ml".to_string()], SearchMode::And, 2020)
            .await
            .expect("Search failed");

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].paper_id, "x");
        assert_eq!(candidates[0].citation_count, 7);
    }

    #[tokio::test]
    async fn test_search_non_success_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper/search/bulk"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let client = SearchClient::new(None)
            .expect("Failed to build client")
            .with_base_url(server.uri());
        let err = client
            .search(&["ml".to_string()], SearchMode::And, 2020)
            .await
            .expect_err("Expected API error");

        match err {
            ScholarError::Api { code, .. } => assert_eq!(code, 429),
            other => panic!("Unexpected error: {}", other),
        }
    }
}
