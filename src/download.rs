//! Open-access PDF acquisition.
//!
//! Publisher sites that serve open-access PDFs often refuse bare download
//! requests. The acquirer follows the landing-page-first strategy: fetch the
//! HTML page corresponding to the PDF URL to establish session cookies,
//! re-resolve the canonical PDF link from that page, wait a short randomized
//! interval, then fetch the PDF with the landing page as Referer.
//!
//! Every attempt resolves to an explicit `FetchOutcome` so retry control flow
//! is visible in the types rather than inferred from error subclassing.

use crate::error::{Result, ScholarError};
use crate::semanticscholar::Candidate;
use futures::StreamExt;
use rand::Rng;
use regex::Regex;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Browser User-Agent pool; one is picked per acquirer instance.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
];

/// Acquirer configuration.
#[derive(Debug, Clone)]
pub struct AcquirerConfig {
    /// Directory PDFs are saved into as `<paper_id>.pdf`
    pub download_dir: PathBuf,
    /// Maximum whole-procedure attempts per candidate
    pub max_retries: u32,
    /// Linear backoff unit: retry n waits `base_delay * n`
    pub base_delay: Duration,
    /// Lower bound of the randomized pause before the PDF fetch
    pub delay_min: Duration,
    /// Upper bound of the randomized pause before the PDF fetch
    pub delay_max: Duration,
}

impl AcquirerConfig {
    /// Default knobs for a download directory.
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            download_dir,
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            delay_min: Duration::from_secs(1),
            delay_max: Duration::from_secs(3),
        }
    }
}

/// Terminal (or initial) acquisition state for one candidate.
///
/// Transitions are forward-only: `Pending` resolves into exactly one of the
/// other variants and never reverts.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionStatus {
    Pending,
    Downloaded(PathBuf),
    Failed(String),
    NotOpenAccess,
}

/// Acquisition record for one candidate, keyed by paper id.
#[derive(Debug, Clone)]
pub struct AcquisitionResult {
    pub paper_id: String,
    pub status: AcquisitionStatus,
}

/// Outcome of a single download attempt.
enum FetchOutcome {
    Success(PathBuf),
    Retryable(String),
    Fatal(String),
}

/// Downloads open-access PDFs one candidate at a time.
pub struct FullTextAcquirer {
    client: reqwest::Client,
    config: AcquirerConfig,
}

impl FullTextAcquirer {
    /// Create a new acquirer and ensure the download directory exists.
    ///
    /// The HTTP client keeps a cookie store so the landing-page visit carries
    /// its session into the PDF fetch.
    pub fn new(config: AcquirerConfig) -> Result<Self> {
        let user_agent = USER_AGENTS[rand::thread_rng().gen_range(0..USER_AGENTS.len())];

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        std::fs::create_dir_all(&config.download_dir)?;

        Ok(Self { client, config })
    }

    /// Acquire full text for one candidate.
    ///
    /// Candidates that are not open-access or carry no PDF URL resolve to
    /// `NotOpenAccess` without any network traffic. An already-downloaded
    /// non-empty file is reused without re-fetching. Failures are local to
    /// the candidate; this never returns an error.
    pub async fn acquire(&self, candidate: &Candidate) -> AcquisitionResult {
        let mut result = AcquisitionResult {
            paper_id: candidate.paper_id.clone(),
            status: AcquisitionStatus::Pending,
        };

        let pdf_url = match candidate.pdf_url.as_deref() {
            Some(url) if candidate.is_open_access && !url.is_empty() => url,
            _ => {
                debug!(paper_id = %candidate.paper_id, "Not open-access, skipping download");
                result.status = AcquisitionStatus::NotOpenAccess;
                return result;
            }
        };

        let save_path = self
            .config
            .download_dir
            .join(format!("{}.pdf", candidate.paper_id));

        if let Ok(meta) = std::fs::metadata(&save_path) {
            if meta.len() > 0 {
                info!(paper_id = %candidate.paper_id, path = ?save_path, "Reusing existing download");
                result.status = AcquisitionStatus::Downloaded(save_path);
                return result;
            }
        }

        result.status = match self.download_with_retries(pdf_url, &save_path).await {
            Ok(path) => AcquisitionStatus::Downloaded(path),
            Err(reason) => AcquisitionStatus::Failed(reason),
        };
        result
    }

    /// Run the whole attempt procedure up to `max_retries` times with linear
    /// backoff between attempts.
    async fn download_with_retries(
        &self,
        pdf_url: &str,
        save_path: &Path,
    ) -> std::result::Result<PathBuf, String> {
        let mut last_reason = String::new();

        for attempt in 1..=self.config.max_retries {
            if attempt > 1 {
                let backoff = self.config.base_delay * (attempt - 1);
                debug!(attempt = attempt, backoff_ms = backoff.as_millis() as u64, "Retrying download");
                tokio::time::sleep(backoff).await;
            }

            match self.attempt_download(pdf_url, save_path).await {
                FetchOutcome::Success(path) => {
                    info!(url = %pdf_url, path = ?path, attempt = attempt, "Download complete");
                    return Ok(path);
                }
                FetchOutcome::Fatal(reason) => {
                    warn!(url = %pdf_url, reason = %reason, "Download failed fatally");
                    return Err(reason);
                }
                FetchOutcome::Retryable(reason) => {
                    warn!(url = %pdf_url, attempt = attempt, reason = %reason, "Attempt failed");
                    last_reason = reason;
                }
            }
        }

        Err(format!(
            "retries exhausted after {} attempts: {}",
            self.config.max_retries, last_reason
        ))
    }

    /// One full attempt: landing page, link re-resolution, pause, PDF fetch,
    /// verification.
    async fn attempt_download(&self, pdf_url: &str, save_path: &Path) -> FetchOutcome {
        let landing_url = derive_landing_url(pdf_url);
        let mut target_url = pdf_url.to_string();

        debug!(landing = %landing_url, "Visiting landing page");

        match self.client.get(&landing_url).send().await {
            Ok(response) if response.status().is_success() => {
                let html = response.text().await.unwrap_or_default();
                if let Some(extracted) = extract_pdf_link(&html, &landing_url) {
                    if extracted != pdf_url {
                        info!(extracted = %extracted, "Adopting PDF link from landing page");
                        target_url = extracted;
                    }
                }
            }
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                return FetchOutcome::Fatal("landing page returned HTTP 404".to_string());
            }
            Ok(response) => {
                return FetchOutcome::Retryable(format!(
                    "landing page returned HTTP {}",
                    response.status()
                ));
            }
            Err(e) => {
                return FetchOutcome::Retryable(format!("landing page request failed: {}", e));
            }
        }

        self.random_pause().await;

        debug!(url = %target_url, "Fetching PDF");

        let response = match self
            .client
            .get(&target_url)
            .header("Referer", landing_url.as_str())
            .header("Accept", "application/pdf,application/octet-stream,*/*;q=0.8")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Retryable(format!("PDF request failed: {}", e)),
        };

        let status = response.status();
        if status == StatusCode::OK {
            self.stream_to_disk(response, save_path).await
        } else if status == StatusCode::FORBIDDEN {
            FetchOutcome::Retryable("HTTP 403 Forbidden".to_string())
        } else if status == StatusCode::NOT_FOUND {
            FetchOutcome::Fatal("HTTP 404 Not Found".to_string())
        } else if status == StatusCode::CONFLICT {
            // 409 gets a longer pause before the next attempt
            tokio::time::sleep(self.config.base_delay * 2).await;
            FetchOutcome::Retryable("HTTP 409 Conflict".to_string())
        } else {
            FetchOutcome::Fatal(format!("HTTP {}", status))
        }
    }

    /// Stream the response body to disk and verify the saved file.
    ///
    /// A missing `content-length` with a non-empty body is a success; a
    /// zero-byte file consumes a retry.
    async fn stream_to_disk(&self, response: reqwest::Response, save_path: &Path) -> FetchOutcome {
        let expected = response.content_length();

        let mut file = match std::fs::File::create(save_path) {
            Ok(file) => file,
            Err(e) => return FetchOutcome::Retryable(format!("failed to create file: {}", e)),
        };

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => return FetchOutcome::Retryable(format!("body stream interrupted: {}", e)),
            };
            if let Err(e) = file.write_all(&bytes) {
                return FetchOutcome::Retryable(format!("failed to write file: {}", e));
            }
            written += bytes.len() as u64;
        }

        if written == 0 {
            let _ = std::fs::remove_file(save_path);
            return FetchOutcome::Retryable("saved file is empty".to_string());
        }

        if let Some(total) = expected {
            if written < total {
                warn!(written = written, expected = total, "Partial body accepted");
            }
        }

        debug!(bytes = written, path = ?save_path, "Saved PDF");
        FetchOutcome::Success(save_path.to_path_buf())
    }

    /// Short randomized pause between the landing-page visit and the PDF
    /// fetch; bounds come from the config so tests can zero them.
    async fn random_pause(&self) {
        let span = self
            .config
            .delay_max
            .saturating_sub(self.config.delay_min)
            .as_millis() as u64;
        let jitter = if span == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=span)
        };
        let pause = self.config.delay_min + Duration::from_millis(jitter);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}

/// Derive the presumed HTML landing page for a PDF URL: strip the `.pdf`
/// suffix and ensure a trailing separator.
pub fn derive_landing_url(pdf_url: &str) -> String {
    let stripped = pdf_url.strip_suffix(".pdf").unwrap_or(pdf_url);
    if stripped.ends_with('/') {
        stripped.to_string()
    } else {
        format!("{}/", stripped)
    }
}

/// Extract a canonical PDF link from landing page HTML.
///
/// Checks anchor hrefs ending in `.pdf`, then the `citation_pdf_url` meta
/// tag, then a raw URL pattern over the whole document. Relative links are
/// resolved against the landing URL.
pub fn extract_pdf_link(html: &str, landing_url: &str) -> Option<String> {
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                if href.to_ascii_lowercase().ends_with(".pdf") {
                    return absolutize(landing_url, href);
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse(r#"meta[name="citation_pdf_url"]"#) {
        if let Some(element) = document.select(&selector).next() {
            if let Some(content) = element.value().attr("content") {
                return absolutize(landing_url, content);
            }
        }
    }

    let pattern = Regex::new(r#"https?://[^"'\s<>]+\.pdf"#).ok()?;
    pattern.find(html).map(|m| m.as_str().to_string())
}

/// Resolve a possibly-relative href against the landing page URL.
fn absolutize(base: &str, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    url::Url::parse(base)
        .ok()?
        .join(href)
        .ok()
        .map(|u| u.to_string())
}
