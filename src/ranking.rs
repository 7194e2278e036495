//! Two-stage semantic ranking.
//!
//! Recall scores every candidate's title+abstract against the target text
//! through an embedding-similarity service and keeps the top 10% by count.
//! Precision reranks the recalled subset through a cross-encoder service with
//! its own top-10% truncation. Both services are consumed through long-lived
//! `ScoreClient` handles built once at pipeline startup.

use crate::error::{Result, ScholarError};
use crate::semanticscholar::Candidate;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Request timeout for one batched scoring call
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A candidate paired with its stage score. Transient, never persisted.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

/// Client for a batched scoring service.
///
/// The service takes (query, candidate-text) pairs and returns one score per
/// pair in input order; sorting is the caller's job.
pub struct ScoreClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    scores: Vec<f64>,
}

impl ScoreClient {
    /// Create a new ScoreClient for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScholarError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Score every text against the query in one batched call.
    pub async fn score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f64>> {
        let url = format!("{}/score", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "query": query, "texts": texts });

        debug!(url = %url, count = texts.len(), "Sending batched scoring request");

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ScholarError::Api {
                code: status.as_u16() as i32,
                message: format!("Scoring service error: {} - {}", status, error_text),
            });
        }

        let parsed: ScoreResponse = response.json().await.map_err(|e| {
            ScholarError::Parse(format!("Failed to parse scoring response: {}", e))
        })?;

        if parsed.scores.len() != texts.len() {
            return Err(ScholarError::Parse(format!(
                "Scoring service returned {} scores for {} texts",
                parsed.scores.len(),
                texts.len()
            )));
        }

        Ok(parsed.scores)
    }
}

/// Text form each candidate is scored under.
pub fn candidate_text(candidate: &Candidate) -> String {
    format!(
        "Title: {} Abstract: {}",
        candidate.title, candidate.abstract_text
    )
}

/// Number of entries kept by one ranking stage: `round(n/10)`.
///
/// Truncation is by count, not score threshold. Below 5 candidates this
/// rounds to 0 and the stage keeps nothing.
pub fn top_fraction(n: usize) -> usize {
    (n as f64 / 10.0).round() as usize
}

/// Coarse recall filter via the embedding-similarity service.
pub async fn recall(
    client: &ScoreClient,
    target: &str,
    candidates: Vec<Candidate>,
) -> Result<Vec<ScoredCandidate>> {
    rank_stage(client, target, candidates, "recall").await
}

/// Fine precision filter via the cross-encoder service, over recall's output.
pub async fn rerank(
    client: &ScoreClient,
    target: &str,
    recalled: Vec<ScoredCandidate>,
) -> Result<Vec<ScoredCandidate>> {
    let candidates = recalled.into_iter().map(|s| s.candidate).collect();
    rank_stage(client, target, candidates, "rerank").await
}

/// Score, stable-sort descending, keep the top `round(n/10)`.
///
/// The stable sort preserves service order among equal scores.
async fn rank_stage(
    client: &ScoreClient,
    target: &str,
    candidates: Vec<Candidate>,
    stage: &str,
) -> Result<Vec<ScoredCandidate>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = candidates.iter().map(candidate_text).collect();
    let scores = client.score_batch(target, &texts).await?;

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .zip(scores)
        .map(|(candidate, score)| ScoredCandidate { candidate, score })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let keep = top_fraction(scored.len());
    scored.truncate(keep);

    info!(stage = stage, kept = keep, "Ranking stage complete");
    Ok(scored)
}
