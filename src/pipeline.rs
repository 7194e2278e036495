//! Pipeline controller.
//!
//! Sequences search, caching, two-stage ranking, full-text acquisition,
//! context assembly, and review generation. All stages run strictly
//! sequentially; the only shared mutable resources are the corpus cache file
//! and the download directory, both owned by this process. Service clients
//! are built once here and reused across invocations.

use crate::context;
use crate::corpus;
use crate::download::{AcquirerConfig, AcquisitionStatus, FullTextAcquirer};
use crate::error::Result;
use crate::generate::{GeneratorConfig, ReviewGenerator};
use crate::ranking::{self, ScoreClient};
use crate::semanticscholar::{SearchClient, SearchMode};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Everything the pipeline needs besides the per-invocation request.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Year lower bound for the search
    pub year_low: i32,
    /// Semantic Scholar API key
    pub s2_api_key: Option<String>,
    /// Embedding-similarity service base URL
    pub embed_url: String,
    /// Cross-encoder rerank service base URL
    pub rerank_url: String,
    /// Generation endpoint settings
    pub generator: GeneratorConfig,
    /// Corpus snapshot path
    pub cache_path: PathBuf,
    /// PDF download directory
    pub download_dir: PathBuf,
    /// Download attempts per candidate
    pub max_retries: u32,
    /// Linear backoff unit for download retries
    pub base_delay: Duration,
}

/// Data directory under the user's home, `~/.rustscholar`.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rustscholar")
}

/// One review request: keywords plus the target paper's texts.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub keywords: Vec<String>,
    pub mode: SearchMode,
    pub target_abstract: String,
    /// Externally produced synthesis of the target's contribution, opaque here
    pub innovation_summary: String,
}

/// Grounding context built by the assembler and consumed once by generation.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub keywords: Vec<String>,
    pub target_abstract: String,
    pub innovation_summary: String,
    pub reference_block: String,
    pub citation_block: String,
}

/// The review pipeline with its long-lived service clients.
pub struct Pipeline {
    config: PipelineConfig,
    search: SearchClient,
    embedder: ScoreClient,
    reranker: ScoreClient,
    acquirer: FullTextAcquirer,
    generator: ReviewGenerator,
}

impl Pipeline {
    /// Build all service clients once, at startup.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let search = SearchClient::new(config.s2_api_key.clone())?;
        let embedder = ScoreClient::new(config.embed_url.clone())?;
        let reranker = ScoreClient::new(config.rerank_url.clone())?;
        let acquirer = FullTextAcquirer::new(AcquirerConfig {
            max_retries: config.max_retries,
            base_delay: config.base_delay,
            ..AcquirerConfig::new(config.download_dir.clone())
        })?;
        let generator = ReviewGenerator::new(config.generator.clone())?;

        Ok(Self {
            config,
            search,
            embedder,
            reranker,
            acquirer,
            generator,
        })
    }

    /// Build with a custom search client (tests point it at a mock server).
    #[cfg(test)]
    fn with_search_client(config: PipelineConfig, search: SearchClient) -> Result<Self> {
        let mut pipeline = Self::new(config)?;
        pipeline.search = search;
        Ok(pipeline)
    }

    /// Run the full pipeline and return the generated review text.
    pub async fn run(&self, request: &ReviewRequest) -> Result<String> {
        info!(keywords = ?request.keywords, "Starting review pipeline");

        let candidates = corpus::load_or_fetch(&self.config.cache_path, || {
            self.search
                .search(&request.keywords, request.mode, self.config.year_low)
        })
        .await?;
        info!(count = candidates.len(), "Candidate corpus ready");

        let recalled =
            ranking::recall(&self.embedder, &request.target_abstract, candidates).await?;
        let reranked =
            ranking::rerank(&self.reranker, &request.target_abstract, recalled).await?;
        info!(count = reranked.len(), "Final candidate set selected");

        // One candidate at a time; a failed download degrades that candidate
        // to abstract-only text and the loop moves on.
        let mut acquisitions = Vec::with_capacity(reranked.len());
        for scored in &reranked {
            let result = self.acquirer.acquire(&scored.candidate).await;
            if let AcquisitionStatus::Failed(reason) = &result.status {
                warn!(paper_id = %result.paper_id, reason = %reason, "Full text unavailable");
            }
            acquisitions.push(result);
        }

        let assembled = context::assemble(&reranked, &acquisitions);

        let pipeline_context = PipelineContext {
            keywords: request.keywords.clone(),
            target_abstract: request.target_abstract.clone(),
            innovation_summary: request.innovation_summary.clone(),
            reference_block: assembled.reference_block,
            citation_block: assembled.citation_block,
        };

        let review = self.generator.generate(&pipeline_context).await?;
        info!(chars = review.len(), "Review pipeline complete");
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_score_server(scores: Vec<f64>) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/score"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "scores": scores })),
            )
            .mount(&server)
            .await;
        server
    }

    fn corpus_line(i: usize) -> String {
        serde_json::json!({
            "paper_id": format!("p{}", i),
            "year": 2021,
            "title": format!("Synthetic paper {}", i),
            "authors": ["A. Author"],
            "venue": "Workshop",
            "citation_count": 100 - i,
            "abstract_text": format!("Synthetic abstract {}", i),
            "is_open_access": false,
            "pdf_url": null
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_end_to_end_with_cached_corpus() {
        let dir = tempdir().expect("Failed to create temp dir");
        let cache_path = dir.path().join("corpus.jsonl");

        // 100 cached candidates; the search service must never be contacted.
        let lines: Vec<String> = (0..100).map(corpus_line).collect();
        std::fs::write(&cache_path, lines.join("\n")).expect("Failed to seed cache");

        // Embedding scores strictly decreasing by index, rerank reversed:
        // recall keeps p0..p9, rerank keeps exactly p9.
        let embed_server =
            mock_score_server((0..100).map(|i| 1.0 - i as f64 / 100.0).collect()).await;
        let rerank_server = mock_score_server((0..10).map(|i| i as f64 / 10.0).collect()).await;

        let gen_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("Synthetic paper 9"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"choices": [{"message": {"content": "Grounded review."}}]}"#,
            ))
            .expect(1)
            .mount(&gen_server)
            .await;

        let search_server = MockServer::start().await;

        let config = PipelineConfig {
            year_low: 2020,
            s2_api_key: None,
            embed_url: embed_server.uri(),
            rerank_url: rerank_server.uri(),
            generator: GeneratorConfig {
                base_url: gen_server.uri(),
                ..GeneratorConfig::default()
            },
            cache_path,
            download_dir: dir.path().join("downloads"),
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        };

        let search = SearchClient::new(None)
            .expect("Failed to build search client")
            .with_base_url(search_server.uri());
        let pipeline =
            Pipeline::with_search_client(config, search).expect("Failed to build pipeline");

        let request = ReviewRequest {
            keywords: vec!["generative ai".to_string()],
            mode: SearchMode::And,
            target_abstract: "Target abstract.".to_string(),
            innovation_summary: "Novelty summary.".to_string(),
        };

        let review = pipeline.run(&request).await.expect("Pipeline failed");

        assert_eq!(review, "Grounded review.");
        assert!(
            search_server
                .received_requests()
                .await
                .unwrap_or_default()
                .is_empty(),
            "cache hit must bypass the search client"
        );
    }
}
