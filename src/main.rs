//! rustscholar - Literature-Grounded Review Generation Pipeline
//!
//! A Rust microservice that retrieves related works for a target abstract,
//! narrows them through two-stage semantic ranking, grounds a review prompt
//! in acquired full text, and generates the review.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! rustscholar review "generative ai,literature review" --abstract-file paper.txt
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! rustscholar serve --port 38015
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use rustscholar::generate::GeneratorConfig;
use rustscholar::pipeline::{default_data_dir, Pipeline, PipelineConfig, ReviewRequest};
use rustscholar::semanticscholar::SearchMode;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Literature-Grounded Review Generation Pipeline - Rust Microservice
#[derive(Parser)]
#[command(name = "rustscholar")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Service endpoints and storage paths shared by the subcommands.
#[derive(Args, Debug, Clone)]
struct ServiceArgs {
    /// Semantic Scholar API key (falls back to S2_API_KEY)
    #[arg(long)]
    s2_key: Option<String>,

    /// Embedding-similarity service base URL
    #[arg(long, default_value = "http://localhost:38014")]
    embed_url: String,

    /// Cross-encoder rerank service base URL
    #[arg(long, default_value = "http://localhost:38013")]
    rerank_url: String,

    /// Generation endpoint base URL (OpenAI-compatible)
    #[arg(long, default_value = "http://localhost:38011/v1")]
    gen_url: String,

    /// Generation API key (falls back to GEN_API_KEY)
    #[arg(long)]
    gen_key: Option<String>,

    /// Generation model name
    #[arg(long, default_value = "OpenSciLM/Llama-3.1_OpenScholar-8B")]
    gen_model: String,

    /// Generation token budget
    #[arg(long, default_value = "3000")]
    max_tokens: u32,

    /// Year filter (results from this year onwards; default: current - 5)
    #[arg(long)]
    ylo: Option<i32>,

    /// Corpus snapshot path (default: ~/.rustscholar/corpus.jsonl)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// PDF download directory (default: ~/.rustscholar/downloads)
    #[arg(long)]
    downloads: Option<PathBuf>,

    /// Download attempts per candidate
    #[arg(long, default_value = "3")]
    max_retries: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a review for a target abstract
    Review {
        /// Comma-separated topical keywords
        keywords: String,

        /// File containing the target abstract
        #[arg(long)]
        abstract_file: PathBuf,

        /// File containing the externally produced innovation summary
        #[arg(long)]
        innovation_file: Option<PathBuf>,

        /// Keyword combination mode
        #[arg(long, default_value = "and", value_parser = ["and", "or"])]
        mode: String,

        /// Write the review here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "38015")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Manage the corpus snapshot cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show the snapshot file path
    Path,
    /// Delete the snapshot so the next run re-queries the search service
    Clear,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Review {
            keywords,
            abstract_file,
            innovation_file,
            mode,
            output,
            service,
        } => run_review(keywords, abstract_file, innovation_file, mode, output, service).await,
        Commands::Serve {
            port,
            host,
            service,
        } => run_server(host, port, service).await,
        Commands::Cache { action } => handle_cache(action),
    }
}

// ============================================================================
// Review Command
// ============================================================================

async fn run_review(
    keywords: String,
    abstract_file: PathBuf,
    innovation_file: Option<PathBuf>,
    mode: String,
    output: Option<PathBuf>,
    service: ServiceArgs,
) -> Result<()> {
    let target_abstract = std::fs::read_to_string(&abstract_file)
        .with_context(|| format!("Failed to read abstract file {:?}", abstract_file))?;

    let innovation_summary = match innovation_file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read innovation file {:?}", path))?,
        None => String::new(),
    };

    let request = ReviewRequest {
        keywords: parse_keywords(&keywords),
        mode: parse_mode(&mode),
        target_abstract,
        innovation_summary,
    };

    if request.keywords.is_empty() {
        anyhow::bail!("No keywords provided");
    }

    let pipeline = Pipeline::new(build_pipeline_config(&service)).context("Failed to build pipeline")?;
    let review = pipeline.run(&request).await.context("Pipeline failed")?;

    match output {
        Some(path) => {
            std::fs::write(&path, &review)
                .with_context(|| format!("Failed to write review to {:?}", path))?;
            println!("Review written to {}", path.display());
        }
        None => println!("{}", review),
    }

    Ok(())
}

/// Split the comma-separated keyword list, dropping empty segments.
fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|kw| kw.trim().to_string())
        .filter(|kw| !kw.is_empty())
        .collect()
}

fn parse_mode(raw: &str) -> SearchMode {
    match raw {
        "or" => SearchMode::Or,
        _ => SearchMode::And,
    }
}

/// Year filter default: current year - 5.
fn default_ylo() -> i32 {
    Local::now()
        .format("%Y")
        .to_string()
        .parse()
        .unwrap_or(2020)
        - 5
}

fn build_pipeline_config(service: &ServiceArgs) -> PipelineConfig {
    let data_dir = default_data_dir();

    let s2_api_key = service
        .s2_key
        .clone()
        .or_else(|| std::env::var("S2_API_KEY").ok());
    let gen_api_key = service
        .gen_key
        .clone()
        .or_else(|| std::env::var("GEN_API_KEY").ok())
        .unwrap_or_default();

    PipelineConfig {
        year_low: service.ylo.unwrap_or_else(default_ylo),
        s2_api_key,
        embed_url: service.embed_url.clone(),
        rerank_url: service.rerank_url.clone(),
        generator: GeneratorConfig {
            base_url: service.gen_url.clone(),
            api_key: gen_api_key,
            model: service.gen_model.clone(),
            max_tokens: service.max_tokens,
            ..GeneratorConfig::default()
        },
        cache_path: service
            .cache
            .clone()
            .unwrap_or_else(|| data_dir.join("corpus.jsonl")),
        download_dir: service
            .downloads
            .clone()
            .unwrap_or_else(|| data_dir.join("downloads")),
        max_retries: service.max_retries,
        base_delay: Duration::from_secs(2),
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(host: String, port: u16, service: ServiceArgs) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let pipeline = Pipeline::new(build_pipeline_config(&service)).context("Failed to build pipeline")?;
    let app_state = Arc::new(AppState { pipeline });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/review", post(review_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

struct AppState {
    pipeline: Pipeline,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Review request body
#[derive(Debug, Deserialize)]
struct ReviewRequestBody {
    keywords: Vec<String>,
    target_abstract: String,
    #[serde(default)]
    innovation_summary: String,
    mode: Option<String>,
}

/// Review response
#[derive(Debug, Serialize)]
struct ReviewResponse {
    status: String,
    review: String,
}

/// Review endpoint handler
async fn review_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReviewRequestBody>,
) -> Json<ReviewResponse> {
    info!(keywords = ?body.keywords, "Review request");

    let request = ReviewRequest {
        keywords: body.keywords,
        mode: parse_mode(body.mode.as_deref().unwrap_or("and")),
        target_abstract: body.target_abstract,
        innovation_summary: body.innovation_summary,
    };

    match state.pipeline.run(&request).await {
        Ok(review) => Json(ReviewResponse {
            status: "success".to_string(),
            review,
        }),
        Err(e) => {
            error!(error = %e, "Review generation failed");
            Json(ReviewResponse {
                status: format!("error: {}", e),
                review: String::new(),
            })
        }
    }
}

// ============================================================================
// Cache Management
// ============================================================================

fn handle_cache(action: CacheAction) -> Result<()> {
    let path = default_data_dir().join("corpus.jsonl");

    match action {
        CacheAction::Path => {
            println!("Corpus snapshot: {:?}", path);
        }
        CacheAction::Clear => {
            if path.exists() {
                std::fs::remove_file(&path).context("Failed to delete snapshot")?;
                println!("Corpus snapshot cleared.");
            } else {
                println!("No corpus snapshot at {:?}", path);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords() {
        assert_eq!(
            parse_keywords("generative ai, review ,"),
            vec!["generative ai".to_string(), "review".to_string()]
        );
        assert!(parse_keywords("").is_empty());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("or"), SearchMode::Or);
        assert_eq!(parse_mode("and"), SearchMode::And);
    }
}
