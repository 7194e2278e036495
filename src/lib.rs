//! # rustscholar
//!
//! Literature-Grounded Review Generation Pipeline - Rust Microservice
//!
//! ## Modules
//!
//! - [`semanticscholar`] - Semantic Scholar bulk search client
//! - [`corpus`] - Line-delimited corpus snapshot cache
//! - [`ranking`] - Two-stage recall/rerank over scoring services
//! - [`download`] - Open-access PDF acquisition with bounded retries
//! - [`extract`] - PDF bytes to plain text
//! - [`context`] - Reference and citation block assembly
//! - [`generate`] - Review generation via a chat endpoint
//! - [`pipeline`] - Stage sequencing and configuration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustscholar::generate::GeneratorConfig;
//! use rustscholar::pipeline::{Pipeline, PipelineConfig, ReviewRequest};
//! use rustscholar::semanticscholar::SearchMode;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig {
//!         year_low: 2020,
//!         s2_api_key: None,
//!         embed_url: "http://localhost:38014".to_string(),
//!         rerank_url: "http://localhost:38013".to_string(),
//!         generator: GeneratorConfig::default(),
//!         cache_path: "corpus.jsonl".into(),
//!         download_dir: "downloads".into(),
//!         max_retries: 3,
//!         base_delay: Duration::from_secs(2),
//!     };
//!     let pipeline = Pipeline::new(config)?;
//!     let request = ReviewRequest {
//!         keywords: vec!["generative ai".to_string()],
//!         mode: SearchMode::And,
//!         target_abstract: "We propose a method.".to_string(),
//!         innovation_summary: String::new(),
//!     };
//!     let review = pipeline.run(&request).await?;
//!     println!("{}", review);
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod corpus;
pub mod download;
pub mod error;
pub mod extract;
pub mod generate;
pub mod pipeline;
pub mod prompts;
pub mod ranking;
pub mod semanticscholar;

pub use error::{Result, ScholarError};
