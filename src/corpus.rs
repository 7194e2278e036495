//! Corpus snapshot cache.
//!
//! Persists the candidate set for a query as line-delimited JSON records and
//! restores it on later runs. Cache identity is the file's existence, not
//! query equality: once written, the snapshot is authoritative until manually
//! deleted. No expiry, no partial-update merge, no schema versioning.

use crate::error::Result;
use crate::semanticscholar::Candidate;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, info};

/// Load the cached candidate set, or fetch and snapshot it.
///
/// If `path` exists the file is parsed line-by-line and returned verbatim;
/// `fetch_fn` is never invoked. Otherwise `fetch_fn` runs once and its result
/// is written as the snapshot before being returned.
pub async fn load_or_fetch<F, Fut>(path: &Path, fetch_fn: F) -> Result<Vec<Candidate>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Candidate>>>,
{
    if path.exists() {
        return load(path);
    }

    debug!(path = ?path, "No corpus snapshot, fetching");
    let candidates = fetch_fn().await?;
    save(path, &candidates)?;
    Ok(candidates)
}

/// Parse the snapshot file, one JSON record per line.
///
/// A malformed line is a fatal error: the snapshot is authoritative and
/// silently skipping records would change the candidate set.
pub fn load(path: &Path) -> Result<Vec<Candidate>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut candidates = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        candidates.push(serde_json::from_str(&line)?);
    }

    info!(count = candidates.len(), path = ?path, "Loaded corpus snapshot");
    Ok(candidates)
}

/// Write the candidate set as a new snapshot in a single pass.
///
/// Uses create-new semantics so two pipeline invocations sharing the cache
/// path cannot interleave a partial write; the loser errors instead.
fn save(path: &Path, candidates: &[Candidate]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    for candidate in candidates {
        let record = serde_json::to_string(candidate)?;
        writeln!(file, "{}", record)?;
    }

    info!(count = candidates.len(), path = ?path, "Wrote corpus snapshot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScholarError;
    use std::cell::Cell;
    use tempfile::tempdir;

    fn candidate(id: &str) -> Candidate {
        Candidate {
            paper_id: id.to_string(),
            year: Some(2022),
            title: format!("Paper {}", id),
            authors: vec!["A. Author".to_string()],
            venue: "Venue".to_string(),
            citation_count: 3,
            abstract_text: "An abstract.".to_string(),
            is_open_access: false,
            pdf_url: None,
        }
    }

    #[tokio::test]
    async fn test_second_call_skips_fetch() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("corpus.jsonl");
        let calls = Cell::new(0u32);

        let first = load_or_fetch(&path, || {
            calls.set(calls.get() + 1);
            async { Ok(vec![candidate("a"), candidate("b")]) }
        })
        .await
        .expect("First load failed");

        let second = load_or_fetch(&path, || {
            calls.set(calls.get() + 1);
            async { Ok(Vec::new()) }
        })
        .await
        .expect("Second load failed");

        assert_eq!(calls.get(), 1);
        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_without_snapshot() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("corpus.jsonl");

        let result = load_or_fetch(&path, || async {
            Err(ScholarError::Config("no service".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_malformed_line_is_fatal() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(&path, "{not json}\n").expect("Failed to write fixture");

        assert!(load(&path).is_err());
    }

    #[test]
    fn test_save_refuses_existing_snapshot() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(&path, "").expect("Failed to write fixture");

        assert!(save(&path, &[candidate("a")]).is_err());
    }
}
