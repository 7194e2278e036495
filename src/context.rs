//! Grounding context assembly.
//!
//! Builds two parallel blocks over the final candidate list in rank order:
//! the reference block (extracted full text where available, abstract
//! otherwise) that grounds generation, and the enumerated citation block the
//! prompt cites by index. A candidate is never dropped: full-text loss
//! degrades its entry to the title+abstract form.

use crate::download::{AcquisitionResult, AcquisitionStatus};
use crate::extract;
use crate::ranking::ScoredCandidate;
use std::collections::HashMap;
use tracing::{debug, warn};

/// The two context blocks consumed by review generation.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    /// Full-text/abstract grounding blob, rank order
    pub reference_block: String,
    /// `[rank] Title: …. Abstract: ….` entries, rank order
    pub citation_block: String,
}

/// Title+abstract entry form shared by both blocks.
fn abstract_entry(title: &str, abstract_text: &str) -> String {
    format!("Title: {}. Abstract: {}.\n", title, abstract_text)
}

/// Assemble the reference and citation blocks.
///
/// `acquisitions` holds one record per candidate, keyed by paper id; missing
/// or non-`Downloaded` records fall back to the abstract form.
pub fn assemble(ranked: &[ScoredCandidate], acquisitions: &[AcquisitionResult]) -> AssembledContext {
    let by_paper: HashMap<&str, &AcquisitionStatus> = acquisitions
        .iter()
        .map(|a| (a.paper_id.as_str(), &a.status))
        .collect();

    let mut context = AssembledContext::default();

    for (rank, scored) in ranked.iter().enumerate() {
        let candidate = &scored.candidate;
        let fallback = abstract_entry(&candidate.title, &candidate.abstract_text);

        match by_paper.get(candidate.paper_id.as_str()) {
            Some(AcquisitionStatus::Downloaded(path)) => {
                match extract::pdf_file_to_text(path) {
                    Ok(text) if !text.trim().is_empty() => {
                        debug!(paper_id = %candidate.paper_id, chars = text.len(), "Using full text");
                        context.reference_block.push_str(text.trim());
                        context.reference_block.push('\n');
                    }
                    Ok(_) => {
                        warn!(paper_id = %candidate.paper_id, "Extracted text empty, using abstract");
                        context.reference_block.push_str(&fallback);
                    }
                    Err(e) => {
                        warn!(paper_id = %candidate.paper_id, error = %e, "Extraction failed, using abstract");
                        context.reference_block.push_str(&fallback);
                    }
                }
            }
            _ => context.reference_block.push_str(&fallback),
        }

        // The citation block always uses the compact form, regardless of
        // acquisition status.
        context
            .citation_block
            .push_str(&format!("[{}] {}", rank, fallback));
    }

    context
}
