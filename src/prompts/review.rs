//! Review generation prompt for literature-grounded reviewing.
//!
//! Contains the single-turn template filled with the assembled reference
//! material, the target abstract, and the novel-contribution summary.

/// Template for the review request.
/// Placeholders: {references}, {citation_index}, {target_abstract}, {innovation_summary}
pub const REVIEW_PROMPT_TEMPLATE: &str = r#"You are an expert academic reviewer tasked with providing a thorough and balanced evaluation of research papers.

Related works (grounding material):
{references}

Reference index (cite entries by their bracketed number):
{citation_index}

Abstract of the paper under review:
{target_abstract}

Summary of the paper's novel contribution relative to prior work:
{innovation_summary}

Write a literature-grounded review of the paper. Position the work against the related works above, citing them by index where relevant, assess the claimed contribution, and state strengths and weaknesses supported by the grounding material. Do not fabricate references."#;

/// Fill the review template.
pub fn build_review_prompt(
    references: &str,
    citation_index: &str,
    target_abstract: &str,
    innovation_summary: &str,
) -> String {
    REVIEW_PROMPT_TEMPLATE
        .replace("{references}", references)
        .replace("{citation_index}", citation_index)
        .replace("{target_abstract}", target_abstract)
        .replace("{innovation_summary}", innovation_summary)
}
