//! Issue matching
//!
//! Exact building+unit equality is treated as strong structural
//! evidence; description similarity (a chat-model ranking call) is
//! reserved for breaking genuine ties. With multiple candidates and no
//! description, the matcher deliberately refuses to guess.

use crate::extract::ExtractedFields;
use invoiceflow_common::ai::ChatModel;
use invoiceflow_common::db::models::Issue;
use invoiceflow_common::errors::Result;
use tracing::debug;
use uuid::Uuid;

/// Token budget for the ranking completion
const RANKING_MAX_TOKENS: u32 = 10;

/// A match candidate, the slice of an issue the matcher needs
#[derive(Debug, Clone)]
pub struct CandidateIssue {
    pub id: Uuid,
    pub building: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

impl From<&Issue> for CandidateIssue {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id,
            building: issue.building.clone(),
            unit: issue.unit.clone(),
            description: issue.description.clone(),
        }
    }
}

/// Find the best-matching issue for the extracted fields, or None.
/// Ranking-call transport failures propagate; an unusable ranking
/// response degrades to no match.
pub async fn match_issue(
    chat: &dyn ChatModel,
    fields: &ExtractedFields,
    candidates: &[CandidateIssue],
) -> Result<Option<Uuid>> {
    // Without both structural keys there is nothing to match on
    let (Some(building), Some(unit)) = (&fields.building, &fields.unit) else {
        return Ok(None);
    };

    let matches: Vec<&CandidateIssue> = candidates
        .iter()
        .filter(|issue| {
            eq_ignore_case(issue.building.as_deref(), building)
                && eq_ignore_case(issue.unit.as_deref(), unit)
        })
        .collect();

    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches[0].id)),
        _ => {
            let Some(description) = &fields.description else {
                // Multiple equally-plausible issues and no descriptive
                // evidence: do not guess
                debug!(candidates = matches.len(), "Ambiguous match without description");
                return Ok(None);
            };
            rank_by_description(chat, description, &matches).await
        }
    }
}

fn eq_ignore_case(candidate: Option<&str>, extracted: &str) -> bool {
    candidate.is_some_and(|c| c.to_lowercase() == extracted.to_lowercase())
}

/// Ask the chat model for the 1-based index of the best-matching
/// candidate description, in fetch order.
async fn rank_by_description(
    chat: &dyn ChatModel,
    description: &str,
    matches: &[&CandidateIssue],
) -> Result<Option<Uuid>> {
    let prompt = build_ranking_prompt(description, matches);
    let content = chat.complete(&prompt, RANKING_MAX_TOKENS).await?;

    Ok(parse_ranking_response(&content, matches.len())
        .map(|index| matches[index - 1].id))
}

/// Build the numbered-candidate ranking prompt
pub fn build_ranking_prompt(description: &str, matches: &[&CandidateIssue]) -> String {
    let numbered = matches
        .iter()
        .enumerate()
        .map(|(i, issue)| format!("{}. {}", i + 1, issue.description.as_deref().unwrap_or("")))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Given this invoice description: \"{}\"\n\n\
         Which of these issues is the best match? Respond with ONLY the issue ID number \
         (1, 2, 3, etc.) or \"none\" if no good match.\n\n{}",
        description, numbered
    )
}

/// Parse the ranking response as a 1-based in-range index. "none",
/// out-of-range, or non-integer responses all yield no match.
pub fn parse_ranking_response(content: &str, candidate_count: usize) -> Option<usize> {
    let index: usize = content.trim().trim_matches('"').parse().ok()?;
    if (1..=candidate_count).contains(&index) {
        Some(index)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoiceflow_common::ai::MockChat;

    fn candidate(building: &str, unit: &str, description: &str) -> CandidateIssue {
        CandidateIssue {
            id: Uuid::new_v4(),
            building: Some(building.to_string()),
            unit: Some(unit.to_string()),
            description: Some(description.to_string()),
        }
    }

    fn fields(building: &str, unit: &str, description: Option<&str>) -> ExtractedFields {
        ExtractedFields {
            building: Some(building.to_string()),
            unit: Some(unit.to_string()),
            description: description.map(String::from),
            amount: None,
        }
    }

    #[tokio::test]
    async fn test_missing_structural_keys_skip_matching() {
        let chat = MockChat::with_responses(vec!["1"]);
        let candidates = vec![candidate("1038 S Mariposa Ave", "501", "Leak")];

        let incomplete = ExtractedFields {
            building: Some("1038 S Mariposa Ave".to_string()),
            ..Default::default()
        };
        let result = match_issue(&chat, &incomplete, &candidates).await.unwrap();
        assert_eq!(result, None);
        // The ranking model was never consulted
        assert!(chat.seen_prompts().await.is_empty());
    }

    #[tokio::test]
    async fn test_single_structural_match() {
        let chat = MockChat::with_responses(vec!["should not be called"]);
        let target = candidate("1038 S Mariposa Ave", "501", "Leak under sink");
        let candidates = vec![
            target.clone(),
            candidate("1038 S Mariposa Ave", "502", "Broken window"),
            candidate("22 Elm St", "501", "Leak under sink"),
        ];

        let result = match_issue(
            &chat,
            &fields("1038 s mariposa ave", "501", None),
            &candidates,
        )
        .await
        .unwrap();

        assert_eq!(result, Some(target.id));
        assert!(chat.seen_prompts().await.is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_match_ranked_by_description() {
        let chat = MockChat::with_responses(vec!["2"]);
        let first = candidate("1038 S Mariposa Ave", "501", "Broken window latch");
        let second = candidate("1038 S Mariposa Ave", "501", "Kitchen faucet leaking");
        let candidates = vec![first.clone(), second.clone()];

        let result = match_issue(
            &chat,
            &fields("1038 S Mariposa Ave", "501", Some("Faucet replacement; labor")),
            &candidates,
        )
        .await
        .unwrap();

        assert_eq!(result, Some(second.id));

        let prompts = chat.seen_prompts().await;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("1. Broken window latch"));
        assert!(prompts[0].contains("2. Kitchen faucet leaking"));
    }

    #[tokio::test]
    async fn test_out_of_range_ranking_is_no_match() {
        let chat = MockChat::with_responses(vec!["5"]);
        let candidates = vec![
            candidate("1038 S Mariposa Ave", "501", "a"),
            candidate("1038 S Mariposa Ave", "501", "b"),
        ];

        let result = match_issue(
            &chat,
            &fields("1038 S Mariposa Ave", "501", Some("desc")),
            &candidates,
        )
        .await
        .unwrap();

        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_none_response_is_no_match() {
        let chat = MockChat::with_responses(vec!["none"]);
        let candidates = vec![
            candidate("1038 S Mariposa Ave", "501", "a"),
            candidate("1038 S Mariposa Ave", "501", "b"),
        ];

        let result = match_issue(
            &chat,
            &fields("1038 S Mariposa Ave", "501", Some("desc")),
            &candidates,
        )
        .await
        .unwrap();

        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_ambiguous_without_description_refuses_to_guess() {
        let chat = MockChat::with_responses(vec!["1"]);
        let candidates = vec![
            candidate("1038 S Mariposa Ave", "501", "a"),
            candidate("1038 S Mariposa Ave", "501", "b"),
        ];

        let result = match_issue(
            &chat,
            &fields("1038 S Mariposa Ave", "501", None),
            &candidates,
        )
        .await
        .unwrap();

        assert_eq!(result, None);
        assert!(chat.seen_prompts().await.is_empty());
    }

    #[test]
    fn test_parse_ranking_response() {
        assert_eq!(parse_ranking_response("2", 3), Some(2));
        assert_eq!(parse_ranking_response(" 1 ", 3), Some(1));
        assert_eq!(parse_ranking_response("\"3\"", 3), Some(3));
        assert_eq!(parse_ranking_response("0", 3), None);
        assert_eq!(parse_ranking_response("4", 3), None);
        assert_eq!(parse_ranking_response("none", 3), None);
        assert_eq!(parse_ranking_response("the second one", 3), None);
    }
}
