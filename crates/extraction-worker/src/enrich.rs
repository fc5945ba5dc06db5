//! Fallback enrichment of incomplete extractions
//!
//! Invoked only when the primary pass left required fields empty. The
//! chat model is handed the partial field set plus a bounded prefix of
//! the raw document text and asked for JSON. The response is parsed
//! defensively: anything unparseable leaves the prior fields untouched
//! and the pipeline continues.
//!
//! Merge policy is overwrite-on-presence: any key the model returns,
//! even blank, replaces the existing value. Keys absent from the
//! response leave the field alone.

use crate::extract::{parse_amount, ExtractedFields};
use invoiceflow_common::ai::ChatModel;
use invoiceflow_common::errors::Result;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

/// Token budget for the enrichment completion
const ENRICHMENT_MAX_TOKENS: u32 = 300;

/// True when at least one required field is still missing
pub fn needs_enrichment(fields: &ExtractedFields) -> bool {
    !fields.is_complete()
}

/// Build the enrichment prompt from the partial fields and a bounded
/// prefix of the document text
pub fn build_enrichment_prompt(
    fields: &ExtractedFields,
    document_text: &str,
    text_limit: usize,
) -> String {
    let current = serde_json::to_string(fields).unwrap_or_else(|_| "{}".to_string());
    let truncated: String = document_text.chars().take(text_limit).collect();

    format!(
        "Extract missing invoice fields from this text. Current data: {}\n\n\
         Text:\n{}\n\n\
         Return JSON with: building, unit, description, amount (fill in any null/missing fields)",
        current, truncated
    )
}

/// Parse the model's content into a JSON object, tolerating Markdown
/// code fences. Returns None for anything that is not a JSON object.
pub fn parse_enrichment_response(content: &str) -> Option<serde_json::Map<String, Value>> {
    let stripped = strip_code_fences(content);
    match serde_json::from_str::<Value>(stripped) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence line ("```json" or bare "```") and the closing fence
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .trim_end()
        .trim_end_matches("```")
        .trim()
}

/// Shallow-merge the model object over the existing fields,
/// overwrite-on-presence.
pub fn apply_enrichment(fields: &mut ExtractedFields, response: &serde_json::Map<String, Value>) {
    if let Some(value) = response.get("building") {
        fields.building = value_to_text(value);
    }
    if let Some(value) = response.get("unit") {
        fields.unit = value_to_text(value);
    }
    if let Some(value) = response.get("description") {
        fields.description = value_to_text(value);
    }
    if let Some(value) = response.get("amount") {
        fields.amount = value_to_amount(value);
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_to_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Run the enrichment call and merge the result. Returns whether the
/// model response parsed; transport failures propagate to the caller.
pub async fn enrich_fields(
    chat: &dyn ChatModel,
    fields: &mut ExtractedFields,
    document_text: &str,
    text_limit: usize,
) -> Result<bool> {
    let prompt = build_enrichment_prompt(fields, document_text, text_limit);
    let content = chat.complete(&prompt, ENRICHMENT_MAX_TOKENS).await?;

    match parse_enrichment_response(&content) {
        Some(response) => {
            apply_enrichment(fields, &response);
            Ok(true)
        }
        None => {
            warn!("Failed to parse enrichment response, keeping partial fields");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoiceflow_common::ai::MockChat;

    fn partial_fields() -> ExtractedFields {
        ExtractedFields {
            building: Some("1038 S Mariposa Ave".to_string()),
            unit: None,
            description: None,
            amount: None,
        }
    }

    #[test]
    fn test_trigger_condition() {
        assert!(needs_enrichment(&partial_fields()));

        let complete = ExtractedFields {
            building: Some("b".into()),
            unit: Some("u".into()),
            description: Some("d".into()),
            amount: Some(Decimal::from_str("1").unwrap()),
        };
        assert!(!needs_enrichment(&complete));
    }

    #[test]
    fn test_prompt_bounds_document_text() {
        let text = "x".repeat(5000);
        let prompt = build_enrichment_prompt(&partial_fields(), &text, 3000);
        assert!(prompt.contains(&"x".repeat(3000)));
        assert!(!prompt.contains(&"x".repeat(3001)));
        assert!(prompt.contains("1038 S Mariposa Ave"));
    }

    #[test]
    fn test_parse_plain_json() {
        let response = parse_enrichment_response(r#"{"unit": "501"}"#).unwrap();
        assert_eq!(response["unit"], "501");
    }

    #[test]
    fn test_parse_fenced_json() {
        let content = "```json\n{\"unit\": \"501\"}\n```";
        let response = parse_enrichment_response(content).unwrap();
        assert_eq!(response["unit"], "501");
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_enrichment_response("Sorry, I cannot help.").is_none());
        assert!(parse_enrichment_response("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_merge_overwrites_on_presence() {
        let mut fields = partial_fields();
        let response = parse_enrichment_response(
            r#"{"building": "", "unit": "501", "amount": 450.5}"#,
        )
        .unwrap();

        apply_enrichment(&mut fields, &response);

        // A returned blank replaces the known value: faithful to the
        // observed shallow-merge behavior
        assert_eq!(fields.building.as_deref(), Some(""));
        assert_eq!(fields.unit.as_deref(), Some("501"));
        assert_eq!(fields.amount, Some(Decimal::from_str("450.5").unwrap()));
        // Absent key leaves the field alone
        assert_eq!(fields.description, None);
    }

    #[test]
    fn test_merge_null_clears_field() {
        let mut fields = partial_fields();
        let response = parse_enrichment_response(r#"{"building": null}"#).unwrap();
        apply_enrichment(&mut fields, &response);
        assert_eq!(fields.building, None);
    }

    #[tokio::test]
    async fn test_enrich_parse_failure_keeps_fields() {
        let chat = MockChat::with_responses(vec!["not json at all"]);
        let mut fields = partial_fields();
        let before = fields.clone();

        let parsed = enrich_fields(&chat, &mut fields, "doc text", 3000)
            .await
            .unwrap();

        assert!(!parsed);
        assert_eq!(fields, before);
    }

    #[tokio::test]
    async fn test_enrich_fills_missing() {
        let chat = MockChat::with_responses(vec![
            r#"{"unit": "501", "description": "Leak repair", "amount": "450.00"}"#,
        ]);
        let mut fields = partial_fields();

        let parsed = enrich_fields(&chat, &mut fields, "doc text", 3000)
            .await
            .unwrap();

        assert!(parsed);
        assert_eq!(fields.unit.as_deref(), Some("501"));
        assert_eq!(fields.description.as_deref(), Some("Leak repair"));
        assert_eq!(fields.amount, Some(Decimal::from_str("450.00").unwrap()));
    }
}
