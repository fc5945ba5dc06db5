//! Primary field extraction from document-service entities
//!
//! A pure transformation: the entity list in, a normalized field set
//! out. Entity-type aliases are resolved through a single closed
//! mapping table rather than per-call-site string comparisons.

use crate::address::ParsedAddress;
use invoiceflow_common::ai::DocEntity;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

/// Normalized field set produced mid-pipeline. Never persisted
/// directly; merged into the invoice record at the end.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedFields {
    pub building: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
}

impl ExtractedFields {
    /// True when every required field was recovered
    pub fn is_complete(&self) -> bool {
        self.building.is_some()
            && self.unit.is_some()
            && self.description.is_some()
            && self.amount.is_some()
    }
}

/// Canonical extraction targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Building,
    Unit,
    Amount,
    ReceiverAddress,
}

/// Closed alias table: entity type -> canonical field
const FIELD_ALIASES: &[(&str, Field)] = &[
    ("building", Field::Building),
    ("property", Field::Building),
    ("property_name", Field::Building),
    ("unit", Field::Unit),
    ("unit_number", Field::Unit),
    ("total_amount", Field::Amount),
    ("amount", Field::Amount),
    ("invoice_total", Field::Amount),
    ("receiver_address", Field::ReceiverAddress),
];

fn canonical_field(entity_type: &str) -> Option<Field> {
    FIELD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == entity_type)
        .map(|(_, field)| *field)
}

/// Result of the primary extraction pass
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub fields: ExtractedFields,
    /// Raw receiver-address text, handed to the address parser
    pub receiver_address: Option<String>,
}

/// Map the document-service entity list into the normalized field set.
/// First match per category wins; a non-numeric amount stays absent.
pub fn extract_fields(entities: &[DocEntity]) -> Extraction {
    let mut extraction = Extraction::default();
    let fields = &mut extraction.fields;

    for entity in entities {
        let value = entity.mention_text.as_str();
        match canonical_field(&entity.entity_type) {
            Some(Field::Building) => {
                if fields.building.is_none() && !value.is_empty() {
                    fields.building = Some(value.to_string());
                }
            }
            Some(Field::Unit) => {
                if fields.unit.is_none() && !value.is_empty() {
                    fields.unit = Some(value.to_string());
                }
            }
            Some(Field::Amount) => {
                if fields.amount.is_none() {
                    fields.amount = parse_amount(value);
                }
            }
            Some(Field::ReceiverAddress) => {
                if extraction.receiver_address.is_none() && !value.is_empty() {
                    extraction.receiver_address = Some(value.to_string());
                }
            }
            None => {}
        }
    }

    // Aggregate line-item descriptions in document order
    let descriptions: Vec<&str> = entities
        .iter()
        .filter(|e| e.entity_type == "line_item")
        .filter_map(line_item_description)
        .filter(|d| !d.is_empty())
        .collect();

    if !descriptions.is_empty() {
        extraction.fields.description = Some(descriptions.join("; "));
    }

    extraction
}

/// The description sub-property of a line item, first of the two known
/// property spellings
fn line_item_description(line_item: &DocEntity) -> Option<&str> {
    line_item
        .property_text("line_item/description")
        .or_else(|| line_item.property_text("description"))
        .map(str::trim)
}

/// Strip currency symbols and thousands separators, then parse as a
/// decimal. A non-numeric result is absent, not an error.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|c| *c != '$' && *c != ',').collect();
    Decimal::from_str(cleaned.trim()).ok()
}

/// Fill building/unit from the parsed receiver address, but only where
/// the entity-derived values left gaps.
pub fn apply_receiver_address(fields: &mut ExtractedFields, parsed: &ParsedAddress) {
    if fields.building.is_none() {
        fields.building = parsed.street.clone();
    }
    if fields.unit.is_none() {
        fields.unit = parsed.unit.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn entity(entity_type: &str, text: &str) -> DocEntity {
        DocEntity::new(entity_type, text)
    }

    fn line_item(description: &str) -> DocEntity {
        DocEntity::new("line_item", "").with_properties(vec![DocEntity::new(
            "line_item/description",
            description,
        )])
    }

    #[test]
    fn test_building_aliases() {
        for alias in ["building", "property", "property_name"] {
            let extraction = extract_fields(&[entity(alias, "1038 S Mariposa Ave")]);
            assert_eq!(
                extraction.fields.building.as_deref(),
                Some("1038 S Mariposa Ave"),
                "alias {}",
                alias
            );
        }
    }

    #[test]
    fn test_no_building_alias_stays_none() {
        let extraction = extract_fields(&[
            entity("supplier_name", "Ace Plumbing"),
            entity("invoice_date", "2024-03-01"),
        ]);
        assert_eq!(extraction.fields.building, None);
        assert_eq!(extraction.receiver_address, None);
    }

    #[test]
    fn test_first_match_wins() {
        let extraction = extract_fields(&[
            entity("building", "First Building"),
            entity("property", "Second Building"),
        ]);
        assert_eq!(extraction.fields.building.as_deref(), Some("First Building"));
    }

    #[test]
    fn test_amount_with_currency_symbols() {
        let extraction = extract_fields(&[entity("total_amount", "$1,234.56")]);
        assert_eq!(
            extraction.fields.amount,
            Some(Decimal::from_str("1234.56").unwrap())
        );
    }

    #[test]
    fn test_non_numeric_amount_stays_none() {
        let extraction = extract_fields(&[entity("total_amount", "TBD")]);
        assert_eq!(extraction.fields.amount, None);
    }

    #[test]
    fn test_line_item_aggregation_drops_empty() {
        let extraction = extract_fields(&[
            line_item("Leak repair"),
            line_item(""),
            line_item("Faucet replacement"),
        ]);
        assert_eq!(
            extraction.fields.description.as_deref(),
            Some("Leak repair; Faucet replacement")
        );
    }

    #[test]
    fn test_line_item_fallback_property_spelling() {
        let li = DocEntity::new("line_item", "")
            .with_properties(vec![DocEntity::new("description", "Window latch")]);
        let extraction = extract_fields(&[li]);
        assert_eq!(extraction.fields.description.as_deref(), Some("Window latch"));
    }

    #[test]
    fn test_receiver_address_captured_separately() {
        let extraction = extract_fields(&[entity("receiver_address", "123 Main St\nApt 4")]);
        assert_eq!(
            extraction.receiver_address.as_deref(),
            Some("123 Main St\nApt 4")
        );
        // Never written into building/unit directly
        assert_eq!(extraction.fields.building, None);
        assert_eq!(extraction.fields.unit, None);
    }

    #[test]
    fn test_address_fills_only_gaps() {
        let mut fields = ExtractedFields {
            building: Some("Entity Building".to_string()),
            ..Default::default()
        };
        let parsed = ParsedAddress {
            street: Some("123 Main St".to_string()),
            unit: Some("4B".to_string()),
            ..Default::default()
        };

        apply_receiver_address(&mut fields, &parsed);

        assert_eq!(fields.building.as_deref(), Some("Entity Building"));
        assert_eq!(fields.unit.as_deref(), Some("4B"));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let entities = vec![
            entity("building", "1038 S Mariposa Ave"),
            entity("unit", "501"),
            entity("total_amount", "$450.00"),
            line_item("Leak repair"),
        ];

        let first = extract_fields(&entities);
        let second = extract_fields(&entities);
        assert_eq!(first.fields, second.fields);
        assert!(first.fields.is_complete());
    }
}
