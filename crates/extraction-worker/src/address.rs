//! Receiver-address parsing
//!
//! Pure, never fails: a component that cannot be recognized is simply
//! absent. Line breaks are normalized away for the general parse, but
//! the fallback unit patterns run against the original string because
//! line-anchored cues are more reliable than a bare mid-string number.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Parsed mailing address, each component independently optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAddress {
    pub street: Option<String>,
    pub unit: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

fn state_zip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z]{2})\s+(\d{5})(-\d{4})?\b").unwrap())
}

fn secondary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:\b(?:unit|apt|apartment|suite|ste)\b|#)\s*[#.]?\s*([A-Za-z0-9]+)")
            .unwrap()
    })
}

fn secondary_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:unit|apt|apartment|suite|ste|#)\s*[#.]?\s*").unwrap())
}

fn street_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:street|avenue|boulevard|drive|road|lane|court|place|terrace|circle|parkway|highway|st|ave|blvd|dr|rd|ln|ct|pl|ter|cir|pkwy|hwy|way)\b\.?",
        )
        .unwrap()
    })
}

fn numeric_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\d+[a-z]?$").unwrap())
}

/// Fallback unit patterns, tried in priority order against the
/// original (non-normalized) address
fn unit_fallback_patterns() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            // Inline keyword anywhere in the text
            Regex::new(r"(?i)\b(?:unit|apt|apartment|suite|ste|#)\s*[#.]?\s*(\w+)").unwrap(),
            // Keyword anchored to the start of a line
            Regex::new(r"(?i)\n\s*(?:unit|apt|apartment|suite|ste|#)\s*[#.]?\s*(\w+)").unwrap(),
            // A bare number (optional trailing letter) on its own final line
            Regex::new(r"(?i)\n\s*(\d+[a-z]?)\s*$").unwrap(),
        ]
    })
}

/// Parse a free-text receiver address into its components.
///
/// The general parse runs over the line-break-normalized string; if it
/// finds no secondary designator, the fallback patterns scan the
/// original text.
pub fn parse_receiver_address(address: &str) -> ParsedAddress {
    let normalized = normalize(address);

    let mut parsed = parse_normalized(&normalized);

    // Fallback: regex extraction from the original address (preserves line breaks)
    if parsed.unit.is_none() {
        for pattern in unit_fallback_patterns() {
            if let Some(caps) = pattern.captures(address) {
                if let Some(m) = caps.get(1) {
                    let token = m.as_str().trim();
                    if !token.is_empty() {
                        parsed.unit = Some(token.to_string());
                        break;
                    }
                }
            }
        }
    }

    parsed
}

/// Replace runs of line breaks with single spaces
fn normalize(address: &str) -> String {
    let mut out = String::with_capacity(address.len());
    let mut last_was_break = false;
    for c in address.chars() {
        if c == '\r' || c == '\n' {
            if !last_was_break {
                out.push(' ');
            }
            last_was_break = true;
        } else {
            out.push(c);
            last_was_break = false;
        }
    }
    out.trim().to_string()
}

/// General single-line address parse: trailing state+zip, comma- or
/// designator-delimited city, remainder as street.
fn parse_normalized(normalized: &str) -> ParsedAddress {
    let mut parsed = ParsedAddress::default();

    // State and zip: take the last occurrence so trailing noise after
    // the zip does not hide it
    let mut head = normalized;
    if let Some(caps) = state_zip_re().captures_iter(normalized).last() {
        let full = caps.get(0).unwrap();
        parsed.state = Some(caps.get(1).unwrap().as_str().to_string());
        let mut zip = caps.get(2).unwrap().as_str().to_string();
        if let Some(plus4) = caps.get(3) {
            zip.push_str(plus4.as_str());
        }
        parsed.zip = Some(zip);
        head = normalized[..full.start()].trim_end();
    }
    let head = head.trim_end_matches(',').trim_end();

    // City: text after the last comma, if any
    let (rest, city) = match head.rfind(',') {
        Some(i) => (head[..i].trim_end(), non_empty(&head[i + 1..])),
        None => (head, None),
    };
    parsed.city = city;

    // A secondary designator splits street from an un-comma'd city;
    // otherwise the trailing street-suffix token marks the boundary.
    if let Some(caps) = secondary_re().captures(rest) {
        let full = caps.get(0).unwrap();
        parsed.unit = non_empty(&strip_secondary_keyword(full.as_str()));
        parsed.street = non_empty(&rest[..full.start()]);
        if parsed.city.is_none() {
            parsed.city = non_empty(&rest[full.end()..]).filter(|c| !is_numeric_token(c));
        }
    } else if parsed.city.is_none() {
        if let Some(m) = street_suffix_re().find_iter(rest).last() {
            parsed.street = non_empty(&rest[..m.end()]);
            parsed.city = non_empty(&rest[m.end()..]).filter(|c| !is_numeric_token(c));
        } else {
            parsed.street = non_empty(rest);
        }
    } else {
        parsed.street = non_empty(rest);
    }

    parsed
}

fn is_numeric_token(s: &str) -> bool {
    numeric_token_re().is_match(s)
}

/// Strip the leading unit-keyword token from a secondary designator,
/// e.g. "Apt 4B" -> "4B"
fn strip_secondary_keyword(secondary: &str) -> String {
    secondary_keyword_re()
        .replace(secondary.trim(), "")
        .trim()
        .to_string()
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim().trim_matches(',').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_address_with_unit_keyword() {
        let parsed = parse_receiver_address("123 Main St Apt 4B\nLos Angeles, CA 90012");
        assert_eq!(parsed.street.as_deref(), Some("123 Main St"));
        assert_eq!(parsed.unit.as_deref(), Some("4B"));
        assert_eq!(parsed.city.as_deref(), Some("Los Angeles"));
        assert_eq!(parsed.state.as_deref(), Some("CA"));
        assert_eq!(parsed.zip.as_deref(), Some("90012"));
    }

    #[test]
    fn test_bare_trailing_number_is_unit() {
        let parsed = parse_receiver_address("456 Oak Ave\nPasadena, CA 91101\n5");
        assert_eq!(parsed.unit.as_deref(), Some("5"));
        assert_eq!(parsed.street.as_deref(), Some("456 Oak Ave"));
        assert_eq!(parsed.zip.as_deref(), Some("91101"));
    }

    #[test]
    fn test_no_unit_stays_none() {
        let parsed = parse_receiver_address("456 Oak Ave\nPasadena, CA 91101");
        assert_eq!(parsed.unit, None);
        assert_eq!(parsed.street.as_deref(), Some("456 Oak Ave"));
        assert_eq!(parsed.city.as_deref(), Some("Pasadena"));
    }

    #[test]
    fn test_comma_separated_single_line() {
        let parsed = parse_receiver_address("1038 S Mariposa Ave, Los Angeles, CA 90006-2913");
        assert_eq!(parsed.street.as_deref(), Some("1038 S Mariposa Ave"));
        assert_eq!(parsed.city.as_deref(), Some("Los Angeles"));
        assert_eq!(parsed.zip.as_deref(), Some("90006-2913"));
    }

    #[test]
    fn test_hash_designator() {
        let parsed = parse_receiver_address("790 Foothill Blvd # 12\nLa Canada, CA 91011");
        assert_eq!(parsed.unit.as_deref(), Some("12"));
        assert_eq!(parsed.street.as_deref(), Some("790 Foothill Blvd"));
    }

    #[test]
    fn test_suite_keyword() {
        let parsed = parse_receiver_address("200 Wilshire Blvd Suite 300\nSanta Monica, CA 90401");
        assert_eq!(parsed.unit.as_deref(), Some("300"));
        assert_eq!(parsed.street.as_deref(), Some("200 Wilshire Blvd"));
    }

    #[test]
    fn test_unparseable_never_errors() {
        let parsed = parse_receiver_address("");
        assert_eq!(parsed, ParsedAddress::default());

        let parsed = parse_receiver_address("no address here");
        assert_eq!(parsed.street.as_deref(), Some("no address here"));
        assert_eq!(parsed.state, None);
        assert_eq!(parsed.zip, None);
    }

    #[test]
    fn test_line_anchored_unit_line() {
        let parsed = parse_receiver_address("123 Elm St\nUnit 7\nGlendale, CA 91204");
        assert_eq!(parsed.unit.as_deref(), Some("7"));
    }
}
