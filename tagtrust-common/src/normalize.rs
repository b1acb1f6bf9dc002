//! Entity-name normalization and tag input validation

use serde_json::Value;

use crate::{Error, Result};

/// Longest accepted entity name, in characters
pub const MAX_ENTITY_NAME_CHARS: usize = 200;

/// Most structured attributes a tag may carry
pub const MAX_ATTRS: usize = 16;

/// Minimum Jaro-Winkler similarity for a directory suggestion
pub const SUGGESTION_THRESHOLD: f64 = 0.88;

/// Trim and collapse internal whitespace, keeping the submitter's casing
pub fn display_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Key used for duplicate detection and directory lookup.
///
/// "  Jane   DOE. " and "jane doe" normalize to the same key.
pub fn normalize_entity_name(raw: &str) -> String {
    let collapsed = display_name(raw).to_lowercase();
    collapsed
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

/// Validate a submitted entity name, returning (display, normalized)
pub fn validate_entity_name(raw: &str) -> Result<(String, String)> {
    let display = display_name(raw);
    if display.is_empty() {
        return Err(Error::Validation("entityName must not be empty".to_string()));
    }
    if display.chars().count() > MAX_ENTITY_NAME_CHARS {
        return Err(Error::Validation(format!(
            "entityName exceeds {} characters",
            MAX_ENTITY_NAME_CHARS
        )));
    }
    let normalized = normalize_entity_name(&display);
    if normalized.is_empty() {
        return Err(Error::Validation(
            "entityName must contain more than punctuation".to_string(),
        ));
    }
    Ok((display, normalized))
}

/// Validate a content identifier
pub fn validate_content_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("contentId must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Validate structured attributes: a flat JSON object of scalars.
///
/// `null` and `{}` both mean "no attributes".
pub fn validate_attrs(attrs: Option<Value>) -> Result<Option<Value>> {
    let map = match attrs {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(Error::Validation("attrs must be a JSON object".to_string())),
    };
    if map.is_empty() {
        return Ok(None);
    }
    if map.len() > MAX_ATTRS {
        return Err(Error::Validation(format!("attrs has more than {} keys", MAX_ATTRS)));
    }
    for (key, value) in &map {
        if key.trim().is_empty() {
            return Err(Error::Validation("attrs keys must not be empty".to_string()));
        }
        if matches!(value, Value::Object(_) | Value::Array(_)) {
            return Err(Error::Validation(format!(
                "attrs value for '{}' must be a string, number or boolean",
                key
            )));
        }
    }
    Ok(Some(Value::Object(map)))
}

/// Similarity between two normalized names
pub fn name_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b)
}
