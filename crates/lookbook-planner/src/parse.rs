//! Strict validation of free-form planner output.
//!
//! The reasoning provider is untrusted: its reply may be fenced, wrapped in
//! prose, or simply wrong. Everything that leaves this module is a plan whose
//! fields are inside their documented ranges.

use std::collections::BTreeMap;

use serde::Deserialize;

use lookbook_core::config::SearchConfig;
use lookbook_core::types::QueryPlan;
use lookbook_core::{Error, Result};

pub const FILTER_KEYS: [&str; 2] = ["color", "category"];

/// Plan fields as the provider wrote them, before any clamping.
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    refined_queries: Vec<String>,
    use_image: Option<bool>,
    text_weight: Option<f64>,
    top_k: Option<f64>,
    #[serde(default)]
    filters: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Slice of `text` holding the first balanced `{ ... }` object, ignoring
/// braces inside JSON strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::PlanningUnavailable(msg.into())
}

/// Parse and validate a provider reply into a [`QueryPlan`].
///
/// Out-of-range numbers are clamped; a reply with no usable refined query
/// or no JSON object at all is rejected.
pub fn parse_plan(reply: &str, has_image: bool, config: &SearchConfig) -> Result<QueryPlan> {
    let json = extract_json_object(reply).ok_or_else(|| malformed("planner reply contains no JSON object"))?;
    let raw: RawPlan = serde_json::from_str(json).map_err(|e| malformed(format!("planner reply failed schema validation: {e}")))?;
    validate(raw, has_image, config)
}

fn validate(raw: RawPlan, has_image: bool, config: &SearchConfig) -> Result<QueryPlan> {
    let mut refined_queries: Vec<String> = Vec::new();
    for q in raw.refined_queries {
        let q = q.trim();
        if q.is_empty() || refined_queries.iter().any(|seen| seen.eq_ignore_ascii_case(q)) {
            continue;
        }
        refined_queries.push(q.to_string());
        if refined_queries.len() == config.max_refined_queries {
            break;
        }
    }
    if refined_queries.is_empty() {
        return Err(malformed("planner produced no refined queries"));
    }

    let use_image = raw.use_image.unwrap_or(has_image) && has_image;
    let text_weight = match raw.text_weight {
        Some(w) if w.is_finite() => w.clamp(0.0, 1.0) as f32,
        _ => config.default_text_weight,
    };
    // models sometimes write integers as 20.0
    let top_k = match raw.top_k {
        Some(k) if k.is_finite() => k.round().clamp(1.0, config.max_top_k as f64) as usize,
        _ => config.default_top_k,
    };

    Ok(QueryPlan {
        refined_queries,
        use_image,
        text_weight,
        top_k,
        filters: raw.filters.and_then(sanitize_filters),
        reasoning: raw.reasoning.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
    })
}

/// Keep only known keys with non-empty string values, lower-cased.
fn sanitize_filters(raw: BTreeMap<String, serde_json::Value>) -> Option<BTreeMap<String, String>> {
    let kept: BTreeMap<String, String> = raw
        .into_iter()
        .filter_map(|(k, v)| {
            let key = k.trim().to_lowercase();
            if !FILTER_KEYS.contains(&key.as_str()) {
                return None;
            }
            let value = v.as_str()?.trim().to_lowercase();
            (!value.is_empty()).then_some((key, value))
        })
        .collect();
    (!kept.is_empty()).then_some(kept)
}
