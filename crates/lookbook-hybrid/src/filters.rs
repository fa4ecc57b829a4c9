//! Strict attribute filters carried by a plan.

use std::collections::BTreeMap;

use regex::Regex;

use lookbook_core::types::ProductMetadata;
use lookbook_core::{Error, Result};

/// Compiled whole-word, case-insensitive matchers, one per filter value.
///
/// A product passes when every value occurs in its description or in one of
/// its category values. Word boundaries keep "red" from matching "zippered".
#[derive(Debug, Clone)]
pub struct AttributeFilter {
    patterns: Vec<(String, Regex)>,
}

impl AttributeFilter {
    pub fn compile(filters: &BTreeMap<String, String>) -> Result<Self> {
        let mut patterns = Vec::with_capacity(filters.len());
        for (key, value) in filters {
            let value = value.trim();
            if value.is_empty() { continue; }
            let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(value)))
                .map_err(|e| Error::InvalidQuery(format!("bad {key} filter {value:?}: {e}")))?;
            patterns.push((key.clone(), re));
        }
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool { self.patterns.is_empty() }

    pub fn matches(&self, product: &ProductMetadata) -> bool {
        self.patterns.iter().all(|(_, re)| {
            re.is_match(&product.description) || product.categories.values().any(|v| re.is_match(v))
        })
    }
}
