//! STIX 2 pattern decoder
//!
//! Only a single equality comparison is understood:
//! `[object-type:property.path = 'literal']`. Anything else (other
//! comparators, `AND`/`OR`, qualifiers) is left to downstream tooling.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use crate::indicator::{Indicator, IndicatorKind};

static SIMPLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[\s*([a-zA-Z_][a-zA-Z0-9_-]*):([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*=\s*'([^']*)'\s*\]$",
    )
    .unwrap()
});

/// Decode a pattern into zero or one pattern indicator
pub fn decode(pattern: &str) -> Vec<Indicator> {
    let pattern = pattern.trim();

    let Some(caps) = SIMPLE_PATTERN.captures(pattern) else {
        warn!("Unhandled STIX 2 pattern: {:?}", pattern);
        return vec![];
    };

    let literal = &caps[3];
    if literal.is_empty() {
        return vec![];
    }

    vec![Indicator::new(IndicatorKind::Pattern, pattern)
        .with_attribute("stix2_object_type", &caps[1])
        .with_attribute("stix2_property", &caps[2])
        .with_attribute("stix2_value", literal)]
}
