//! Normalized indicators produced by the STIX decoders
//!
//! Every decoder, whatever the source format, ends up producing the same
//! flat record: a value, a kind and a bag of attributes. The pair
//! `(value, kind)` is the identity of an indicator inside one decode call.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of indicators understood by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndicatorKind {
    /// IPv4 address
    #[serde(rename = "IPv4")]
    Ipv4,
    /// IPv6 address
    #[serde(rename = "IPv6")]
    Ipv6,
    /// Fully qualified domain name
    #[serde(rename = "domain")]
    Domain,
    /// URL
    #[serde(rename = "URL")]
    Url,
    /// Email address
    #[serde(rename = "email-addr")]
    Email,
    /// MD5 hash
    #[serde(rename = "md5")]
    Md5,
    /// SHA1 hash
    #[serde(rename = "sha1")]
    Sha1,
    /// SHA256 hash
    #[serde(rename = "sha256")]
    Sha256,
    /// ssdeep fuzzy hash
    #[serde(rename = "ssdeep")]
    Ssdeep,
    /// STIX 2 pattern
    #[serde(rename = "stix2-pattern")]
    Pattern,
}

impl IndicatorKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Ipv4 => "IPv4",
            IndicatorKind::Ipv6 => "IPv6",
            IndicatorKind::Domain => "domain",
            IndicatorKind::Url => "URL",
            IndicatorKind::Email => "email-addr",
            IndicatorKind::Md5 => "md5",
            IndicatorKind::Sha1 => "sha1",
            IndicatorKind::Sha256 => "sha256",
            IndicatorKind::Ssdeep => "ssdeep",
            IndicatorKind::Pattern => "stix2-pattern",
        }
    }

    /// Map a STIX 1 hash type name (case-insensitive) to a hash kind
    pub fn from_hash_type(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(IndicatorKind::Md5),
            "sha1" => Some(IndicatorKind::Sha1),
            "sha256" => Some(IndicatorKind::Sha256),
            "ssdeep" => Some(IndicatorKind::Ssdeep),
            _ => None,
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of an indicator attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        AttributeValue::List(value)
    }
}

/// Attribute bag attached to an indicator
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A normalized indicator
///
/// Decoders emit these as fragments; the normalizer merges shared
/// attributes into them and resolves duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    /// The indicator value (address, domain, hash, pattern...)
    #[serde(rename = "indicator")]
    pub value: String,
    /// Kind of indicator
    #[serde(rename = "type")]
    pub kind: IndicatorKind,
    /// Attributes collected from the object and its containers
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl Indicator {
    pub fn new(kind: IndicatorKind, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Dedup key of the indicator
    pub fn key(&self) -> (String, IndicatorKind) {
        (self.value.clone(), self.kind)
    }

    /// Merge attributes into this indicator, overwriting existing names
    pub fn merge(&mut self, attributes: &Attributes) {
        for (name, value) in attributes {
            self.attributes.insert(name.clone(), value.clone());
        }
    }

    /// Look up a text attribute
    pub fn text_attribute(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(AttributeValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Rename every `stix_`-prefixed attribute to `<prefix>_<rest>`
    pub fn apply_prefix(&mut self, prefix: &str) {
        let renamed = std::mem::take(&mut self.attributes)
            .into_iter()
            .map(|(name, value)| match name.strip_prefix("stix_") {
                Some(rest) => (format!("{}_{}", prefix, rest), value),
                None => (name, value),
            })
            .collect();
        self.attributes = renamed;
    }
}

/// Ordered, deduplicated collection of indicators
///
/// Later inserts for an existing `(value, kind)` replace the stored
/// indicator but keep its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    entries: IndexMap<(String, IndicatorKind), Indicator>,
}

impl IndicatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an indicator; empty values are dropped
    pub fn insert(&mut self, indicator: Indicator) -> bool {
        if indicator.value.is_empty() {
            return false;
        }
        self.entries.insert(indicator.key(), indicator);
        true
    }

    pub fn extend<I: IntoIterator<Item = Indicator>>(&mut self, indicators: I) {
        for indicator in indicators {
            self.insert(indicator);
        }
    }

    pub fn get(&self, value: &str, kind: IndicatorKind) -> Option<&Indicator> {
        self.entries.get(&(value.to_string(), kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Indicator> {
        self.entries.values()
    }

    pub fn into_vec(self) -> Vec<Indicator> {
        self.entries.into_values().collect()
    }
}

impl IntoIterator for IndicatorSet {
    type Item = Indicator;
    type IntoIter = indexmap::map::IntoValues<(String, IndicatorKind), Indicator>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

/// Replace every non-ASCII character with `?`
pub fn ascii_replace(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}
