//! STIX content normalization
//!
//! Entry point for turning one content block payload into indicators:
//! - STIX 1.x XML packages ([`v1`])
//! - STIX 2 JSON bundles ([`v2`])
//!
//! An unusable envelope is never an error for the caller: it is logged and
//! the block yields no timestamp and no indicators.

pub mod v1;
pub mod v2;

use std::collections::HashMap;
use thiserror::Error;
use tracing::error;

use crate::indicator::IndicatorSet;
use crate::xml::{Element, XmlError};

/// Decoder behaviour switches
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Infer IPv4/IPv6 from the address literal even when a category is set
    pub ip_version_auto_detect: bool,
    /// Textual confidence level (lower-case) to numeric score
    pub confidence_map: Option<HashMap<String, i64>>,
    /// Replacement for the `stix` attribute name prefix
    pub attribute_prefix: Option<String>,
}

/// Errors from decoding a content payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Content is not a STIX package (root element {0:?})")]
    NotAPackage(String),

    #[error("Content is not a STIX 2 bundle")]
    NotABundle,

    #[error("Invalid XML content: {0}")]
    Xml(#[from] XmlError),

    #[error("Invalid JSON content: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Object properties without xsi:type")]
    MissingObjectType,
}

/// Result of decoding one payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    /// Package timestamp (STIX 1) or newest indicator timestamp (STIX 2)
    pub timestamp: Option<i64>,
    pub indicators: IndicatorSet,
}

impl Decoded {
    fn finish(mut self, options: &DecodeOptions) -> Self {
        if let Some(prefix) = &options.attribute_prefix {
            let mut renamed = IndicatorSet::new();
            for mut indicator in self.indicators {
                indicator.apply_prefix(prefix);
                renamed.insert(indicator);
            }
            self.indicators = renamed;
        }
        self
    }
}

/// Normalize a payload given as text, picking the format from its shape
pub fn normalize(content: &str, options: &DecodeOptions) -> Decoded {
    let result = if content.trim_start().starts_with('{') {
        v2::decode(content, options)
    } else {
        Element::parse(content)
            .map_err(DecodeError::from)
            .and_then(|root| v1::decode(&root, options))
    };

    match result {
        Ok(decoded) => decoded.finish(options),
        Err(e) => {
            error!("Dropping content: {}", e);
            Decoded::default()
        }
    }
}

/// Normalize an already parsed STIX 1 payload
pub fn normalize_element(root: &Element, options: &DecodeOptions) -> Decoded {
    match v1::decode(root, options) {
        Ok(decoded) => decoded.finish(options),
        Err(e) => {
            error!("Dropping content: {}", e);
            Decoded::default()
        }
    }
}
