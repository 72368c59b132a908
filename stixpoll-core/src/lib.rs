//! stixpoll core - indicator model and STIX normalization
//!
//! This crate provides the decode side of the pipeline:
//! - The normalized [`Indicator`] record and its dedup set
//! - Timestamp parsing/formatting to epoch milliseconds
//! - A small XML element tree shared with the streaming poll parser
//! - STIX 1.x object decoders and package normalizer
//! - STIX 2 bundle and pattern decoding

pub mod indicator;
pub mod stix;
pub mod timestamp;
pub mod xml;

pub use indicator::*;
pub use stix::{normalize, normalize_element, DecodeError, DecodeOptions, Decoded};
pub use timestamp::{Precision, TimestampError};
pub use xml::{Element, TreeBuilder, XmlError};

/// Default textual confidence levels
pub const DEFAULT_CONFIDENCE_LEVELS: &[(&str, i64)] = &[("low", 40), ("medium", 60), ("high", 80)];
