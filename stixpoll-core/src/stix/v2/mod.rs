//! STIX 2 bundle decoding
//!
//! Indicators are taken from `indicator` objects; `identity` objects only
//! serve to resolve `created_by_ref`.

pub mod pattern;

use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::indicator::{Indicator, IndicatorSet};
use crate::stix::{DecodeError, DecodeOptions, Decoded};
use crate::timestamp;

/// Well-known TLP marking definitions
const TLP_MARKING_DEFINITIONS: &[(&str, &str)] = &[
    ("marking-definition--613f2e26-407d-48c7-9eca-b8e91df99dc9", "white"),
    ("marking-definition--34098fce-860f-48ae-8e50-ebd3cc5e41da", "green"),
    ("marking-definition--f88d31f6-486f-44da-b317-01333bde0b82", "amber"),
    ("marking-definition--5e57c739-391a-4eb3-b6be-7d15ca92d5ed", "red"),
];

fn tlp_from_markings(markings: &Value) -> Option<&'static str> {
    markings.as_array()?.iter().filter_map(Value::as_str).find_map(|m| {
        TLP_MARKING_DEFINITIONS
            .iter()
            .find(|(id, _)| *id == m)
            .map(|(_, color)| *color)
    })
}

fn object_timestamp(object: &Value, field: &str) -> Option<i64> {
    let text = object.get(field)?.as_str()?;
    match timestamp::parse(text) {
        Ok(millis) => Some(millis),
        Err(e) => {
            warn!("Ignoring {} on STIX 2 object: {}", field, e);
            None
        }
    }
}

fn decode_indicator(object: &Value, identities: &HashMap<&str, String>) -> (Vec<Indicator>, Option<i64>) {
    let Some(pattern) = object.get("pattern").and_then(Value::as_str) else {
        debug!("STIX 2 indicator without pattern");
        return (vec![], None);
    };

    let mut result = pattern::decode(pattern);
    let mut latest = None;

    for indicator in &mut result {
        if let Some(id) = object.get("id").and_then(Value::as_str) {
            indicator.attributes.insert("stix2_id".to_string(), id.into());
        }
        if let Some(name) = object.get("name").and_then(Value::as_str) {
            indicator.attributes.insert("stix2_name".to_string(), name.into());
        }
        if let Some(labels) = object.get("labels").and_then(Value::as_array) {
            let labels: Vec<String> = labels
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            indicator.attributes.insert("stix2_labels".to_string(), labels.into());
        }

        for (field, attribute) in [
            ("created", "first_seen"),
            ("valid_from", "stix2_valid_from"),
            ("modified", "stix2_modified"),
        ] {
            if let Some(millis) = object_timestamp(object, field) {
                indicator.attributes.insert(attribute.to_string(), millis.into());
                latest = latest.max(Some(millis));
            }
        }

        if let Some(tlp) = object.get("object_marking_refs").and_then(tlp_from_markings) {
            indicator.attributes.insert("share_level".to_string(), tlp.into());
        }

        if let Some(creator) = object.get("created_by_ref").and_then(Value::as_str) {
            match identities.get(creator) {
                Some(identity) => {
                    indicator
                        .attributes
                        .insert("stix2_created_by".to_string(), identity.clone().into());
                }
                None => debug!("Unknown identity {}", creator),
            }
        }
    }

    (result, latest)
}

/// Decode a STIX 2 JSON bundle
///
/// The returned timestamp is the newest created/valid_from/modified value
/// of the decoded indicators.
pub fn decode(content: &str, _options: &DecodeOptions) -> Result<Decoded, DecodeError> {
    let bundle: Value = serde_json::from_str(content)?;

    if bundle.get("type").and_then(Value::as_str) != Some("bundle") {
        return Err(DecodeError::NotABundle);
    }

    let empty = Vec::new();
    let objects = bundle
        .get("objects")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let identities: HashMap<&str, String> = objects
        .iter()
        .filter(|o| o.get("type").and_then(Value::as_str) == Some("identity"))
        .filter_map(|o| {
            let id = o.get("id")?.as_str()?;
            let class = o.get("identity_class").and_then(Value::as_str).unwrap_or("unknown");
            let name = o.get("name").and_then(Value::as_str).unwrap_or("unknown");
            Some((id, format!("{}:{}", class, name)))
        })
        .collect();

    let mut indicators = IndicatorSet::new();
    let mut latest = None;

    for object in objects {
        if object.get("type").and_then(Value::as_str) != Some("indicator") {
            continue;
        }
        let (result, ts) = decode_indicator(object, &identities);
        indicators.extend(result);
        latest = latest.max(ts);
    }

    debug!("Decoded {} indicators from STIX 2 bundle", indicators.len());

    Ok(Decoded {
        timestamp: latest,
        indicators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::{AttributeValue, IndicatorKind};
    use pretty_assertions::assert_eq;

    const BUNDLE: &str = r#"{
        "type": "bundle",
        "id": "bundle--1",
        "objects": [
            {
                "type": "indicator",
                "id": "indicator--a",
                "name": "bad domain",
                "labels": ["malicious-activity"],
                "created": "2017-11-06T12:12:19.000Z",
                "modified": "2017-11-07T12:12:19.000Z",
                "valid_from": "2017-11-06T12:12:19.000Z",
                "created_by_ref": "identity--x",
                "object_marking_refs": ["marking-definition--f88d31f6-486f-44da-b317-01333bde0b82"],
                "pattern": "[domain-name:value = 'evil.example']"
            },
            {
                "type": "indicator",
                "id": "indicator--b",
                "pattern": "[ipv4-addr:value = '1.2.3.4'] AND [ipv4-addr:value = '5.6.7.8']"
            },
            {
                "type": "identity",
                "id": "identity--x",
                "identity_class": "organization",
                "name": "ACME CERT"
            },
            {
                "type": "malware",
                "id": "malware--1"
            }
        ]
    }"#;

    #[test]
    fn test_decode_bundle() {
        let decoded = decode(BUNDLE, &DecodeOptions::default()).unwrap();
        assert_eq!(decoded.indicators.len(), 1);
        assert_eq!(decoded.timestamp, Some(1510056739000));

        let indicator = decoded
            .indicators
            .get("[domain-name:value = 'evil.example']", IndicatorKind::Pattern)
            .unwrap();
        assert_eq!(indicator.text_attribute("stix2_id"), Some("indicator--a"));
        assert_eq!(indicator.text_attribute("share_level"), Some("amber"));
        assert_eq!(indicator.text_attribute("stix2_created_by"), Some("organization:ACME CERT"));
        assert_eq!(
            indicator.attributes.get("first_seen"),
            Some(&AttributeValue::Integer(1509970339000))
        );
        assert_eq!(
            indicator.attributes.get("stix2_labels"),
            Some(&AttributeValue::List(vec!["malicious-activity".to_string()]))
        );
    }

    #[test]
    fn test_not_a_bundle() {
        assert!(matches!(
            decode(r#"{"type": "indicator"}"#, &DecodeOptions::default()),
            Err(DecodeError::NotABundle)
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            decode("{not json", &DecodeOptions::default()),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_empty_bundle_has_no_timestamp() {
        let decoded = decode(r#"{"type": "bundle"}"#, &DecodeOptions::default()).unwrap();
        assert!(decoded.timestamp.is_none());
        assert!(decoded.indicators.is_empty());
    }
}
