//! `AddressObjectType` decoder

use std::net::IpAddr;
use tracing::error;

use crate::indicator::{ascii_replace, Indicator, IndicatorKind};
use crate::stix::DecodeOptions;
use crate::xml::Element;

/// Decode an address object
///
/// Without a category, or with IP version auto-detection enabled, the kind
/// is inferred by parsing the literal and anything that is not an IP
/// address is dropped.
pub fn decode(props: &Element, options: &DecodeOptions) -> Vec<Indicator> {
    let Some(value) = props.find("Address_Value").and_then(Element::non_empty_text) else {
        return vec![];
    };
    let value = ascii_replace(&value);

    let kind = match props.attr("category") {
        None => match ip_kind(&value) {
            Some(kind) => kind,
            None => return vec![],
        },
        Some(_) if options.ip_version_auto_detect => match ip_kind(&value) {
            Some(kind) => kind,
            None => return vec![],
        },
        Some("ipv4-addr") => IndicatorKind::Ipv4,
        Some("ipv6-addr") => IndicatorKind::Ipv6,
        Some("e-mail") => IndicatorKind::Email,
        Some(other) => {
            error!("Unknown AddressObjectType category: {:?}", other);
            return vec![];
        }
    };

    vec![Indicator::new(kind, value)]
}

fn ip_kind(value: &str) -> Option<IndicatorKind> {
    match value.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => Some(IndicatorKind::Ipv4),
        Ok(IpAddr::V6(_)) => Some(IndicatorKind::Ipv6),
        Err(_) => None,
    }
}
