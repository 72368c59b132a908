//! `DomainNameObjectType` decoder

use crate::indicator::{ascii_replace, Indicator, IndicatorKind};
use crate::xml::Element;

/// Only fully qualified domain names are indicators; other domain name
/// sub-kinds (TLDs) are skipped.
pub fn decode(props: &Element) -> Vec<Indicator> {
    let dtype = props.attr("type").unwrap_or("FQDN");
    if dtype != "FQDN" {
        return vec![];
    }

    match props.find("Value").and_then(Element::non_empty_text) {
        Some(domain) => vec![Indicator::new(IndicatorKind::Domain, ascii_replace(&domain))],
        None => vec![],
    }
}
