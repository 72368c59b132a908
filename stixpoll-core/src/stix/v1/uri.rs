//! `URIObjectType` decoder

use crate::indicator::{ascii_replace, Indicator, IndicatorKind};
use crate::xml::Element;

pub fn decode(props: &Element) -> Vec<Indicator> {
    let kind = match props.attr("type").unwrap_or("URL") {
        "URL" => IndicatorKind::Url,
        "Domain Name" => IndicatorKind::Domain,
        _ => return vec![],
    };

    match props.find("Value").and_then(Element::non_empty_text) {
        Some(value) => vec![Indicator::new(kind, ascii_replace(&value))],
        None => vec![],
    }
}
