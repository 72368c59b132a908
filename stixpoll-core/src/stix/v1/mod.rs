//! STIX 1.x package decoding
//!
//! A package is walked indicator by indicator, then for any observables
//! living outside indicators. Each observable's object (and its related
//! objects) is routed to a decoder by `xsi:type`; shared attributes from
//! the package, the indicator and the observable are merged into every
//! indicator produced.

pub mod address;
pub mod domain;
pub mod file;
pub mod uri;

use std::collections::HashSet;
use tracing::{debug, error, warn};

use crate::indicator::{Attributes, Indicator, IndicatorSet};
use crate::stix::{DecodeError, DecodeOptions, Decoded};
use crate::timestamp;
use crate::xml::Element;

/// Object types with a decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectType {
    DomainName,
    File,
    Uri,
    Address,
    Unknown(String),
}

impl ObjectType {
    /// Resolve an `xsi:type` value, ignoring its namespace prefix
    pub fn from_xsi_type(xsi_type: &str) -> Self {
        let name = xsi_type.rsplit(':').next().unwrap_or(xsi_type);
        match name {
            "DomainNameObjectType" => ObjectType::DomainName,
            "FileObjectType" | "WindowsFileObjectType" => ObjectType::File,
            "URIObjectType" => ObjectType::Uri,
            "AddressObjectType" => ObjectType::Address,
            other => ObjectType::Unknown(other.to_string()),
        }
    }
}

/// Decode one `Properties` element
///
/// Unknown object types are not an error: they are logged and produce
/// nothing.
pub fn decode_properties(props: &Element, options: &DecodeOptions) -> Result<Vec<Indicator>, DecodeError> {
    let xsi_type = props.xsi_type().ok_or(DecodeError::MissingObjectType)?;

    let result = match ObjectType::from_xsi_type(xsi_type) {
        ObjectType::DomainName => domain::decode(props),
        ObjectType::File => file::decode(props),
        ObjectType::Uri => uri::decode(props),
        ObjectType::Address => address::decode(props, options),
        ObjectType::Unknown(name) => {
            error!("Unhandled cybox Object type: {:?}", name);
            vec![]
        }
    };

    Ok(result)
}

fn decode_object(props: &Element, options: &DecodeOptions) -> Vec<Indicator> {
    match decode_properties(props, options) {
        Ok(result) => result,
        Err(e) => {
            warn!("Skipping object: {}", e);
            vec![]
        }
    }
}

/// TLP color of the first TLP marking structure under `handling`
fn tlp_color(handling: &Element) -> Option<String> {
    handling
        .find_all("Marking_Structure")
        .into_iter()
        .find(|m| {
            m.xsi_type()
                .is_some_and(|t| t.to_ascii_lowercase().contains("tlpmarkingstructuretype"))
        })
        .and_then(|m| m.attr("color"))
        .map(|color| color.to_lowercase())
}

fn package_attributes(package: &Element) -> Attributes {
    let mut result = Attributes::new();

    let Some(header) = package.child("STIX_Header") else {
        return result;
    };

    if let Some(title) = header.child("Title").and_then(Element::non_empty_text) {
        result.insert("stix_package_title".to_string(), title.into());
    }
    if let Some(description) = header.child("Description").and_then(Element::non_empty_text) {
        result.insert("stix_package_description".to_string(), description.into());
    }
    if let Some(tlp) = header.child("Handling").and_then(tlp_color) {
        result.insert("share_level".to_string(), tlp.into());
    }

    result
}

fn indicator_attributes(indicator: &Element, shared: &Attributes, options: &DecodeOptions) -> Attributes {
    let mut result = shared.clone();

    if let Some(tlp) = indicator.child("Handling").and_then(tlp_color) {
        result.insert("share_level".to_string(), tlp.into());
    }

    if let Some(confidence_map) = &options.confidence_map {
        let level = indicator
            .child("Confidence")
            .and_then(|c| c.find("Value"))
            .map(|v| v.text().to_lowercase());
        if let Some(score) = level.and_then(|l| confidence_map.get(&l)) {
            result.insert("confidence".to_string(), (*score).into());
        }
    }

    result
}

fn observable_attributes(observable: &Element) -> Attributes {
    let mut result = Attributes::new();

    if let Some(title) = observable.child("Title").and_then(Element::non_empty_text) {
        result.insert("stix_title".to_string(), title.into());
    }
    if let Some(description) = observable.child("Description").and_then(Element::non_empty_text) {
        result.insert("stix_description".to_string(), description.into());
    }

    result
}

/// Decode one observable: its object and the object's related objects
pub fn decode_observable(observable: &Element, shared: &Attributes, options: &DecodeOptions) -> Vec<Indicator> {
    let Some(object) = observable.child("Object") else {
        return vec![];
    };

    let mut result = Vec::new();

    if let Some(props) = object.child("Properties") {
        result.extend(decode_object(props, options));
    }

    if let Some(related) = object.child("Related_Objects") {
        for related_object in related.elements().filter(|e| e.is("Related_Object")) {
            if let Some(props) = related_object.child("Properties") {
                result.extend(decode_object(props, options));
            }
        }
    }

    let generic = observable_attributes(observable);
    for indicator in &mut result {
        indicator.merge(&generic);
        indicator.merge(shared);
    }

    result
}

/// Observables with an id are decoded once per package
fn first_visit<'a>(observable: &'a Element, seen: &mut HashSet<&'a str>) -> bool {
    match observable.attr("id") {
        Some(id) if !id.is_empty() => seen.insert(id),
        _ => true,
    }
}

/// Decode a `STIX_Package` root element
pub fn decode(package: &Element, options: &DecodeOptions) -> Result<Decoded, DecodeError> {
    if !package.is("STIX_Package") {
        return Err(DecodeError::NotAPackage(package.name.clone()));
    }

    let timestamp = package.attr("timestamp").and_then(|ts| match timestamp::parse(ts) {
        Ok(millis) => Some(millis),
        Err(e) => {
            warn!("Ignoring package timestamp: {}", e);
            None
        }
    });

    let package_attrs = package_attributes(package);
    let mut seen = HashSet::new();
    let mut indicators = IndicatorSet::new();

    for indicator in package.find_all("Indicator") {
        let attrs = indicator_attributes(indicator, &package_attrs, options);
        for observable in indicator.find_all("Observable") {
            if first_visit(observable, &mut seen) {
                indicators.extend(decode_observable(observable, &attrs, options));
            }
        }
    }

    for observable in package.find_all_outside("Observable", "Indicator") {
        if first_visit(observable, &mut seen) {
            indicators.extend(decode_observable(observable, &package_attrs, options));
        }
    }

    debug!("Decoded {} indicators from STIX package", indicators.len());

    Ok(Decoded {
        timestamp,
        indicators,
    })
}
