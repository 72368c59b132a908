//! TAXII 1.1 message construction
//!
//! Request bodies are small and fixed in shape, so they are written out as
//! text. Every request gets a fresh random message id.

use quick_xml::escape::escape;
use stixpoll_core::timestamp::{self, Precision};
use stixpoll_core::Element;
use uuid::Uuid;

use crate::TaxiiError;

/// TAXII 1.1 XML message binding
pub const XML_BINDING: &str = "urn:taxii.mitre.org:message:xml:1.1";
/// TAXII 1.1 services version
pub const SERVICES: &str = "urn:taxii.mitre.org:services:1.1";
pub const HTTP_BINDING: &str = "urn:taxii.mitre.org:protocol:http:1.0";
pub const HTTPS_BINDING: &str = "urn:taxii.mitre.org:protocol:https:1.0";
/// Namespace of the TAXII 1.1 XML binding
pub const TAXII_NAMESPACE: &str = "http://taxii.mitre.org/messages/taxii_xml_binding-1.1";

/// A half-open polling interval `(begin, end]` in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    begin: i64,
    end: i64,
}

impl TimeWindow {
    /// `None` unless `begin < end`
    pub fn new(begin: i64, end: i64) -> Option<Self> {
        (begin < end).then_some(Self { begin, end })
    }

    /// Exclusive lower bound
    pub fn begin(&self) -> i64 {
        self.begin
    }

    /// Inclusive upper bound
    pub fn end(&self) -> i64 {
        self.end
    }
}

/// Position of the next result part in a multi-part poll result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollCursor {
    pub result_id: String,
    pub part_number: u32,
}

fn message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Protocol binding implied by the endpoint's URL scheme
pub fn protocol_binding(url: &str) -> &'static str {
    let is_https = url
        .get(..6)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https:"));
    if is_https {
        HTTPS_BINDING
    } else {
        HTTP_BINDING
    }
}

/// Headers identifying a TAXII 1.1 XML exchange over `url`
pub fn headers(url: &str) -> [(&'static str, &'static str); 5] {
    [
        ("Content-Type", "application/xml"),
        ("X-TAXII-Content-Type", XML_BINDING),
        ("X-TAXII-Accept", XML_BINDING),
        ("X-TAXII-Services", SERVICES),
        ("X-TAXII-Protocol", protocol_binding(url)),
    ]
}

pub fn discovery_request() -> String {
    format!(
        r#"<Discovery_Request xmlns="{}" message_id="{}"/>"#,
        TAXII_NAMESPACE,
        message_id()
    )
}

pub fn collection_information_request() -> String {
    format!(
        r#"<taxii_11:Collection_Information_Request xmlns:taxii_11="{}" message_id="{}"/>"#,
        TAXII_NAMESPACE,
        message_id()
    )
}

/// Poll for content in `window`; without a subscription the request asks
/// for full, synchronous results
pub fn poll_request(collection: &str, window: &TimeWindow, subscription_id: Option<&str>) -> String {
    let mut out = format!(
        r#"<taxii_11:Poll_Request xmlns:taxii_11="{}" message_id="{}" collection_name="{}""#,
        TAXII_NAMESPACE,
        message_id(),
        escape(collection)
    );
    if let Some(id) = subscription_id {
        out.push_str(&format!(r#" subscription_id="{}""#, escape(id)));
    }
    out.push('>');
    out.push_str(&format!(
        "<taxii_11:Exclusive_Begin_Timestamp>{}</taxii_11:Exclusive_Begin_Timestamp>",
        timestamp::format(window.begin(), Precision::Seconds)
    ));
    out.push_str(&format!(
        "<taxii_11:Inclusive_End_Timestamp>{}</taxii_11:Inclusive_End_Timestamp>",
        timestamp::format(window.end(), Precision::Seconds)
    ));
    if subscription_id.is_none() {
        out.push_str(
            r#"<taxii_11:Poll_Parameters allow_asynch="false"><taxii_11:Response_Type>FULL</taxii_11:Response_Type></taxii_11:Poll_Parameters>"#,
        );
    }
    out.push_str("</taxii_11:Poll_Request>");
    out
}

pub fn poll_fulfillment_request(collection: &str, cursor: &PollCursor) -> String {
    format!(
        r#"<taxii_11:Poll_Fulfillment xmlns:taxii_11="{}" message_id="{}" collection_name="{}" result_id="{}" result_part_number="{}"/>"#,
        TAXII_NAMESPACE,
        message_id(),
        escape(collection),
        escape(&cursor.result_id),
        cursor.part_number
    )
}

/// Turn a non-success Status Message into a protocol error
pub fn check_status(root: &Element) -> Result<(), TaxiiError> {
    if !root.is("Status_Message") {
        return Ok(());
    }
    let status = root.attr("status_type").unwrap_or_default();
    if status == "SUCCESS" {
        return Ok(());
    }
    Err(TaxiiError::Protocol {
        status: status.to_string(),
        message: root
            .child("Message")
            .map(|m| m.text())
            .unwrap_or_default(),
    })
}
