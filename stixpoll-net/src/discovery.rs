//! TAXII 1.1 service discovery
//!
//! Walks discovery service -> collection management service -> the named
//! collection's polling service and returns the poll endpoint address.

use stixpoll_core::Element;
use tracing::{debug, info};

use crate::messages::{self, XML_BINDING};
use crate::{TaxiiClient, TaxiiError};

/// An advertised service instance
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEntry {
    pub address: Option<String>,
    pub message_bindings: Vec<String>,
}

impl ServiceEntry {
    fn from_element(el: &Element) -> Self {
        Self {
            address: el.child("Address").and_then(|a| a.non_empty_text()),
            message_bindings: el
                .elements()
                .filter(|c| c.is("Message_Binding"))
                .map(|c| c.text())
                .collect(),
        }
    }

    fn speaks_xml_binding(&self) -> bool {
        self.message_bindings.iter().any(|b| b == XML_BINDING)
    }
}

/// Prefer an entry advertising our message binding, otherwise the first
/// entry that has an address at all
pub fn select_address(entries: &[ServiceEntry]) -> Option<String> {
    entries
        .iter()
        .find(|e| e.address.is_some() && e.speaks_xml_binding())
        .or_else(|| entries.iter().find(|e| e.address.is_some()))
        .and_then(|e| e.address.clone())
}

/// Collection management services listed in a Discovery Response
pub fn collection_management_services(response: &Element) -> Vec<ServiceEntry> {
    response
        .find_all("Service_Instance")
        .into_iter()
        .filter(|s| s.attr("service_type") == Some("COLLECTION_MANAGEMENT"))
        .map(ServiceEntry::from_element)
        .collect()
}

/// Polling services of the named collection in a Collection Information
/// Response; `None` when the collection is not listed
pub fn polling_services(response: &Element, collection: &str) -> Option<Vec<ServiceEntry>> {
    let collections: Vec<&Element> = response
        .find_all("Collection")
        .into_iter()
        .filter(|c| c.attr("collection_name") == Some(collection))
        .collect();

    if collections.is_empty() {
        return None;
    }

    Some(
        collections
            .into_iter()
            .flat_map(|c| c.elements().filter(|s| s.is("Polling_Service")))
            .map(ServiceEntry::from_element)
            .collect(),
    )
}

/// Resolve the poll endpoint for `collection` starting at a discovery service
pub async fn discover_poll_endpoint(
    client: &TaxiiClient,
    discovery_url: &str,
    collection: &str,
) -> Result<String, TaxiiError> {
    debug!("Discovering services at {}", discovery_url);
    let response = client
        .exchange(discovery_url, messages::discovery_request())
        .await?;

    let management = select_address(&collection_management_services(&response))
        .ok_or(TaxiiError::ServiceNotFound)?;
    debug!("Collection management service: {}", management);

    let response = client
        .exchange(&management, messages::collection_information_request())
        .await?;

    let services = polling_services(&response, collection)
        .ok_or_else(|| TaxiiError::CollectionNotFound(collection.to_string()))?;
    let endpoint = select_address(&services)
        .ok_or_else(|| TaxiiError::PollServiceNotFound(collection.to_string()))?;

    info!("Poll service for {}: {}", collection, endpoint);
    Ok(endpoint)
}
