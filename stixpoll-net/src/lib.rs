//! stixpoll TAXII layer
//!
//! Provides the TAXII 1.1 side of the poller:
//! - HTTP client with timeout, TLS, proxy and credential settings
//! - Request construction for discovery, collection information, poll and
//!   poll fulfillment messages
//! - Service discovery down to a collection's poll endpoint
//! - Streaming poll sessions yielding normalized indicators

pub mod client;
pub mod discovery;
pub mod error;
pub mod messages;
pub mod poll;

pub use client::*;
pub use discovery::discover_poll_endpoint;
pub use error::*;
pub use messages::{PollCursor, TimeWindow};
pub use poll::*;
