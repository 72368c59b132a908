//! Errors from TAXII exchanges

use thiserror::Error;

/// Errors from TAXII networking and protocol handling
#[derive(Debug, Error)]
pub enum TaxiiError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Response stream failed: {0}")]
    Stream(String),

    #[error("TAXII server returned {status}: {message}")]
    Protocol { status: String, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("No usable collection management service found")]
    ServiceNotFound,

    #[error("Collection {0:?} not found")]
    CollectionNotFound(String),

    #[error("No usable polling service for collection {0:?}")]
    PollServiceNotFound(String),
}

/// Coarse classification used by schedulers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Protocol,
    MalformedResponse,
    Discovery,
}

impl TaxiiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaxiiError::ClientBuild(_) | TaxiiError::InvalidUrl(_) => ErrorKind::Configuration,
            TaxiiError::Request(_) | TaxiiError::HttpStatus { .. } | TaxiiError::Stream(_) => {
                ErrorKind::Transport
            }
            TaxiiError::Protocol { .. } => ErrorKind::Protocol,
            TaxiiError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            TaxiiError::ServiceNotFound
            | TaxiiError::CollectionNotFound(_)
            | TaxiiError::PollServiceNotFound(_) => ErrorKind::Discovery,
        }
    }

    /// Whether trying again on the next scheduled run can help
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Protocol)
    }
}

impl From<quick_xml::Error> for TaxiiError {
    fn from(e: quick_xml::Error) -> Self {
        match e {
            quick_xml::Error::Io(io) => TaxiiError::Stream(io.to_string()),
            other => TaxiiError::MalformedResponse(other.to_string()),
        }
    }
}

impl From<stixpoll_core::XmlError> for TaxiiError {
    fn from(e: stixpoll_core::XmlError) -> Self {
        TaxiiError::MalformedResponse(e.0)
    }
}
