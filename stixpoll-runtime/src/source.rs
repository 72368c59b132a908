//! Poll sources
//!
//! The scheduler only needs to open one poll per window; [`PollSource`] is
//! that capability. [`TaxiiSource`] implements it over a TAXII 1.1 server.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::info;

use stixpoll_core::Indicator;
use stixpoll_net::{discover_poll_endpoint, PollSession, TaxiiClient, TaxiiError, TimeWindow};

use crate::config::{Endpoint, SourceConfig};
use crate::RuntimeError;

/// The indicators of one window
#[async_trait]
pub trait WindowPoll: Send {
    /// Next indicator, `None` once the window is exhausted
    async fn next(&mut self) -> Result<Option<Indicator>, TaxiiError>;

    /// Newest content timestamp seen in the window so far
    fn max_content_timestamp(&self) -> Option<i64>;
}

#[async_trait]
impl WindowPoll for PollSession {
    async fn next(&mut self) -> Result<Option<Indicator>, TaxiiError> {
        PollSession::next(self).await
    }

    fn max_content_timestamp(&self) -> Option<i64> {
        PollSession::max_content_timestamp(self)
    }
}

/// Something that can be polled window by window
#[async_trait]
pub trait PollSource: Send + Sync {
    type Poll: WindowPoll;

    /// Source name for logs
    fn name(&self) -> &str;

    async fn open(&self, window: TimeWindow) -> Result<Self::Poll, TaxiiError>;
}

/// A configured TAXII 1.1 collection
///
/// The poll endpoint is resolved on first use and reused for every window
/// polled through this value.
pub struct TaxiiSource {
    config: SourceConfig,
    client: TaxiiClient,
    endpoint: Endpoint,
    resolved: OnceCell<String>,
}

impl TaxiiSource {
    pub fn new(config: SourceConfig) -> Result<Self, RuntimeError> {
        let endpoint = config.endpoint()?;
        let client = TaxiiClient::new(&config.client_config())?;
        Ok(Self {
            config,
            client,
            endpoint,
            resolved: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// The poll service address, discovering it if needed
    pub async fn poll_endpoint(&self) -> Result<&str, TaxiiError> {
        let endpoint = self
            .resolved
            .get_or_try_init(|| async {
                match &self.endpoint {
                    Endpoint::Static(url) => Ok(url.clone()),
                    Endpoint::Discovery(url) => {
                        info!("{}: discovering poll service via {}", self.config.name, url);
                        discover_poll_endpoint(&self.client, url, &self.config.collection).await
                    }
                }
            })
            .await?;
        Ok(endpoint.as_str())
    }
}

#[async_trait]
impl PollSource for TaxiiSource {
    type Poll = PollSession;

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn open(&self, window: TimeWindow) -> Result<PollSession, TaxiiError> {
        let endpoint = self.poll_endpoint().await?;
        Ok(PollSession::new(
            self.client.clone(),
            self.config.poll_target(endpoint),
            window,
            self.config.decode_options(),
        ))
    }
}
