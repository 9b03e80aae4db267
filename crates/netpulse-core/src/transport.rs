// Network transports
//
// Decision: The prober and sampler only see these traits, so timing and rate
// logic can be exercised against in-memory fakes.
// Decision: Download bodies are exposed as a stream of chunk sizes; the engine
// never needs the bytes themselves. Dropping the stream releases the connection.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use std::time::Duration;
use tracing::trace;
use url::Url;

use crate::config::TransportConfig;
use crate::error::{MonitorError, Result};

/// Query parameter used to defeat intermediate caches
pub const CACHE_BUSTER_PARAM: &str = "t";

/// Stream of received chunk sizes in bytes
pub type ChunkStream = BoxStream<'static, Result<usize>>;

/// An opened streaming download
pub struct Download {
    /// Length declared by the server, if any
    pub content_length: Option<u64>,
    /// Body chunks as they arrive
    pub chunks: ChunkStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Single round-trip request used for latency probes
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Resolve once the response head arrives; the body is never read
    async fn round_trip(&self, url: &Url) -> Result<()>;
}

/// Source of streaming downloads used for throughput samples
#[async_trait]
pub trait DownloadSource: Send + Sync {
    /// Open a download and return its chunk stream
    async fn open(&self, url: &Url) -> Result<Download>;
}

/// Append `t=<unix millis>` to a target, keeping its existing query
pub fn cache_busted(target: &Url, unix_millis: i64) -> Url {
    let mut url = target.clone();
    url.query_pairs_mut()
        .append_pair(CACHE_BUSTER_PARAM, &unix_millis.to_string());
    url
}

/// reqwest-backed transport for both probes and downloads
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    probe_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            probe_timeout: config.probe_timeout,
        })
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn round_trip(&self, url: &Url) -> Result<()> {
        let response = self
            .client
            .get(url.clone())
            .header(CACHE_CONTROL, "no-store")
            .timeout(self.probe_timeout)
            .send()
            .await?;

        // Any response completes the round trip, whatever its status
        trace!(status = response.status().as_u16(), "Probe response received");
        Ok(())
    }
}

#[async_trait]
impl DownloadSource for HttpTransport {
    async fn open(&self, url: &Url) -> Result<Download> {
        let response = self
            .client
            .get(url.clone())
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::HttpStatus(status.as_u16()));
        }

        let content_length = response.content_length();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.len()).map_err(MonitorError::from))
            .boxed();

        Ok(Download {
            content_length,
            chunks,
        })
    }
}
