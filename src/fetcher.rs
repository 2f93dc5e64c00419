//! HTTP fetcher for the routing-table snapshot.
//!
//! The snapshot is newline-delimited JSON, one `{"CIDR": .., "ASN": ..}`
//! object per line. The body is decoded chunk by chunk so memory stays
//! bounded by the largest line, not the size of the table.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::prefix::{NetworkBlock, PrefixRecord};
use crate::signal::ShutdownToken;
use crate::utils::format_count;

/// Longest line accepted from the feed; longer lines are skipped.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Failure of a single download attempt. Always retryable.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("request failed")]
    Request(#[source] reqwest::Error),

    #[error("received non-success status code: {0}")]
    Status(StatusCode),

    #[error("reading response body failed")]
    Body(#[source] reqwest::Error),
}

/// Terminal fetch failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch cancelled")]
    Cancelled,

    #[error("all {attempts} fetch attempts failed")]
    Exhausted {
        attempts: u32,
        #[source]
        source: AttemptError,
    },

    #[error("failed to create HTTP client")]
    Client(#[source] reqwest::Error),
}

/// Why a single line was skipped.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid JSON record")]
    Json(#[from] serde_json::Error),

    #[error("invalid CIDR {cidr:?}")]
    Cidr {
        cidr: String,
        #[source]
        source: ipnet::AddrParseError,
    },
}

/// Records parsed from one successful download
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub records: Vec<PrefixRecord>,
    /// Non-empty lines seen
    pub lines: usize,
    /// Lines dropped as malformed or oversized
    pub skipped: usize,
}

/// Anything that can produce a routing-table snapshot
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, cancel: &ShutdownToken) -> Result<FetchOutcome, FetchError>;
}

/// HTTP client for the snapshot feed
pub struct Fetcher {
    client: Client,
    url: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Fetcher {
    /// Create a fetcher; the identifying User-Agent is sent with every request.
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }

    /// Download and decode the snapshot, retrying with a fixed delay.
    ///
    /// Cancellation aborts the in-flight request (or the wait between
    /// attempts) and returns [`FetchError::Cancelled`] without retrying.
    pub async fn fetch_with_retry(
        &self,
        cancel: &ShutdownToken,
    ) -> Result<FetchOutcome, FetchError> {
        let mut attempt = 1;
        loop {
            info!("Fetching {} (attempt {}/{})", self.url, attempt, self.max_attempts);

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = self.fetch_once() => result,
            };

            match result {
                Ok(outcome) => {
                    info!(
                        "Fetched {} records ({} lines, {} skipped)",
                        format_count(outcome.records.len()),
                        format_count(outcome.lines),
                        outcome.skipped
                    );
                    return Ok(outcome);
                }
                Err(e) if attempt >= self.max_attempts => {
                    return Err(FetchError::Exhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        error = %error_chain(&e),
                        "Fetch failed"
                    );
                }
            }

            debug!("Retrying in {:?}", self.retry_delay);
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
            attempt += 1;
        }
    }

    async fn fetch_once(&self) -> Result<FetchOutcome, AttemptError> {
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(AttemptError::Request)?;

        if !response.status().is_success() {
            return Err(AttemptError::Status(response.status()));
        }

        let mut decoder = RecordDecoder::new();
        while let Some(chunk) = response.chunk().await.map_err(AttemptError::Body)? {
            decoder.feed(&chunk);
        }
        Ok(decoder.finish())
    }
}

#[async_trait]
impl SnapshotSource for Fetcher {
    async fn fetch(&self, cancel: &ShutdownToken) -> Result<FetchOutcome, FetchError> {
        self.fetch_with_retry(cancel).await
    }
}

/// Incremental newline-delimited JSON decoder.
///
/// Bytes may arrive split anywhere, including inside a line or a UTF-8
/// sequence. Each complete line is parsed on its own; a malformed line is
/// logged and skipped without affecting its neighbours.
pub struct RecordDecoder {
    buf: Vec<u8>,
    oversized: bool,
    line_no: usize,
    max_line_bytes: usize,
    outcome: FetchOutcome,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }

    pub fn with_max_line(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            oversized: false,
            line_no: 0,
            max_line_bytes,
            outcome: FetchOutcome::default(),
        }
    }

    pub fn feed(&mut self, mut chunk: &[u8]) {
        while let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            self.push_partial(&chunk[..pos]);
            self.end_line();
            chunk = &chunk[pos + 1..];
        }
        self.push_partial(chunk);
    }

    /// Flush a trailing line without newline and return everything decoded.
    pub fn finish(mut self) -> FetchOutcome {
        if !self.buf.is_empty() || self.oversized {
            self.end_line();
        }
        self.outcome
    }

    fn push_partial(&mut self, bytes: &[u8]) {
        if self.oversized {
            return;
        }
        if self.buf.len() + bytes.len() > self.max_line_bytes {
            self.oversized = true;
            self.buf.clear();
            return;
        }
        self.buf.extend_from_slice(bytes);
    }

    fn end_line(&mut self) {
        self.line_no += 1;

        if self.oversized {
            self.oversized = false;
            self.outcome.lines += 1;
            self.outcome.skipped += 1;
            warn!(
                line = self.line_no,
                max = self.max_line_bytes,
                "Skipping oversized line"
            );
            return;
        }

        let line = std::mem::take(&mut self.buf);
        let trimmed = line.trim_ascii();
        if !trimmed.is_empty() {
            self.outcome.lines += 1;
            match parse_record(trimmed) {
                Ok(record) => self.outcome.records.push(record),
                Err(e) => {
                    self.outcome.skipped += 1;
                    warn!(
                        line = self.line_no,
                        error = %error_chain(&e),
                        "Skipping invalid JSON line"
                    );
                }
            }
        }

        // Reuse the allocation for the next line
        self.buf = line;
        self.buf.clear();
    }
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one feed line.
pub fn parse_record(line: &[u8]) -> Result<PrefixRecord, RecordError> {
    #[derive(Deserialize)]
    struct RawRecord {
        #[serde(rename = "CIDR")]
        cidr: String,
        #[serde(rename = "ASN")]
        asn: u32,
    }

    let raw: RawRecord = serde_json::from_slice(line)?;
    let block = raw
        .cidr
        .parse::<NetworkBlock>()
        .map_err(|source| RecordError::Cidr {
            cidr: raw.cidr.clone(),
            source,
        })?;

    Ok(PrefixRecord {
        block,
        asn: raw.asn,
    })
}

/// Render an error and its sources on one line, for log fields.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
