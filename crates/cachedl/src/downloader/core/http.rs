//! HTTP transport
//!
//! The [`Transport`] trait is the engine's only view of the network: a
//! metadata probe, a streaming body fetch into a staged file, and best-effort
//! cancellation of whatever request is outstanding. [`HttpTransport`] is the
//! production implementation on top of `reqwest`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::error::{DownloadError, FileOperation, Result};
use super::progress::ChunkProgress;
use super::ContentLength;
use crate::downloader::config::DownloadConfig;

/// IMF-fixdate, used for both `Last-Modified` and `If-Modified-Since`
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// One probe or fetch as issued by the engine
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: Url,
    pub headers: HashMap<String, String>,
    /// Sent as `If-Modified-Since` when present
    pub if_modified_since: Option<SystemTime>,
    /// Batch cancellation token; cancelling it aborts the request
    pub cancellation: CancellationToken,
}

/// Result of a metadata probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    NotModified,
    SizeKnown(u64),
    SizeUnknown,
}

/// Result of a body fetch
#[derive(Debug)]
pub enum FetchOutcome {
    NotModified,
    /// The body was staged at `temp_path`; the caller owns that file from now on
    Success {
        temp_path: PathBuf,
        last_modified: Option<SystemTime>,
    },
    HttpError {
        status: StatusCode,
        headers: HeaderMap,
    },
}

/// Network collaborator used by the planner and executor
#[async_trait]
pub trait Transport: Send + Sync {
    async fn probe(&self, request: &TransportRequest) -> Result<ProbeOutcome>;

    /// Stream the body of `request`, calling `on_chunk` once per received chunk
    async fn fetch(
        &self,
        request: &TransportRequest,
        on_chunk: &mut (dyn FnMut(ChunkProgress) + Send),
    ) -> Result<FetchOutcome>;

    /// Best-effort cancellation of the outstanding request, if any
    fn cancel_current(&self);
}

/// `reqwest` backed transport
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
    staging_dir: PathBuf,
    current: Mutex<CancellationToken>,
}

impl HttpTransport {
    /// Create a new HTTP transport from download configuration
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        // Idle limits only: a slow body keeps going as long as bytes arrive
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| DownloadError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            timeout: config.timeout,
            staging_dir: config.staging_dir(),
            current: Mutex::new(CancellationToken::new()),
        })
    }

    /// Register a fresh token for the request about to be sent
    fn begin_request(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = token.clone();
        token
    }

    fn build_request(&self, method: Method, request: &TransportRequest) -> RequestBuilder {
        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(modified) = request.if_modified_since {
            builder = builder.header(IF_MODIFIED_SINCE, format_http_date(modified));
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder, url: &Url, token: &CancellationToken) -> Result<Response> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(DownloadError::cancelled(Some(url.as_str()))),
            response = builder.send() => response.map_err(|e| self.map_error(url, e)),
        }
    }

    fn map_error(&self, url: &Url, error: reqwest::Error) -> DownloadError {
        if error.is_timeout() {
            DownloadError::NetworkTimeout {
                url: url.to_string(),
                duration_secs: self.timeout.as_secs(),
            }
        } else {
            DownloadError::network(url.as_str(), error)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, request: &TransportRequest) -> Result<ProbeOutcome> {
        let token = self.begin_request(&request.cancellation);
        debug!("HEAD {} (if-modified-since: {:?})", request.url, request.if_modified_since);

        let response = self
            .send(self.build_request(Method::HEAD, request), &request.url, &token)
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(ProbeOutcome::NotModified);
        }
        if !status.is_success() {
            debug!("HEAD {} answered {}, size is unknown", request.url, status);
            return Ok(ProbeOutcome::SizeUnknown);
        }

        Ok(match header_content_length(response.headers()) {
            Some(length) => ProbeOutcome::SizeKnown(length),
            None => ProbeOutcome::SizeUnknown,
        })
    }

    async fn fetch(
        &self,
        request: &TransportRequest,
        on_chunk: &mut (dyn FnMut(ChunkProgress) + Send),
    ) -> Result<FetchOutcome> {
        let token = self.begin_request(&request.cancellation);
        debug!("GET {} (if-modified-since: {:?})", request.url, request.if_modified_since);

        let response = self
            .send(self.build_request(Method::GET, request), &request.url, &token)
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Ok(FetchOutcome::HttpError {
                status,
                headers: response.headers().clone(),
            });
        }

        let item_expected = ContentLength::from(header_content_length(response.headers()));
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_http_date);

        let staged = tempfile::Builder::new()
            .prefix(".cachedl-")
            .tempfile_in(&self.staging_dir)
            .map_err(|e| DownloadError::file_system(&self.staging_dir, FileOperation::Write, e))?;
        // The staged file is removed when `temp_path` drops, unless kept below
        let (file, temp_path) = staged.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut stream = response.bytes_stream();
        let mut item_bytes = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Fetch of {} cancelled after {} bytes", request.url, item_bytes);
                    return Err(DownloadError::cancelled(Some(request.url.as_str())));
                }
                next = stream.next() => next,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| self.map_error(&request.url, e))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::file_system(temp_path.to_path_buf(), FileOperation::Write, e))?;

            item_bytes += chunk.len() as u64;
            on_chunk(ChunkProgress {
                bytes: chunk.len() as u64,
                item_bytes,
                item_expected,
            });
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::file_system(temp_path.to_path_buf(), FileOperation::Write, e))?;
        drop(file);

        let temp_path = temp_path
            .keep()
            .map_err(|e| DownloadError::file_system(e.path.to_path_buf(), FileOperation::Write, e.error))?;

        debug!("Staged {} bytes of {} at {}", item_bytes, request.url, temp_path.display());
        Ok(FetchOutcome::Success { temp_path, last_modified })
    }

    fn cancel_current(&self) {
        self.current.lock().unwrap_or_else(PoisonError::into_inner).cancel();
    }
}

/// `Content-Length` as announced by the server
///
/// Read from the header itself, since the body size hint of a `HEAD`
/// response is always empty.
fn header_content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

/// Format a timestamp as an HTTP date, truncated to whole seconds
pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE_FORMAT).to_string()
}

pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    NaiveDateTime::parse_from_str(value.trim(), HTTP_DATE_FORMAT)
        .ok()
        .map(|naive| SystemTime::from(naive.and_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_date_round_trip() {
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        let formatted = format_http_date(stamp);
        assert_eq!(formatted, "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_http_date(&formatted), Some(stamp));
    }

    #[test]
    fn test_http_date_truncates_subseconds() {
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_millis(1_445_412_480_750);
        let parsed = parse_http_date(&format_http_date(stamp));
        assert_eq!(parsed, Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480)));
    }

    #[test]
    fn test_parse_http_date_rejects_garbage() {
        assert_eq!(parse_http_date("yesterday"), None);
        assert_eq!(parse_http_date(""), None);
    }

    #[test]
    fn test_header_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(header_content_length(&headers), None);

        headers.insert(CONTENT_LENGTH, "4096".parse().unwrap());
        assert_eq!(header_content_length(&headers), Some(4096));

        headers.insert(CONTENT_LENGTH, "lots".parse().unwrap());
        assert_eq!(header_content_length(&headers), None);
    }

    #[test]
    fn test_cancel_current_reaches_in_flight_token() {
        let transport = HttpTransport::new(&DownloadConfig::default()).unwrap();
        let batch = CancellationToken::new();

        let first = transport.begin_request(&batch);
        let second = transport.begin_request(&batch);
        transport.cancel_current();

        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());
        assert!(!batch.is_cancelled());
    }
}
