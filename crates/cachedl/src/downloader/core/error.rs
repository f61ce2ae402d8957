//! Error types for the downloader with context for diagnosis and re-issue

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::error::Error as StdError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced by a download batch
///
/// Sources are held behind `Arc` so that a single terminal result can be
/// handed to every completion observer and replayed to late registrants.
#[derive(Error, Debug, Clone)]
pub enum DownloadError {
    /// The item's source locator could not be parsed
    #[error("Invalid URL '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Connection, DNS, TLS or body-stream failure
    #[error("HTTP request to '{url}' failed")]
    Network {
        url: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    /// The transport gave up waiting for the server
    #[error("Request to '{url}' timed out after {duration_secs}s (try increasing timeout or check network)")]
    NetworkTimeout {
        url: String,
        duration_secs: u64,
    },

    /// The server answered with neither a success nor a "not modified" status
    #[error("Server answered '{url}' with status {status}")]
    Response {
        url: String,
        status: StatusCode,
        headers: HeaderMap,
    },

    /// Local file store failure while relocating a payload or writing its timestamp
    #[error("File operation failed on '{path}': {operation}")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The batch was cancelled before or during a network call
    #[error("Download cancelled")]
    Cancelled {
        url: Option<String>,
    },

    /// The transport could not be constructed from the given configuration
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
    },

    /// The pipeline stopped unexpectedly, e.g. a caller-supplied observer panicked
    #[error("Download pipeline aborted: {message}")]
    Aborted {
        message: String,
    },
}

/// Coarse classification of a [`DownloadError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Response,
    Io,
    Cancellation,
    Configuration,
    Internal,
}

/// Types of file operations for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    CreateDir,
    Write,
    Move,
    Copy,
    Delete,
    SetModified,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::CreateDir => write!(f, "creating directory"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Move => write!(f, "moving"),
            FileOperation::Copy => write!(f, "copying"),
            FileOperation::Delete => write!(f, "deleting"),
            FileOperation::SetModified => write!(f, "setting modification time"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl DownloadError {
    /// Wrap a transport-level failure for `url`
    pub fn network<E>(url: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        DownloadError::Network {
            url: url.into(),
            source: Arc::new(source),
        }
    }

    /// Wrap a file store failure on `path`
    pub fn file_system(path: impl Into<PathBuf>, operation: FileOperation, source: std::io::Error) -> Self {
        DownloadError::FileSystem {
            path: path.into(),
            operation,
            source: Arc::new(source),
        }
    }

    pub fn cancelled(url: Option<&str>) -> Self {
        DownloadError::Cancelled {
            url: url.map(str::to_string),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Network { .. } | DownloadError::NetworkTimeout { .. } => ErrorKind::Network,
            DownloadError::Response { .. } => ErrorKind::Response,
            DownloadError::FileSystem { .. } => ErrorKind::Io,
            DownloadError::Cancelled { .. } => ErrorKind::Cancellation,
            DownloadError::InvalidUrl { .. } | DownloadError::Configuration { .. } => ErrorKind::Configuration,
            DownloadError::Aborted { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// Status of the offending response, for `Response` errors
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DownloadError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            DownloadError::InvalidUrl { .. } => "invalid_url",
            DownloadError::Network { .. } => "network",
            DownloadError::NetworkTimeout { .. } => "network_timeout",
            DownloadError::Response { .. } => "response",
            DownloadError::FileSystem { .. } => "file_system",
            DownloadError::Cancelled { .. } => "cancelled",
            DownloadError::Configuration { .. } => "configuration",
            DownloadError::Aborted { .. } => "aborted",
        }
    }

    /// Get user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            DownloadError::InvalidUrl { .. } => Some("URL must be absolute (include http:// or https://)"),
            DownloadError::NetworkTimeout { .. } => {
                Some("Check your internet connection or try increasing the timeout value")
            }
            DownloadError::Response { status, .. } if status.is_client_error() => {
                Some("Check that the URL is correct and that the resource still exists")
            }
            DownloadError::Response { .. } => Some("The server reported a problem, try again later"),
            DownloadError::FileSystem { operation: FileOperation::SetModified, .. } => {
                Some("The file was downloaded but its timestamp could not be stored; the next run will fetch it again")
            }
            DownloadError::FileSystem { .. } => {
                Some("Check permissions and free space of the destination directory")
            }
            _ => None,
        }
    }

    /// Create a detailed error report for debugging
    pub fn detailed_report(&self) -> String {
        let mut report = format!("Error: {}\n", self);
        report.push_str(&format!("Category: {}\n", self.category()));
        report.push_str(&format!("Kind: {:?}\n", self.kind()));

        if let DownloadError::Response { headers, .. } = self {
            for (name, value) in headers {
                report.push_str(&format!("Header: {}: {}\n", name, value.to_str().unwrap_or("<binary>")));
            }
        }

        if let Some(suggestion) = self.suggestion() {
            report.push_str(&format!("Suggestion: {}\n", suggestion));
        }

        if let Some(source) = self.source() {
            report.push_str(&format!("Root cause: {}\n", source));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_variants() {
        let timeout = DownloadError::NetworkTimeout { url: "http://a".into(), duration_secs: 30 };
        assert_eq!(timeout.kind(), ErrorKind::Network);
        assert_eq!(timeout.category(), "network_timeout");

        let cancelled = DownloadError::cancelled(Some("http://a"));
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.status(), None);

        let io = DownloadError::file_system(
            "/tmp/x",
            FileOperation::Move,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(io.kind(), ErrorKind::Io);

        let aborted = DownloadError::Aborted { message: "observer panicked".into() };
        assert_eq!(aborted.kind(), ErrorKind::Internal);
        assert_eq!(aborted.category(), "aborted");
        assert!(!aborted.is_cancelled());
    }

    #[test]
    fn test_response_error_report() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", "abc".parse().unwrap());
        let error = DownloadError::Response {
            url: "http://example.com/missing".into(),
            status: StatusCode::NOT_FOUND,
            headers,
        };

        assert_eq!(error.status(), Some(StatusCode::NOT_FOUND));
        let report = error.detailed_report();
        assert!(report.contains("404"));
        assert!(report.contains("x-request-id: abc"));
        assert!(report.contains("Suggestion: Check that the URL is correct"));
    }

    #[test]
    fn test_root_cause_in_report() {
        let error = DownloadError::file_system(
            "/tmp/x",
            FileOperation::SetModified,
            std::io::Error::new(std::io::ErrorKind::Other, "read-only filesystem"),
        );

        let report = error.detailed_report();
        assert!(report.contains("Root cause: read-only filesystem"));
        assert!(report.contains("setting modification time"));
    }

    #[test]
    fn test_errors_are_cloneable_for_replay() {
        let error = DownloadError::network("http://a", std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        let copy = error.clone();
        assert_eq!(copy.to_string(), error.to_string());
        assert!(copy.source().is_some());
    }
}
