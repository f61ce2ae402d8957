//! Core types used throughout the downloader system
//!
//! This module contains the fundamental types that all other modules depend on:
//! the batch data model, errors, progress snapshots, the cache policy evaluator
//! and the two external collaborators (transport and file store).

pub mod cache;
pub mod error;
pub mod files;
pub mod http;
pub mod progress;

// Re-export main types for convenience
pub use cache::{CacheDecision, FileFacts, evaluate};
pub use error::{DownloadError, ErrorKind, FileOperation, Result};
pub use files::{FileStore, LocalFileStore};
pub use http::{FetchOutcome, HttpTransport, ProbeOutcome, Transport, TransportRequest};
pub use progress::{ChunkProgress, CompletionCallback, Progress, ProgressCallback};

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::path::PathBuf;
use url::Url;

/// Rule governing whether a local copy may be trusted without contacting the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Always re-fetch, never attach a condition
    ReloadIgnoringCache,
    /// Send the local file's modification time as `If-Modified-Since`
    #[default]
    ReturnCacheIfUnmodifiedElseLoad,
    /// Trust any existing local file without contacting the server
    ReturnCacheElseLoad,
}

/// One source-to-destination download unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub url: Url,
    pub destination: PathBuf,
    /// Overrides the batch default when set
    #[serde(default)]
    pub cache_policy: Option<CachePolicy>,
}

impl Item {
    /// Create an item from a URL string and a destination path
    pub fn new<S: AsRef<str>, P: Into<PathBuf>>(url: S, destination: P) -> Result<Self> {
        let url = url.as_ref();
        let url = Url::parse(url).map_err(|source| DownloadError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        Ok(Self::from_url(url, destination))
    }

    pub fn from_url<P: Into<PathBuf>>(url: Url, destination: P) -> Self {
        Self {
            url,
            destination: destination.into(),
            cache_policy: None,
        }
    }

    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = Some(cache_policy);
        self
    }

    /// The item's own policy, else the batch default
    pub fn effective_policy(&self, default: CachePolicy) -> CachePolicy {
        self.cache_policy.unwrap_or(default)
    }
}

/// A byte count that may not be determinable
///
/// `Unknown` absorbs everything it is added to, so an aggregate that has once
/// become unknown stays unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentLength {
    Known(u64),
    Unknown,
}

impl ContentLength {
    pub fn known(self) -> Option<u64> {
        match self {
            ContentLength::Known(length) => Some(length),
            ContentLength::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, ContentLength::Known(_))
    }
}

impl Default for ContentLength {
    fn default() -> Self {
        ContentLength::Unknown
    }
}

impl From<Option<u64>> for ContentLength {
    fn from(length: Option<u64>) -> Self {
        length.map_or(ContentLength::Unknown, ContentLength::Known)
    }
}

impl Add for ContentLength {
    type Output = ContentLength;

    fn add(self, rhs: ContentLength) -> ContentLength {
        match (self, rhs) {
            (ContentLength::Known(a), ContentLength::Known(b)) => ContentLength::Known(a.saturating_add(b)),
            _ => ContentLength::Unknown,
        }
    }
}

impl AddAssign for ContentLength {
    fn add_assign(&mut self, rhs: ContentLength) {
        *self = *self + rhs;
    }
}

impl std::fmt::Display for ContentLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentLength::Known(length) => write!(f, "{} bytes", length),
            ContentLength::Unknown => write!(f, "unknown size"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_length_is_sticky() {
        let mut total = ContentLength::Known(0);
        total += ContentLength::Known(11);
        assert_eq!(total, ContentLength::Known(11));

        total += ContentLength::Unknown;
        total += ContentLength::Known(101);
        assert_eq!(total, ContentLength::Unknown);
        assert_eq!(total.known(), None);
    }

    #[test]
    fn test_item_new_rejects_relative_url() {
        let error = Item::new("pi/pi10.txt", "/tmp/pi10.txt").unwrap_err();
        match error {
            DownloadError::InvalidUrl { url, .. } => assert_eq!(url, "pi/pi10.txt"),
            other => panic!("Expected InvalidUrl error, got {other:?}"),
        }
    }

    #[test]
    fn test_item_policy_override() {
        let item = Item::new("https://example.com/a.txt", "/tmp/a.txt").unwrap();
        assert_eq!(
            item.effective_policy(CachePolicy::ReloadIgnoringCache),
            CachePolicy::ReloadIgnoringCache
        );

        let item = item.with_cache_policy(CachePolicy::ReturnCacheElseLoad);
        assert_eq!(
            item.effective_policy(CachePolicy::ReloadIgnoringCache),
            CachePolicy::ReturnCacheElseLoad
        );
    }

    #[test]
    fn test_item_manifest_entry() {
        let json = r#"{"url": "https://example.com/a.txt", "destination": "out/a.txt", "cache_policy": "return_cache_else_load"}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.cache_policy, Some(CachePolicy::ReturnCacheElseLoad));
        assert_eq!(item.destination, PathBuf::from("out/a.txt"));

        let json = r#"{"url": "https://example.com/b.txt", "destination": "out/b.txt"}"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.cache_policy, None);
    }
}
