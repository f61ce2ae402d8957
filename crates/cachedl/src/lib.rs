//! cachedl
//!
//! Sequential batch downloads with HTTP conditional caching. Items are fetched
//! strictly in order; a destination file's modification time doubles as the
//! cache validator for the next run, so unchanged resources are not transferred
//! again.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cachedl::{CachePolicy, DownloadConfig, Downloader, Item};
//!
//! # async fn example() -> cachedl::Result<()> {
//! let config = DownloadConfig::builder()
//!     .cache_policy(CachePolicy::ReturnCacheIfUnmodifiedElseLoad)
//!     .header("Accept", "application/octet-stream")
//!     .build();
//!
//! let items = vec![
//!     Item::new("https://example.com/data/a.bin", "downloads/a.bin")?,
//!     Item::new("https://example.com/data/b.bin", "downloads/b.bin")?
//!         .with_cache_policy(CachePolicy::ReturnCacheElseLoad),
//! ];
//!
//! let downloader = Downloader::new(items, config)?;
//! downloader.on_progress(|progress| {
//!     println!("{:.1}% ({} bytes)", progress.percentage(), progress.bytes_downloaded);
//! });
//!
//! downloader.completion().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Conditional requests**: `If-Modified-Since` from the local file, `Last-Modified` written back
//! - **Three cache policies**: per batch, overridable per item
//! - **Precise progress**: optional up-front probe of every item for an aggregate size
//! - **Replayable completion**: late observers receive the stored result
//! - **Cooperative cancellation**: checked before every network call and raced against in-flight requests
//! - **Pluggable collaborators**: [`Transport`] and [`FileStore`] traits

pub mod downloader;

// Re-export commonly used types for convenience
pub use downloader::{
    CachePolicy, ContentLength, DownloadConfig, DownloadConfigBuilder, DownloadError, Downloader, ErrorKind,
    FileStore, Item, Progress, Result, Transport, download, download_with_progress,
};
pub use url::Url;
