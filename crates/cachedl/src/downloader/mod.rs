//! Downloader module
//!
//! This module contains the batch download engine: core types, configuration,
//! the length planner, the download executor and the completion gate that
//! delivers the terminal result.

pub mod config;
pub mod core;
pub mod engine;
pub mod executor;
pub mod gate;
pub mod planner;
pub mod state;

// Re-export main types for convenience
pub use config::{DownloadConfig, DownloadConfigBuilder};
pub use core::{
    CacheDecision, CachePolicy, ChunkProgress, CompletionCallback, ContentLength, DownloadError, ErrorKind,
    FetchOutcome, FileFacts, FileOperation, FileStore, HttpTransport, Item, LocalFileStore, ProbeOutcome, Progress,
    ProgressCallback, Result, Transport, TransportRequest,
};
pub use engine::{Downloader, download, download_with_progress};
pub use gate::CompletionGate;
pub use planner::LengthPlan;
pub use state::DownloadState;
