//! Cache policy evaluation
//!
//! Decides, for one item, whether a network round trip is needed at all and
//! which condition to attach to it. Evaluation is a pure function of the
//! effective policy and what the file store reports about the destination.

use super::CachePolicy;
use super::files::FileStore;
use std::path::Path;
use std::time::SystemTime;

/// What the file store knows about an item's destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileFacts {
    pub exists: bool,
    pub modified: Option<SystemTime>,
}

impl FileFacts {
    pub fn missing() -> Self {
        Self::default()
    }

    /// Query both facts from a file store
    pub async fn gather(store: &dyn FileStore, path: &Path) -> Self {
        let exists = store.exists(path).await;
        let modified = if exists { store.modification_time(path).await } else { None };
        Self { exists, modified }
    }
}

/// Outcome of evaluating an item's cache policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// Local copy is trusted, no request is issued
    SkipNetwork,
    /// Request with `If-Modified-Since` set to the local modification time
    ConditionalProbe(SystemTime),
    /// Request without any condition
    UnconditionalProbe,
}

impl CacheDecision {
    /// Condition to attach to a request, if any
    pub fn if_modified_since(self) -> Option<SystemTime> {
        match self {
            CacheDecision::ConditionalProbe(modified) => Some(modified),
            _ => None,
        }
    }
}

/// Decide how an item with `policy` and destination `facts` is to be fetched
pub fn evaluate(policy: CachePolicy, facts: &FileFacts) -> CacheDecision {
    match policy {
        CachePolicy::ReloadIgnoringCache => CacheDecision::UnconditionalProbe,
        CachePolicy::ReturnCacheElseLoad if facts.exists => CacheDecision::SkipNetwork,
        // A file without a readable timestamp cannot be revalidated
        CachePolicy::ReturnCacheIfUnmodifiedElseLoad if facts.exists => facts
            .modified
            .map_or(CacheDecision::UnconditionalProbe, CacheDecision::ConditionalProbe),
        _ => CacheDecision::UnconditionalProbe,
    }
}
