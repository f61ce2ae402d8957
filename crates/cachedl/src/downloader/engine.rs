//! Download engine
//!
//! [`Downloader`] is the handle callers hold. Constructing one spawns the
//! batch pipeline (plan, execute, resolve) on the current Tokio runtime; the
//! handle is then used to observe progress and completion and to request
//! cancellation. The pipeline task owns the [`DownloadState`] for its whole
//! lifetime and keeps running if the handle is dropped.

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::{
    CacheDecision, CachePolicy, ContentLength, DownloadError, FileFacts, FileStore, HttpTransport, Item,
    LocalFileStore, Progress, Result, Transport, TransportRequest, evaluate,
};
use crate::downloader::gate::CompletionGate;
use crate::downloader::state::DownloadState;
use crate::downloader::{executor, planner};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Collaborators and settings shared by the planner and executor
pub struct EngineContext {
    pub transport: Arc<dyn Transport>,
    pub file_store: Arc<dyn FileStore>,
    pub cancel: CancellationToken,
    pub gate: Arc<CompletionGate>,
    pub default_policy: CachePolicy,
    pub request_headers: HashMap<String, String>,
}

impl EngineContext {
    /// Fails with a cancellation error once the batch has been cancelled
    pub fn ensure_not_cancelled(&self, item: &Item) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::cancelled(Some(item.url.as_str())));
        }
        Ok(())
    }

    /// Pass `outcome` through unless the batch was cancelled meanwhile
    pub fn unless_cancelled<T>(&self, item: &Item, outcome: Result<T>) -> Result<T> {
        match outcome {
            Err(e) if !e.is_cancelled() && self.cancel.is_cancelled() => {
                Err(DownloadError::cancelled(Some(item.url.as_str())))
            }
            other => other,
        }
    }

    /// Evaluate an item's effective cache policy against the file store
    pub async fn decide(&self, item: &Item) -> CacheDecision {
        let facts = FileFacts::gather(self.file_store.as_ref(), &item.destination).await;
        evaluate(item.effective_policy(self.default_policy), &facts)
    }

    pub fn request(&self, item: &Item, decision: CacheDecision) -> TransportRequest {
        TransportRequest {
            url: item.url.clone(),
            headers: self.request_headers.clone(),
            if_modified_since: decision.if_modified_since(),
            cancellation: self.cancel.clone(),
        }
    }
}

/// Handle to a running batch
pub struct Downloader {
    gate: Arc<CompletionGate>,
    cancel: CancellationToken,
    transport: Arc<dyn Transport>,
    item_count: usize,
}

impl Downloader {
    /// Start downloading `items` with the HTTP transport and the local filesystem
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(items: Vec<Item>, config: DownloadConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_collaborators(items, config, transport, Arc::new(LocalFileStore::new())))
    }

    /// Start downloading from `(url, destination)` pairs
    pub fn from_pairs<I, S, P>(pairs: I, config: DownloadConfig) -> Result<Self>
    where
        I: IntoIterator<Item = (S, P)>,
        S: AsRef<str>,
        P: Into<PathBuf>,
    {
        let items = pairs
            .into_iter()
            .map(|(url, destination)| Item::new(url, destination))
            .collect::<Result<Vec<_>>>()?;
        Self::new(items, config)
    }

    /// Start downloading `items` with custom collaborators
    pub fn with_collaborators(
        items: Vec<Item>,
        config: DownloadConfig,
        transport: Arc<dyn Transport>,
        file_store: Arc<dyn FileStore>,
    ) -> Self {
        let gate = Arc::new(CompletionGate::new());
        let cancel = CancellationToken::new();
        let items: Arc<[Item]> = items.into();
        let item_count = items.len();

        let ctx = EngineContext {
            transport: transport.clone(),
            file_store,
            cancel: cancel.clone(),
            gate: gate.clone(),
            default_policy: config.cache_policy,
            request_headers: config.request_headers,
        };

        tokio::spawn(run_pipeline(ctx, items, config.expects_precise_progress));

        Self {
            gate,
            cancel,
            transport,
            item_count,
        }
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Observe every progress snapshot
    pub fn on_progress<F>(&self, handler: F) -> &Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.gate.register_progress(Arc::new(handler));
        self
    }

    /// Observe cumulative bytes and the aggregate expected size
    pub fn on_progress_bytes<F>(&self, handler: F) -> &Self
    where
        F: Fn(u64, ContentLength) + Send + Sync + 'static,
    {
        self.on_progress(move |progress| handler(progress.bytes_downloaded, progress.bytes_expected))
    }

    /// Observe the completed fraction of the batch
    pub fn on_progress_rate<F>(&self, handler: F) -> &Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.on_progress(move |progress| handler(progress.rate()))
    }

    /// Observe the terminal result; runs immediately if the batch already finished
    pub fn on_completion<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.gate.register_completion(Box::new(handler));
        self
    }

    /// Wait for the terminal result
    pub async fn completion(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.gate.register_completion(Box::new(move |result| {
            let _ = tx.send(result);
        }));
        rx.await.unwrap_or_else(|_| Err(DownloadError::cancelled(None)))
    }

    /// The terminal result, if the batch has finished
    pub fn result(&self) -> Option<Result<()>> {
        self.gate.result()
    }

    pub fn is_finished(&self) -> bool {
        self.gate.is_resolved()
    }

    /// Request cancellation of the batch
    ///
    /// The outcome arrives through the completion observers as a
    /// `Cancelled` error. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("Cancellation requested");
        }
        self.cancel.cancel();
        self.transport.cancel_current();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("item_count", &self.item_count)
            .field("cancelled", &self.is_cancelled())
            .field("gate", &self.gate)
            .finish()
    }
}

async fn run_pipeline(ctx: EngineContext, items: Arc<[Item]>, precise: bool) {
    info!("Starting batch of {} items", items.len());

    let result = match AssertUnwindSafe(drive(&ctx, items, precise)).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(DownloadError::Aborted {
            message: panic_message(payload.as_ref()),
        }),
    };
    match &result {
        Ok(()) => info!("Batch completed"),
        Err(e) if e.is_cancelled() => info!("Batch cancelled"),
        Err(e) => warn!(category = e.category(), "Batch failed: {}", e),
    }

    ctx.gate.resolve(result);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

async fn drive(ctx: &EngineContext, items: Arc<[Item]>, precise: bool) -> Result<()> {
    let mut state = DownloadState::new(items);

    let cached = if precise {
        let plan = planner::plan(ctx, state.items()).await?;
        state.set_bytes_expected(plan.expected);
        plan.cached
    } else {
        vec![false; state.item_count()]
    };

    executor::execute(ctx, &mut state, &cached).await
}

/// Download `items` and wait for the batch to finish
///
/// Dropping the returned future cancels the batch.
pub async fn download(items: Vec<Item>, config: DownloadConfig) -> Result<()> {
    download_with_progress(items, config, |_| {}).await
}

/// Like [`download`], reporting every progress snapshot to `handler`
pub async fn download_with_progress<F>(items: Vec<Item>, config: DownloadConfig, handler: F) -> Result<()>
where
    F: Fn(Progress) + Send + Sync + 'static,
{
    let downloader = Downloader::new(items, config)?;
    downloader.on_progress(handler);

    let guard = downloader.cancel.clone().drop_guard();
    let result = downloader.completion().await;
    guard.disarm();

    result
}
