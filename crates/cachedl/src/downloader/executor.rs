//! Download executor
//!
//! Transfers the items of a batch strictly in order, skipping cached ones,
//! moving each staged body into its destination and stamping it with the
//! server's modification time.

use crate::downloader::core::{CacheDecision, ChunkProgress, DownloadError, FetchOutcome, Item, Result};
use crate::downloader::engine::EngineContext;
use crate::downloader::state::DownloadState;
use tracing::{Instrument, debug, info_span, warn};

/// Run every item in order, stopping at the first failure
///
/// `cached` holds the planner's verdict per item; a missing entry counts as
/// not cached.
pub async fn execute(ctx: &EngineContext, state: &mut DownloadState, cached: &[bool]) -> Result<()> {
    let items = state.shared_items();

    for (index, item) in items.iter().enumerate() {
        state.begin_item(index);

        let is_cached = cached.get(index).copied().unwrap_or(false);
        let span = info_span!("item", index, url = %item.url);
        transfer_item(ctx, state, item, is_cached).instrument(span).await?;
    }

    Ok(())
}

async fn transfer_item(ctx: &EngineContext, state: &mut DownloadState, item: &Item, is_cached: bool) -> Result<()> {
    // A cancelled batch never reports success, cached items included
    ctx.ensure_not_cancelled(item)?;

    if is_cached {
        debug!("Cached, skipping");
        return Ok(());
    }

    let decision = ctx.decide(item).await;
    if decision == CacheDecision::SkipNetwork {
        debug!("Local copy trusted, skipping");
        return Ok(());
    }

    let request = ctx.request(item, decision);
    let gate = &ctx.gate;
    let mut on_chunk = |chunk: ChunkProgress| {
        let progress = state.record_chunk(chunk);
        gate.publish(progress);
    };

    let outcome = ctx.transport.fetch(&request, &mut on_chunk).await;
    let outcome = ctx.unless_cancelled(item, outcome)?;

    match outcome {
        FetchOutcome::NotModified => {
            debug!("Not modified, keeping {}", item.destination.display());
            Ok(())
        }
        FetchOutcome::Success { temp_path, last_modified } => {
            if let Err(e) = ctx.file_store.atomic_replace(&temp_path, &item.destination).await {
                if let Err(cleanup) = ctx.file_store.remove(&temp_path).await {
                    warn!("Could not remove staged file: {}", cleanup);
                }
                return Err(e);
            }

            // The payload stays in place even if stamping it fails
            if let Some(modified) = last_modified {
                ctx.file_store.set_modification_time(&item.destination, modified).await?;
            }

            debug!("Stored {}", item.destination.display());
            Ok(())
        }
        FetchOutcome::HttpError { status, headers } => Err(DownloadError::Response {
            url: item.url.to_string(),
            status,
            headers,
        }),
    }
}
