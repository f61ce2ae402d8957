//! Length planner
//!
//! Walks the batch once before any transfer, probing every item that is not
//! trusted from the cache, to learn the aggregate size and which items can be
//! skipped entirely.

use crate::downloader::core::{CacheDecision, ContentLength, Item, ProbeOutcome, Result};
use crate::downloader::engine::EngineContext;
use tracing::{Instrument, debug, info_span};

/// Aggregate size and per-item cache status of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthPlan {
    pub expected: ContentLength,
    /// One entry per item, in item order
    pub cached: Vec<bool>,
}

/// Probe every item in order
///
/// Once any item's size is unknown the aggregate stays unknown, but the scan
/// still visits every item since the cache flags feed the executor. The first
/// error or cancellation aborts the whole plan.
pub async fn plan(ctx: &EngineContext, items: &[Item]) -> Result<LengthPlan> {
    let mut expected = ContentLength::Known(0);
    let mut cached = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let span = info_span!("probe", index, url = %item.url);
        let (length, is_cached) = plan_item(ctx, item).instrument(span).await?;
        expected += length;
        cached.push(is_cached);
    }

    debug!("Planned {} items, expecting {}", items.len(), expected);
    Ok(LengthPlan { expected, cached })
}

async fn plan_item(ctx: &EngineContext, item: &Item) -> Result<(ContentLength, bool)> {
    ctx.ensure_not_cancelled(item)?;

    let decision = ctx.decide(item).await;
    if decision == CacheDecision::SkipNetwork {
        debug!("Local copy trusted, not probing");
        return Ok((ContentLength::Known(0), true));
    }

    let outcome = ctx.transport.probe(&ctx.request(item, decision)).await;
    let outcome = ctx.unless_cancelled(item, outcome)?;

    debug!("Probe answered {:?}", outcome);
    Ok(match outcome {
        ProbeOutcome::NotModified => (ContentLength::Known(0), true),
        ProbeOutcome::SizeKnown(length) => (ContentLength::Known(length), false),
        ProbeOutcome::SizeUnknown => (ContentLength::Unknown, false),
    })
}
