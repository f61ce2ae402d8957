//! Progress snapshots and observer callback types

use super::{ContentLength, Result};
use std::sync::Arc;

/// Progress callback for download operations
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Completion callback, invoked at most once with the terminal result
pub type CompletionCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// Byte counters reported by the transport for one received chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// Bytes in this chunk
    pub bytes: u64,
    /// Bytes received for the current item so far, this chunk included
    pub item_bytes: u64,
    /// Size announced by the server for the current item
    pub item_expected: ContentLength,
}

/// Immutable snapshot of a batch's progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub bytes_downloaded: u64,
    pub bytes_expected: ContentLength,
    pub item_index: usize,
    pub item_count: usize,
    pub item_bytes_downloaded: u64,
    pub item_bytes_expected: ContentLength,
}

impl Progress {
    /// Completed fraction of the batch in `[0, 1]`
    ///
    /// Uses the aggregate byte count when it is known, else the position in
    /// the item list refined by the current item's byte count, else the
    /// position in the item list alone.
    pub fn rate(&self) -> f64 {
        if let ContentLength::Known(expected) = self.bytes_expected {
            if expected == 0 {
                return 1.0;
            }
            return (self.bytes_downloaded as f64 / expected as f64).min(1.0);
        }

        if self.item_count == 0 {
            return 1.0;
        }

        let item_fraction = match self.item_bytes_expected {
            ContentLength::Known(0) => 1.0,
            ContentLength::Known(expected) => (self.item_bytes_downloaded as f64 / expected as f64).min(1.0),
            ContentLength::Unknown => 0.0,
        };

        ((self.item_index as f64 + item_fraction) / self.item_count as f64).min(1.0)
    }

    /// Percentage helper for display
    pub fn percentage(&self) -> f64 {
        self.rate() * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(bytes_expected: ContentLength, item_bytes_expected: ContentLength) -> Progress {
        Progress {
            bytes_downloaded: 50,
            bytes_expected,
            item_index: 1,
            item_count: 4,
            item_bytes_downloaded: 25,
            item_bytes_expected,
        }
    }

    #[test]
    fn test_rate_prefers_aggregate() {
        let progress = snapshot(ContentLength::Known(200), ContentLength::Known(100));
        assert!((progress.rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rate_falls_back_to_item_bytes() {
        let progress = snapshot(ContentLength::Unknown, ContentLength::Known(100));
        assert!((progress.rate() - 1.25 / 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rate_falls_back_to_item_index() {
        let progress = snapshot(ContentLength::Unknown, ContentLength::Unknown);
        assert!((progress.rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rate_with_zero_expected() {
        let progress = snapshot(ContentLength::Known(0), ContentLength::Known(0));
        assert_eq!(progress.rate(), 1.0);
        assert_eq!(progress.percentage(), 100.0);
    }
}
