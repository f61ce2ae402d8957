//! Per-batch download state and progress aggregation

use crate::downloader::core::{ChunkProgress, ContentLength, Item, Progress};
use std::sync::Arc;

/// Mutable state of one batch, owned by its pipeline task
///
/// Counters only move forward: the item index is advanced by the executor and
/// the cumulative byte count only grows.
#[derive(Debug, Clone)]
pub struct DownloadState {
    items: Arc<[Item]>,
    current_index: usize,
    /// `None` until the first byte of the batch arrives
    bytes_downloaded: Option<u64>,
    bytes_expected: ContentLength,
    item_bytes_downloaded: u64,
    item_bytes_expected: ContentLength,
}

impl DownloadState {
    pub fn new(items: Arc<[Item]>) -> Self {
        Self {
            items,
            current_index: 0,
            bytes_downloaded: None,
            bytes_expected: ContentLength::Unknown,
            item_bytes_downloaded: 0,
            item_bytes_expected: ContentLength::Unknown,
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Cheap handle to the item list, for iterating while mutating the counters
    pub fn shared_items(&self) -> Arc<[Item]> {
        Arc::clone(&self.items)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn bytes_downloaded(&self) -> Option<u64> {
        self.bytes_downloaded
    }

    pub fn bytes_expected(&self) -> ContentLength {
        self.bytes_expected
    }

    /// Record the planner's aggregate size
    pub fn set_bytes_expected(&mut self, expected: ContentLength) {
        self.bytes_expected = expected;
    }

    /// Move to item `index` and reset the per-item counters
    ///
    /// The index never moves backwards; an earlier index is ignored.
    pub fn begin_item(&mut self, index: usize) {
        if index < self.current_index {
            return;
        }
        self.current_index = index;
        self.item_bytes_downloaded = 0;
        self.item_bytes_expected = ContentLength::Unknown;
    }

    /// Fold one received chunk into the counters and return the new snapshot
    pub fn record_chunk(&mut self, chunk: ChunkProgress) -> Progress {
        let total = self.bytes_downloaded.unwrap_or(0).saturating_add(chunk.bytes);
        self.bytes_downloaded = Some(total);
        self.item_bytes_downloaded = self.item_bytes_downloaded.max(chunk.item_bytes);
        self.item_bytes_expected = chunk.item_expected;
        self.snapshot()
    }

    pub fn snapshot(&self) -> Progress {
        Progress {
            bytes_downloaded: self.bytes_downloaded.unwrap_or(0),
            bytes_expected: self.bytes_expected,
            item_index: self.current_index,
            item_count: self.items.len(),
            item_bytes_downloaded: self.item_bytes_downloaded,
            item_bytes_expected: self.item_bytes_expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(count: usize) -> Arc<[Item]> {
        (0..count)
            .map(|i| Item::new(format!("https://example.com/{i}.bin"), format!("/tmp/{i}.bin")).unwrap())
            .collect()
    }

    fn chunk(bytes: u64, item_bytes: u64, item_expected: ContentLength) -> ChunkProgress {
        ChunkProgress { bytes, item_bytes, item_expected }
    }

    #[test]
    fn test_bytes_unknown_until_first_chunk() {
        let mut state = DownloadState::new(items(1));
        assert_eq!(state.bytes_downloaded(), None);

        state.begin_item(0);
        let progress = state.record_chunk(chunk(0, 0, ContentLength::Known(0)));
        assert_eq!(state.bytes_downloaded(), Some(0));
        assert_eq!(progress.bytes_downloaded, 0);
    }

    #[test]
    fn test_record_chunk_accumulates_across_items() {
        let mut state = DownloadState::new(items(2));
        state.set_bytes_expected(ContentLength::Known(30));

        state.begin_item(0);
        state.record_chunk(chunk(5, 5, ContentLength::Known(10)));
        let progress = state.record_chunk(chunk(5, 10, ContentLength::Known(10)));
        assert_eq!(progress.bytes_downloaded, 10);
        assert_eq!(progress.item_bytes_downloaded, 10);

        state.begin_item(1);
        assert_eq!(state.snapshot().item_bytes_downloaded, 0);
        assert_eq!(state.snapshot().item_bytes_expected, ContentLength::Unknown);

        let progress = state.record_chunk(chunk(20, 20, ContentLength::Known(20)));
        assert_eq!(progress.bytes_downloaded, 30);
        assert_eq!(progress.bytes_expected, ContentLength::Known(30));
        assert_eq!(progress.item_index, 1);
        assert_eq!(progress.item_count, 2);
        assert_eq!(progress.rate(), 1.0);
    }

    #[test]
    fn test_index_never_decreases() {
        let mut state = DownloadState::new(items(3));
        state.begin_item(2);
        state.begin_item(1);
        assert_eq!(state.current_index(), 2);
    }
}
