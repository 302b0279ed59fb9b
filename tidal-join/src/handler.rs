use std::sync::Arc;

use dashmap::DashMap;

use tidal_types::TimestampMs;
use tidal_window::WindowDefinition;

use crate::window::HashJoinWindow;

/// Creates and retires [`HashJoinWindow`] instances as records and
/// watermarks arrive (§3, §4.6). Window deletion happens after a window's
/// probe has fully drained; at least one window per side is always retained
/// so a late record belonging to the current window still has somewhere to
/// land.
pub struct WindowHandler {
    definition: WindowDefinition,
    num_partitions: usize,
    num_buckets: usize,
    windows: DashMap<TimestampMs, Arc<HashJoinWindow>>,
}

impl WindowHandler {
    pub fn new(definition: WindowDefinition, num_partitions: usize, num_buckets: usize) -> Self {
        Self {
            definition,
            num_partitions,
            num_buckets,
            windows: DashMap::new(),
        }
    }

    pub fn definition(&self) -> WindowDefinition {
        self.definition
    }

    /// Every window instance whose `[start, end)` covers `ts`, creating any
    /// that don't exist yet. For tumbling windows this is exactly one
    /// instance; for sliding windows it's every overlapping instance (§4.6
    /// "Sliding windows").
    pub fn get_or_create_covering(&self, ts: TimestampMs) -> Vec<Arc<HashJoinWindow>> {
        let (slice_start, _) = self.definition.slice_bounds(ts);
        let size = self.definition.size_ms();
        self.definition
            .window_starts_for_slice(slice_start)
            .into_iter()
            .map(|start| self.get_or_create(start, start + size))
            .collect()
    }

    fn get_or_create(&self, start: TimestampMs, end: TimestampMs) -> Arc<HashJoinWindow> {
        self.windows
            .entry(start)
            .or_insert_with(|| Arc::new(HashJoinWindow::new(start, end, self.num_partitions, self.num_buckets)))
            .clone()
    }

    pub fn get(&self, start: TimestampMs) -> Option<Arc<HashJoinWindow>> {
        self.windows.get(&start).map(|w| w.clone())
    }

    /// Every currently-open window, oldest first.
    pub fn open_windows(&self) -> Vec<Arc<HashJoinWindow>> {
        let mut windows: Vec<_> = self.windows.iter().map(|e| e.clone()).collect();
        windows.sort_by_key(|w| w.start());
        windows
    }

    /// Reclaims `window` once its probe has fully drained, unless it is the
    /// only (or most recent) open window for this handler — at least one
    /// open window is always kept to absorb late records (§4.6).
    pub fn retire_if_drained(&self, window_start: TimestampMs) {
        if self.windows.len() <= 1 {
            return;
        }
        if let Some(window) = self.windows.get(&window_start) {
            if window.all_partitions_probed() {
                drop(window);
                self.windows.remove(&window_start);
            }
        }
    }

    pub fn open_window_count(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_window::WindowDefinition;

    #[test]
    fn covering_a_tumbling_record_creates_exactly_one_window() {
        let handler = WindowHandler::new(WindowDefinition::tumbling(1000), 2, 4);
        let windows = handler.get_or_create_covering(1500);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start(), 1000);
        assert_eq!(windows[0].end(), 2000);
        assert_eq!(handler.open_window_count(), 1);
    }

    #[test]
    fn covering_a_sliding_record_fans_out_and_reuses_existing_windows() {
        let handler = WindowHandler::new(WindowDefinition::sliding(10_000, 5_000), 1, 4);
        let first = handler.get_or_create_covering(12_000);
        assert_eq!(first.len(), 2);
        assert_eq!(handler.open_window_count(), 2);

        let second = handler.get_or_create_covering(13_000);
        assert_eq!(second.len(), 2);
        // Same slice (10_000..15_000) as the first call, so no new windows created.
        assert_eq!(handler.open_window_count(), 2);
    }

    #[test]
    fn retire_keeps_at_least_one_open_window() {
        let handler = WindowHandler::new(WindowDefinition::tumbling(1000), 1, 4);
        let windows = handler.get_or_create_covering(500);
        let only = &windows[0];
        only.mark_partition_probed(0);
        handler.retire_if_drained(only.start());
        assert_eq!(handler.open_window_count(), 1, "last remaining window is never evicted");
    }

    #[test]
    fn retire_drops_a_fully_probed_window_once_another_is_open() {
        let handler = WindowHandler::new(WindowDefinition::tumbling(1000), 1, 4);
        let first = handler.get_or_create_covering(500)[0].clone();
        handler.get_or_create_covering(1500);
        assert_eq!(handler.open_window_count(), 2);

        first.mark_partition_probed(0);
        handler.retire_if_drained(first.start());
        assert_eq!(handler.open_window_count(), 1);
        assert!(handler.get(first.start()).is_none());
    }
}
