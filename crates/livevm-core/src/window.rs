//! Sliding window of recent blocks for throughput and cadence metrics.
//!
//! Each viewer keeps its own window, so figures only depend on what that
//! viewer has seen since it joined.

use std::collections::VecDeque;

use crate::event::BlockEvent;

/// Window size used when a viewer does not pick one.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// One recorded block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub block_number: u64,
    pub tx_count: usize,
    pub timestamp: i64,
}

/// Bounded history of the most recent blocks, newest first.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    capacity: usize,
    entries: VecDeque<WindowEntry>,
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl SlidingWindow {
    /// Create an empty window. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a block at the front, evicting the oldest entry past capacity.
    ///
    /// Returns `false` (and records nothing) if the block number does not
    /// advance past the newest entry, e.g. a reorg or a repeated head.
    pub fn record(&mut self, block: &BlockEvent) -> bool {
        if let Some(front) = self.entries.front() {
            if block.block_number <= front.block_number {
                return false;
            }
        }
        self.entries.push_front(WindowEntry {
            block_number: block.block_number,
            tx_count: block.tx_count(),
            timestamp: block.timestamp,
        });
        self.entries.truncate(self.capacity);
        true
    }

    /// Change the capacity, dropping the oldest entries if it shrank.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.entries.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Transactions per second across the window, rounded to 2 places.
    ///
    /// Zero with fewer than two entries or a non-positive time span.
    pub fn tps(&self) -> f64 {
        let Some(span) = self.span_seconds() else {
            return 0.0;
        };
        let txs: usize = self.entries.iter().map(|e| e.tx_count).sum();
        round2(txs as f64 / span as f64)
    }

    /// Mean seconds between blocks across the window, rounded to 2 places.
    pub fn average_block_time(&self) -> f64 {
        let Some(span) = self.span_seconds() else {
            return 0.0;
        };
        round2(span as f64 / (self.entries.len() - 1) as f64)
    }

    fn span_seconds(&self) -> Option<i64> {
        if self.entries.len() < 2 {
            return None;
        }
        let front = self.entries.front()?;
        let back = self.entries.back()?;
        let span = front.timestamp - back.timestamp;
        (span > 0).then_some(span)
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    pub fn newest(&self) -> Option<&WindowEntry> {
        self.entries.front()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TxSummary;

    fn block(number: u64, txs: usize, timestamp: i64) -> BlockEvent {
        let mut b = BlockEvent::empty(number, timestamp);
        b.transactions = (0..txs)
            .map(|i| TxSummary {
                from: "0x1".into(),
                to: "0x2".into(),
                gas: "0x5208".into(),
                hash: format!("0x{number:x}{i:04x}"),
                value_wei: "0".into(),
                block_number: number,
            })
            .collect();
        b
    }

    #[test]
    fn metrics_example() {
        let mut w = SlidingWindow::new(3);
        w.record(&block(100, 5, 1000));
        w.record(&block(101, 3, 1010));
        w.record(&block(102, 7, 1025));
        assert_eq!(w.tps(), 0.60);
        assert_eq!(w.average_block_time(), 12.50);
    }

    #[test]
    fn keeps_most_recent_in_arrival_order() {
        for cap in 1..6 {
            let mut w = SlidingWindow::new(cap);
            for n in 0..20u64 {
                w.record(&block(n, 1, n as i64 * 2));
                assert!(w.len() <= cap);
            }
            let numbers: Vec<u64> = w.entries().map(|e| e.block_number).collect();
            let expected: Vec<u64> = (0..20u64).rev().take(cap).collect();
            assert_eq!(numbers, expected);
        }
    }

    #[test]
    fn zero_with_single_entry() {
        let mut w = SlidingWindow::new(10);
        assert_eq!(w.tps(), 0.0);
        assert_eq!(w.average_block_time(), 0.0);
        w.record(&block(1, 50, 100));
        assert_eq!(w.tps(), 0.0);
        assert_eq!(w.average_block_time(), 0.0);
    }

    #[test]
    fn zero_with_zero_span() {
        let mut w = SlidingWindow::new(10);
        w.record(&block(1, 5, 100));
        w.record(&block(2, 5, 100));
        assert_eq!(w.tps(), 0.0);
        assert_eq!(w.average_block_time(), 0.0);
    }

    #[test]
    fn zero_with_backwards_timestamps() {
        let mut w = SlidingWindow::new(10);
        w.record(&block(1, 5, 200));
        w.record(&block(2, 5, 100));
        assert_eq!(w.tps(), 0.0);
        assert_eq!(w.average_block_time(), 0.0);
    }

    #[test]
    fn ignores_non_increasing_blocks() {
        let mut w = SlidingWindow::new(10);
        assert!(w.record(&block(10, 1, 100)));
        assert!(!w.record(&block(10, 1, 102)));
        assert!(!w.record(&block(9, 1, 104)));
        assert!(w.record(&block(11, 1, 112)));
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn shrinking_drops_oldest() {
        let mut w = SlidingWindow::new(5);
        for n in 1..=5 {
            w.record(&block(n, 0, n as i64));
        }
        w.set_capacity(2);
        assert_eq!(w.capacity(), 2);
        let numbers: Vec<u64> = w.entries().map(|e| e.block_number).collect();
        assert_eq!(numbers, vec![5, 4]);
    }

    #[test]
    fn clear_empties() {
        let mut w = SlidingWindow::new(3);
        w.record(&block(1, 0, 1));
        w.clear();
        assert!(w.is_empty());
        assert!(w.record(&block(1, 0, 1)));
    }

    #[test]
    fn degraded_blocks_still_count() {
        let mut w = SlidingWindow::new(3);
        w.record(&block(104, 4, 1000));
        w.record(&BlockEvent::empty(105, 1012));
        assert_eq!(w.newest().unwrap().tx_count, 0);
        assert_eq!(w.average_block_time(), 12.0);
        assert_eq!(w.tps(), 0.33);
    }
}
