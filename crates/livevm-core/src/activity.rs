//! Watched-address activity for one viewer on one chain.

use std::str::FromStr;

use alloy_primitives::Address;

use crate::error::ViewerError;
use crate::event::{BlockEvent, TxSummary};

/// A named address to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub name: String,
    pub address: Address,
}

impl WatchEntry {
    /// Validate `address` as a 20-byte hex address.
    pub fn parse(name: impl Into<String>, address: &str) -> Result<Self, ViewerError> {
        let name = name.into();
        match Address::from_str(address.trim()) {
            Ok(address) => Ok(Self { name, address }),
            Err(_) => Err(ViewerError::InvalidAddress {
                name,
                address: address.to_string(),
            }),
        }
    }
}

/// A transaction that touched a watched address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    /// Name of the watch entry that matched.
    pub name: String,
    pub tx: TxSummary,
}

/// Watch list plus the activity it has matched, pruned to a block horizon.
#[derive(Debug, Clone, Default)]
pub struct ActivityTracker {
    watch_list: Vec<WatchEntry>,
    activity: Vec<Activity>,
}

impl ActivityTracker {
    pub fn new(watch_list: Vec<WatchEntry>) -> Self {
        Self {
            watch_list,
            activity: Vec::new(),
        }
    }

    /// Replace the watch list. Already-matched activity is kept.
    pub fn set_watch_list(&mut self, watch_list: Vec<WatchEntry>) {
        self.watch_list = watch_list;
    }

    pub fn watch_list(&self) -> &[WatchEntry] {
        &self.watch_list
    }

    /// Match every transaction against every watched address.
    ///
    /// Each (transaction, entry, side) hit appends its own activity entry;
    /// nothing is deduplicated. Returns the number of entries appended.
    pub fn on_block(&mut self, block: &BlockEvent) -> usize {
        if self.watch_list.is_empty() {
            return 0;
        }
        let before = self.activity.len();
        for tx in &block.transactions {
            let from = parse_address(&tx.from);
            let to = parse_address(&tx.to);
            for entry in &self.watch_list {
                let hit = Some(entry.address);
                if from == hit {
                    Self::push(&mut self.activity, entry, tx);
                }
                if to == hit {
                    Self::push(&mut self.activity, entry, tx);
                }
            }
        }
        self.activity.len() - before
    }

    /// Keep only activity whose block is newer than `current_block - window`.
    pub fn prune(&mut self, current_block: u64, window: usize) {
        let window = window as u64;
        self.activity
            .retain(|a| a.tx.block_number.saturating_add(window) > current_block);
    }

    pub fn activity(&self) -> &[Activity] {
        &self.activity
    }

    fn push(activity: &mut Vec<Activity>, entry: &WatchEntry, tx: &TxSummary) {
        tracing::debug!(name = %entry.name, tx = %tx.hash, "watched address active");
        activity.push(Activity {
            name: entry.name.clone(),
            tx: tx.clone(),
        });
    }
}

/// Canonical-case comparison key; `None` for empty or malformed fields.
fn parse_address(s: &str) -> Option<Address> {
    Address::from_str(s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0xB45A1378e9BBa0eA4ca6435544B62fd23806CD0D";
    const BOB: &str = "0x9b2A5DdE036c4798A8C68B92ef3fA1cca1F8C3Aa";
    const CAROL: &str = "0x00000000000000000000000000000000000000c0";

    fn tx(block: u64, from: &str, to: &str) -> TxSummary {
        TxSummary {
            from: from.into(),
            to: to.into(),
            gas: "0x5208".into(),
            hash: format!("0x{block:x}"),
            value_wei: "1".into(),
            block_number: block,
        }
    }

    fn block(number: u64, txs: Vec<TxSummary>) -> BlockEvent {
        let mut b = BlockEvent::empty(number, number as i64 * 12);
        b.transactions = txs;
        b
    }

    fn tracker() -> ActivityTracker {
        ActivityTracker::new(vec![
            WatchEntry::parse("alice", ALICE).unwrap(),
            WatchEntry::parse("bob", BOB).unwrap(),
        ])
    }

    #[test]
    fn matches_case_insensitively() {
        let mut t = tracker();
        let added = t.on_block(&block(1, vec![tx(1, &ALICE.to_lowercase(), CAROL)]));
        assert_eq!(added, 1);
        assert_eq!(t.activity()[0].name, "alice");
    }

    #[test]
    fn two_watched_addresses_give_two_entries() {
        let mut t = tracker();
        t.on_block(&block(1, vec![tx(1, ALICE, BOB)]));
        let names: Vec<_> = t.activity().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn self_transfer_counts_twice() {
        let mut t = tracker();
        assert_eq!(t.on_block(&block(1, vec![tx(1, BOB, BOB)])), 2);
    }

    #[test]
    fn activity_accumulates_across_blocks() {
        let mut t = tracker();
        assert_eq!(t.on_block(&block(1, vec![tx(1, ALICE, BOB), tx(1, CAROL, ALICE)])), 3);
        assert_eq!(t.on_block(&block(2, vec![tx(2, BOB, CAROL)])), 1);
        let hits: Vec<_> = t
            .activity()
            .iter()
            .map(|a| (a.name.as_str(), a.tx.block_number))
            .collect();
        assert_eq!(hits, vec![("alice", 1), ("bob", 1), ("alice", 1), ("bob", 2)]);
    }

    #[test]
    fn contract_creation_has_no_receiver() {
        let mut t = tracker();
        assert_eq!(t.on_block(&block(1, vec![tx(1, CAROL, "")])), 0);
    }

    #[test]
    fn prune_keeps_only_recent() {
        let mut t = tracker();
        for n in 95..=105 {
            t.on_block(&block(n, vec![tx(n, ALICE, CAROL)]));
        }
        t.prune(105, 3);
        let blocks: Vec<u64> = t.activity().iter().map(|a| a.tx.block_number).collect();
        assert_eq!(blocks, vec![103, 104, 105]);
        assert!(blocks.iter().all(|&b| b as i64 > 105 - 3));
    }

    #[test]
    fn prune_near_genesis() {
        let mut t = tracker();
        t.on_block(&block(0, vec![tx(0, ALICE, CAROL)]));
        t.on_block(&block(2, vec![tx(2, ALICE, CAROL)]));
        t.prune(2, 10);
        assert_eq!(t.activity().len(), 2);
    }

    #[test]
    fn invalid_address_rejected() {
        let err = WatchEntry::parse("x", "0x1234").unwrap_err();
        assert!(matches!(err, ViewerError::InvalidAddress { .. }));
    }
}
