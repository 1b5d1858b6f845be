//! Routing of `eth_subscription` notifications to their receivers.
//!
//! Owned by the connection task; entries are added when the
//! `eth_subscribe` response is processed, so a notification can never
//! arrive for a subscription the task does not know yet.

use std::collections::HashMap;

use livevm_core::rpc::{NewHead, SubscriptionFault, SubscriptionId};
use tokio::sync::mpsc;

/// Channels of a single subscription.
struct SubscriptionEntry {
    heads: mpsc::UnboundedSender<NewHead>,
    faults: mpsc::UnboundedSender<SubscriptionFault>,
}

/// Active subscriptions of one connection.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<SubscriptionId, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: SubscriptionId,
        heads: mpsc::UnboundedSender<NewHead>,
        faults: mpsc::UnboundedSender<SubscriptionFault>,
    ) {
        self.entries.insert(id, SubscriptionEntry { heads, faults });
    }

    /// Forward a head to its subscription. Returns `false` if unknown.
    pub fn dispatch(&self, id: &SubscriptionId, head: NewHead) -> bool {
        match self.entries.get(id) {
            Some(entry) => {
                let _ = entry.heads.send(head);
                true
            }
            None => false,
        }
    }

    /// Remove a subscription and signal `Closed` on its fault stream.
    pub fn close(&mut self, id: &SubscriptionId) {
        if let Some(entry) = self.entries.remove(id) {
            let _ = entry.faults.send(SubscriptionFault::Closed);
        }
    }

    pub fn close_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            let _ = entry.faults.send(SubscriptionFault::Closed);
        }
    }

    /// The socket broke: report `reason` to every subscription.
    pub fn fault_all(&mut self, reason: &str) {
        for (_, entry) in self.entries.drain() {
            let _ = entry.faults.send(SubscriptionFault::Fault(reason.to_string()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
