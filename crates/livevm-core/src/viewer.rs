//! Per-viewer state.
//!
//! A viewer watches one chain at a time but keeps its settings (window size,
//! watch list) for every chain it has visited. Nothing here is shared with
//! other viewers, so no synchronisation is needed.

use std::collections::HashMap;

use alloy_primitives::U512;

use crate::activity::{Activity, ActivityTracker, WatchEntry};
use crate::error::ViewerError;
use crate::event::{BlockEvent, ErrorEvent, SubscriberId, ViewerEvent};
use crate::window::SlidingWindow;

/// Connection health as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    /// Joined, no block yet.
    Waiting,
    /// Receiving blocks; `latency_secs` is local time minus block time.
    Ok { latency_secs: i64 },
    /// A non-fatal error arrived; blocks keep flowing.
    Degraded { message: String },
    /// The session dropped this viewer; it must rejoin.
    Failed { message: String },
}

impl Health {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Header figures of the newest block a viewer has seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastBlock {
    pub number: u64,
    pub timestamp: i64,
    pub tx_count: usize,
    pub total_value_wei: U512,
    pub tx_hashes: Vec<String>,
}

/// State kept per (viewer, chain).
#[derive(Debug, Clone)]
pub struct ChainView {
    pub window: SlidingWindow,
    pub tracker: ActivityTracker,
    pub health: Health,
    pub last_block: Option<LastBlock>,
}

impl ChainView {
    fn new(window_size: usize) -> Self {
        Self {
            window: SlidingWindow::new(window_size),
            tracker: ActivityTracker::default(),
            health: Health::Waiting,
            last_block: None,
        }
    }

    fn on_block(&mut self, block: &BlockEvent, now: i64) {
        if !self.window.record(block) {
            tracing::debug!(block = block.block_number, "ignoring non-advancing block");
            return;
        }
        self.tracker.on_block(block);
        self.tracker.prune(block.block_number, self.window.capacity());
        self.health = Health::Ok {
            latency_secs: now - block.timestamp,
        };
        self.last_block = Some(LastBlock {
            number: block.block_number,
            timestamp: block.timestamp,
            tx_count: block.tx_count(),
            total_value_wei: block.total_value_wei,
            tx_hashes: block.transactions.iter().map(|t| t.hash.clone()).collect(),
        });
    }

    fn on_error(&mut self, error: &ErrorEvent) {
        let message = error.message.clone();
        self.health = if error.fatal {
            Health::Failed { message }
        } else {
            Health::Degraded { message }
        };
    }
}

/// What a rendering collaborator needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerSnapshot {
    pub chain_id: String,
    pub last_block: Option<LastBlock>,
    pub tps: f64,
    pub average_block_time: f64,
    pub window_size: usize,
    pub watched: usize,
    pub activity: Vec<Activity>,
    pub health: Health,
}

/// One viewer's state across every chain it has visited.
#[derive(Debug)]
pub struct Viewer {
    id: SubscriberId,
    default_window: usize,
    current: Option<String>,
    views: HashMap<String, ChainView>,
}

impl Viewer {
    pub fn new(id: SubscriberId, default_window: usize) -> Self {
        Self {
            id,
            default_window: default_window.max(1),
            current: None,
            views: HashMap::new(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The chain currently being watched.
    pub fn current_chain(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Start watching `chain_id`. The chain's window is cleared; its window
    /// size and watch list are kept from any previous visit.
    pub fn select_chain(&mut self, chain_id: &str, window_size: Option<usize>) {
        let default_window = self.default_window;
        let view = self
            .views
            .entry(chain_id.to_string())
            .or_insert_with(|| ChainView::new(default_window));
        if let Some(n) = window_size {
            view.window.set_capacity(n);
        }
        view.window.clear();
        view.health = Health::Waiting;
        view.last_block = None;
        self.current = Some(chain_id.to_string());
    }

    /// Stop watching; returns the chain that was being watched.
    pub fn leave(&mut self) -> Option<String> {
        self.current.take()
    }

    /// Replace the watch list for `chain_id`. All entries are validated
    /// first; on error nothing changes.
    pub fn update_watch_list<I, N, A>(
        &mut self,
        chain_id: &str,
        entries: I,
    ) -> Result<(), ViewerError>
    where
        I: IntoIterator<Item = (N, A)>,
        N: Into<String>,
        A: AsRef<str>,
    {
        let parsed = entries
            .into_iter()
            .map(|(name, address)| WatchEntry::parse(name, address.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.view_mut(chain_id).tracker.set_watch_list(parsed);
        Ok(())
    }

    /// Change the analytics window for `chain_id`.
    pub fn update_window_size(&mut self, chain_id: &str, n: usize) -> Result<(), ViewerError> {
        if n == 0 {
            return Err(ViewerError::ZeroWindow);
        }
        self.view_mut(chain_id).window.set_capacity(n);
        Ok(())
    }

    /// Fold one event from the current chain into local state.
    pub fn apply(&mut self, event: &ViewerEvent, now: i64) {
        let Some(chain_id) = self.current.clone() else {
            return;
        };
        let view = self.view_mut(&chain_id);
        match event {
            ViewerEvent::Block(block) => view.on_block(block, now),
            ViewerEvent::Error(error) => view.on_error(error),
        }
    }

    pub fn view(&self, chain_id: &str) -> Option<&ChainView> {
        self.views.get(chain_id)
    }

    /// Figures for the chain currently being watched.
    pub fn snapshot(&self) -> Option<ViewerSnapshot> {
        let chain_id = self.current.as_ref()?;
        let view = self.views.get(chain_id)?;
        Some(ViewerSnapshot {
            chain_id: chain_id.clone(),
            last_block: view.last_block.clone(),
            tps: view.window.tps(),
            average_block_time: view.window.average_block_time(),
            window_size: view.window.capacity(),
            watched: view.tracker.watch_list().len(),
            activity: view.tracker.activity().to_vec(),
            health: view.health.clone(),
        })
    }

    fn view_mut(&mut self, chain_id: &str) -> &mut ChainView {
        let default_window = self.default_window;
        self.views
            .entry(chain_id.to_string())
            .or_insert_with(|| ChainView::new(default_window))
    }
}
