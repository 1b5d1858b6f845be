//! livevm-session: one upstream subscription per chain, shared by every viewer.
//!
//! # Architecture
//! ```text
//! join ──► ChainSession (Idle → Connecting → Active)
//!              │  dial, bootstrap block, eth_subscribe("newHeads")
//!              ▼
//!          ingestion loop (one task per active chain)
//!              │  newHead → fetch_block → broadcast
//!              ▼
//!          EventSink per subscriber (non-blocking)
//! ```
//!
//! The upstream connection opens on the first join and closes when the
//! last subscriber leaves.

pub mod error;
pub mod fetcher;
pub mod manager;

pub use error::SessionError;
pub use fetcher::{fetch_block, FetchedBlock};
pub use manager::{ChainSessionManager, SessionState};
