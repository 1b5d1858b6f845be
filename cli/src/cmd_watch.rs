//! `livevm watch`: join one chain and print every block until Ctrl-C.

use std::sync::Arc;

use alloy_primitives::U512;
use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};

use livevm_core::{
    EventSink, Health, LivevmConfig, SubscriberId, Viewer, ViewerEvent, ViewerSnapshot,
};
use livevm_session::ChainSessionManager;
use livevm_ws::{WsConfig, WsConnector};

pub async fn run(
    config: &LivevmConfig,
    chain_id: &str,
    window: Option<usize>,
    track: &[String],
) -> Result<()> {
    let registry = config.registry()?;
    let chain = registry
        .get(chain_id)
        .cloned()
        .ok_or_else(|| anyhow!("unknown chain '{chain_id}' (see `livevm chains`)"))?;
    if window == Some(0) {
        bail!("--window must be at least 1");
    }

    let watch_list = track
        .iter()
        .map(|entry| parse_track(entry))
        .collect::<Result<Vec<_>>>()?;

    let mut viewer = Viewer::new(SubscriberId::new(), config.window_size);
    viewer.select_chain(&chain.id, window);
    viewer
        .update_watch_list(&chain.id, watch_list)
        .context("invalid --track entry")?;

    let connector = Arc::new(WsConnector::new(WsConfig::default()));
    let manager = ChainSessionManager::new(registry, connector);
    let (sink, mut events) = EventSink::channel(config.sink_capacity);

    println!("Watching {chain} via {}", chain.endpoint);
    manager
        .join(&chain.id, viewer.id(), sink)
        .await
        .with_context(|| format!("joining {chain}"))?;
    info!(
        chain = %chain.id,
        viewer = %viewer.id(),
        window = ?viewer.snapshot().map(|s| s.window_size),
        "joined"
    );

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nLeaving {chain}");
                break Ok(());
            }
            event = events.recv() => {
                let Some(event) = event else {
                    break Err(anyhow!("event stream ended"));
                };
                viewer.apply(&event, chrono::Utc::now().timestamp());
                let Some(snapshot) = viewer.snapshot() else { continue };
                match &event {
                    ViewerEvent::Block(_) => print_block(&snapshot, &chain.currency_symbol),
                    ViewerEvent::Error(e) => eprintln!("  ! {e}"),
                }
                if let Health::Failed { message } = snapshot.health {
                    warn!(chain = %chain.id, %message, "dropped by chain session");
                    break Err(anyhow!("{chain}: {message}"));
                }
            }
        }
    };

    let was_joined = manager.leave(&chain.id, viewer.id()).await?;
    viewer.leave();
    info!(chain = %chain.id, viewer = %viewer.id(), was_joined, "left");
    manager.shutdown().await;
    result
}

/// Parse `name=0xaddress`.
fn parse_track(entry: &str) -> Result<(String, String)> {
    let (name, address) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=ADDRESS, got '{entry}'"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("empty name in '{entry}'");
    }
    Ok((name.to_string(), address.trim().to_string()))
}

fn print_block(snapshot: &ViewerSnapshot, symbol: &str) {
    let Some(block) = &snapshot.last_block else { return };
    let latency = match &snapshot.health {
        Health::Ok { latency_secs } => format!("{latency_secs}s"),
        _ => "-".into(),
    };
    println!(
        "#{:<10} txs {:>4}  value {:>14} {symbol}  tps {:>7.2}  block time {:>5.2}s  latency {latency}",
        block.number,
        block.tx_count,
        format_ether(block.total_value_wei),
        snapshot.tps,
        snapshot.average_block_time,
    );
    for activity in &snapshot.activity {
        if activity.tx.block_number == block.number {
            let to = if activity.tx.to.is_empty() {
                "(create)"
            } else {
                activity.tx.to.as_str()
            };
            println!(
                "    {} {} -> {} {} wei  {}",
                activity.name, activity.tx.from, to, activity.tx.value_wei, activity.tx.hash
            );
        }
    }
}

/// Render wei as ether with four decimals, truncating.
fn format_ether(wei: U512) -> String {
    let unit = U512::from(1_000_000_000_000_000_000u64);
    let (whole, rem) = wei.div_rem(unit);
    let frac = rem / U512::from(100_000_000_000_000u64);
    format!("{whole}.{:04}", frac.to::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_entries() {
        let (name, addr) = parse_track("vitalik = 0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045").unwrap();
        assert_eq!(name, "vitalik");
        assert_eq!(addr, "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
        assert!(parse_track("no-separator").is_err());
        assert!(parse_track("=0xabc").is_err());
    }

    #[test]
    fn ether_formatting() {
        assert_eq!(format_ether(U512::ZERO), "0.0000");
        assert_eq!(format_ether(U512::from(1_500_000_000_000_000_000u64)), "1.5000");
        assert_eq!(format_ether(U512::from(123_456_789_000_000u64)), "0.0001");
    }
}
