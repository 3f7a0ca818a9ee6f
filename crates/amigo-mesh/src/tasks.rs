//! Periodic task wiring.
//!
//! Each pass runs on its own interval timer, acquires the shared lock
//! for the duration of one tick, logs failures, and keeps going. All
//! passes are idempotent and restart-safe; none of them assumes the
//! previous tick completed.

use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::core::{Core, CoreState};
use crate::gossip::DueSync;
use crate::{outbox, retention, time};

/// Cadence of the initial-sync poller. Initial syncs are due at
/// sub-interval offsets (5s / 5.5s after a connection), so they get a
/// faster clock than the maintenance pass.
const INITIAL_SYNC_POLL_MS: u64 = 1000;

/// Cadence of the stale-peer cleanup.
const STALE_PEER_CLEANUP_SECS: u64 = 60;

/// Spawn every periodic task. The returned handles live as long as the
/// process; aborting them is the shutdown path.
pub fn spawn_periodic_tasks(core: Core, dedup_snapshot_path: Option<PathBuf>) -> Vec<JoinHandle<()>> {
    let config = core.config().clone();
    let mut handles = Vec::new();

    // Application outbox retry.
    {
        let core = core.clone();
        let interval = Duration::from_secs(config.ble.outgoing_message_retry_interval_seconds);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let config = core.config().clone();
                let radio = core.radio().clone();
                let mut guard = core.state().lock().await;
                let CoreState { conn, member, .. } = &mut *guard;
                if let Err(e) = outbox::retry_outgoing_messages(
                    conn,
                    member,
                    radio.as_ref(),
                    &config,
                    time::now_ms(),
                )
                .await
                {
                    tracing::warn!(error = %e, "outbox retry pass failed");
                }
            }
        }));
    }

    // Control outbox retry.
    {
        let core = core.clone();
        let interval = Duration::from_secs(
            config
                .ble
                .amigo_message_retry_interval_seconds
                .unwrap_or(config.ble.outgoing_message_retry_interval_seconds),
        );
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let config = core.config().clone();
                let radio = core.radio().clone();
                let guard = core.state().lock().await;
                if let Err(e) = outbox::retry_control_messages(
                    &guard.conn,
                    radio.as_ref(),
                    &config,
                    time::now_ms(),
                )
                .await
                {
                    tracing::warn!(error = %e, "control retry pass failed");
                }
            }
        }));
    }

    // Delivery-ack retry.
    {
        let core = core.clone();
        let interval = Duration::from_secs(config.ble.ack_retry_interval_seconds);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let config = core.config().clone();
                let radio = core.radio().clone();
                let guard = core.state().lock().await;
                if let Err(e) = outbox::retry_delivery_acks(
                    &guard.conn,
                    radio.as_ref(),
                    &config,
                    time::now_ms(),
                )
                .await
                {
                    tracing::warn!(error = %e, "ack retry pass failed");
                }
            }
        }));
    }

    // Gossip maintenance: eviction plus the scheduled sync requests.
    {
        let core = core.clone();
        let interval = Duration::from_secs(config.gossip.maintenance_interval_seconds);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let gossip_config = core.config().gossip.clone();
                let due: Vec<DueSync> = {
                    let mut guard = core.state().lock().await;
                    guard.gossip.maintenance(time::now_ms(), &gossip_config)
                };
                for sync in due {
                    if let Err(e) = core.send_sync_request(sync.kinds).await {
                        tracing::warn!(error = %e, "scheduled sync request failed");
                    }
                }
            }
        }));
    }

    // Initial syncs for fresh connections.
    {
        let core = core.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(INITIAL_SYNC_POLL_MS));
            loop {
                ticker.tick().await;
                let due: Vec<DueSync> = {
                    let mut guard = core.state().lock().await;
                    guard.gossip.due_initial_syncs(time::now_ms())
                };
                for sync in due {
                    if let Err(e) = core.send_sync_request(sync.kinds).await {
                        tracing::warn!(error = %e, "initial sync request failed");
                    }
                }
            }
        }));
    }

    // Stale-peer cleanup.
    {
        let core = core.clone();
        let timeout_ms = config.stale_peer_timeout_ms();
        handles.push(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(STALE_PEER_CLEANUP_SECS));
            loop {
                ticker.tick().await;
                let mut guard = core.state().lock().await;
                let removed = guard.gossip.stale_peer_cleanup(time::now_ms(), timeout_ms);
                if removed > 0 {
                    tracing::debug!(removed, "stale peers purged");
                }
            }
        }));
    }

    // Retention GC.
    {
        let core = core.clone();
        let interval = Duration::from_secs(config.retention.gc_interval_seconds);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let config = core.config().clone();
                let mut guard = core.state().lock().await;
                let CoreState { conn, dedup, .. } = &mut *guard;
                if let Err(e) = retention::run_gc(conn, dedup, &config, time::now_ms()) {
                    tracing::warn!(error = %e, "retention pass failed");
                }
            }
        }));
    }

    // Dedup snapshot save.
    if let Some(path) = dedup_snapshot_path {
        let core = core.clone();
        let interval = Duration::from_secs(config.dedup.save_interval_seconds);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot = {
                    let guard = core.state().lock().await;
                    guard.dedup.snapshot()
                };
                match snapshot {
                    Ok(json) => {
                        if let Err(e) = tokio::fs::write(&path, json).await {
                            tracing::warn!(error = %e, "dedup snapshot write failed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "dedup snapshot failed"),
                }
            }
        }));
    }

    // Dedup prune.
    {
        let core = core.clone();
        let interval = Duration::from_secs(config.dedup.prune_interval_seconds);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let mut guard = core.state().lock().await;
                let pruned = guard.dedup.prune_expired(time::now_ms());
                if pruned > 0 {
                    tracing::debug!(pruned, "dedup entries pruned");
                }
            }
        }));
    }

    handles
}
