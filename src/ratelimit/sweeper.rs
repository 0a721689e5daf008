//! Background eviction of expired windows.
//!
//! An entry is evicted when its block has run out, or when it is unblocked
//! and its window has been stale for more than twice the category's window.
//! Candidates are collected in a read-only scan that locks one shard at a
//! time. They are then removed one key at a time, with the eviction rule
//! re-checked under that key's lock, so a request racing with the sweep
//! either sees its entry intact or starts a fresh one.

use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, trace, warn};

use super::actor::WindowKey;
use super::category::{CategoryPolicy, LimitConfig};
use super::limiter::RateLimiter;
use super::store::WindowStore;
use super::window::WindowEntry;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Why an entry is evictable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eviction {
    ExpiredBlock,
    StaleWindow,
}

fn eviction_for(entry: &WindowEntry, limit: &LimitConfig, now_ms: u64) -> Option<Eviction> {
    match entry.blocked_until_ms {
        Some(until) if until <= now_ms => Some(Eviction::ExpiredBlock),
        Some(_) => None,
        None if entry.window_expired(now_ms, 2 * limit.window_ms()) => Some(Eviction::StaleWindow),
        None => None,
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub expired_blocks: usize,
    pub stale_windows: usize,
    /// Entries left after the sweep
    pub remaining: usize,
    pub swept_at_ms: u64,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.expired_blocks + self.stale_windows
    }
}

pub(crate) fn sweep_store(store: &WindowStore, policy: &CategoryPolicy, now_ms: u64) -> SweepReport {
    let mut candidates: Vec<(WindowKey, Eviction)> = Vec::new();
    store.for_each(|key, entry| {
        if let Some(reason) = eviction_for(entry, policy.get(key.category), now_ms) {
            candidates.push((key.clone(), reason));
        }
    });

    let mut report = SweepReport {
        swept_at_ms: now_ms,
        ..SweepReport::default()
    };

    for (key, reason) in candidates {
        let limit = policy.get(key.category);
        if store.remove_if(&key, |entry| eviction_for(entry, limit, now_ms).is_some()) {
            match reason {
                Eviction::ExpiredBlock => report.expired_blocks += 1,
                Eviction::StaleWindow => report.stale_windows += 1,
            }
        }
    }

    report.remaining = store.len();
    report
}

/// Periodic sweeper task.
pub struct Sweeper;

impl Sweeper {
    /// Spawn a task that sweeps `limiter` every `interval`.
    ///
    /// The first sweep runs one interval after spawning.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(interval_ms = interval.as_millis() as u64, "Starting window sweeper");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => run_tick(&limiter),
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Window sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

fn run_tick(limiter: &RateLimiter) {
    match std::panic::catch_unwind(AssertUnwindSafe(|| limiter.sweep(limiter.now_ms()))) {
        Ok(report) if report.removed() > 0 => {
            info!(
                expired_blocks = report.expired_blocks,
                stale_windows = report.stale_windows,
                remaining = report.remaining,
                "Swept rate limit windows"
            );
        }
        Ok(report) => {
            trace!(remaining = report.remaining, "Sweep found nothing to evict");
        }
        Err(_) => {
            error!("Window sweep panicked; retrying on next tick");
        }
    }
}

/// Handle to a running [`Sweeper`].
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Window sweeper ended abnormally");
        }
    }
}
