//! Core rate limiter implementation.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audit::{AuditDispatcher, Violation};
use crate::clock::{Clock, SystemClock};

use super::actor::{ActorKey, RequestInfo, WindowKey};
use super::category::{Category, CategoryPolicy, LimitConfig};
use super::stats::StatsSnapshot;
use super::store::WindowStore;
use super::sweeper::{sweep_store, SweepReport};
use super::window::WindowEntry;

/// The result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Admitted; `remaining` requests are left until `reset_at_ms`.
    Allowed { remaining: u64, reset_at_ms: u64 },
    /// Rejected because an earlier violation is still being penalised.
    Blocked { retry_after_ms: u64 },
    /// Rejected because this request exceeded the quota; a block now applies.
    RateLimited { retry_after_ms: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Admission metadata for the HTTP layer.
///
/// This mirrors the [`Decision`] in the units clients see: whole seconds and
/// epoch timestamps. The limiter does not format headers itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub category: Category,
    pub decision: Decision,
    /// The category's `max_requests`
    pub limit: u64,
    /// Requests left in the window, zero when rejected
    pub remaining: u64,
    /// When the window (or block) ends
    pub reset_at_epoch_secs: u64,
    /// Present only on rejection
    pub retry_after_secs: Option<u64>,
    pub rejected: bool,
    /// Human-readable rejection reason
    pub message: Option<String>,
}

impl RateLimitOutcome {
    fn from_decision(category: Category, limit: &LimitConfig, decision: Decision, now_ms: u64) -> Self {
        match decision {
            Decision::Allowed {
                remaining,
                reset_at_ms,
            } => Self {
                category,
                decision,
                limit: limit.max_requests,
                remaining,
                reset_at_epoch_secs: ceil_secs(reset_at_ms),
                retry_after_secs: None,
                rejected: false,
                message: None,
            },
            Decision::Blocked { retry_after_ms } | Decision::RateLimited { retry_after_ms } => {
                let retry_after_secs = ceil_secs(retry_after_ms);
                let message = if matches!(decision, Decision::RateLimited { .. }) {
                    format!(
                        "Too many {}. You have been blocked for {}.",
                        limit.description,
                        describe_secs(retry_after_secs)
                    )
                } else {
                    format!(
                        "Too many {}. Please try again in {}.",
                        limit.description,
                        describe_secs(retry_after_secs)
                    )
                };

                Self {
                    category,
                    decision,
                    limit: limit.max_requests,
                    remaining: 0,
                    reset_at_epoch_secs: ceil_secs(now_ms + retry_after_ms),
                    retry_after_secs: Some(retry_after_secs),
                    rejected: true,
                    message: Some(message),
                }
            }
        }
    }
}

fn ceil_secs(ms: u64) -> u64 {
    ms.div_ceil(1000)
}

fn describe_secs(secs: u64) -> String {
    match secs {
        1 => "1 second".to_string(),
        s if s < 60 => format!("{} seconds", s),
        s => match s.div_ceil(60) {
            1 => "1 minute".to_string(),
            m => format!("{} minutes", m),
        },
    }
}

/// The per-category fixed-window limiter.
///
/// Owns the window store and is shared across request handlers and the
/// background sweeper behind an `Arc`. State is local to this process: with
/// several instances each enforces its quota independently.
pub struct RateLimiter {
    store: WindowStore,
    policy: CategoryPolicy,
    clock: Arc<dyn Clock>,
    audit: Option<AuditDispatcher>,
    enabled: bool,
    last_sweep: RwLock<Option<SweepReport>>,
}

impl RateLimiter {
    /// Create a limiter with the reference policy and the system clock.
    pub fn new() -> Self {
        Self::with_policy(CategoryPolicy::reference())
    }

    /// Create a limiter with a custom policy.
    pub fn with_policy(policy: CategoryPolicy) -> Self {
        Self {
            store: WindowStore::new(),
            policy,
            clock: Arc::new(SystemClock),
            audit: None,
            enabled: true,
            last_sweep: RwLock::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: AuditDispatcher) -> Self {
        self.audit = Some(audit);
        self
    }

    /// A disabled limiter admits everything and reports full quota.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn policy(&self) -> &CategoryPolicy {
        &self.policy
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Decide whether `actor` may make one more request in `category`.
    ///
    /// The read-check-increment-write runs under the key's lock, so
    /// concurrent requests from the same actor are linearized.
    ///
    /// Once a block has run out the next request starts a fresh window, even
    /// when the category's window would otherwise still be running. Long
    /// windows such as `sensitive` (one hour, with a 15 minute block) are
    /// therefore not carried across a block.
    pub fn admit(&self, category: Category, actor: &ActorKey, now_ms: u64) -> Decision {
        self.admit_counted(category, actor, now_ms).0
    }

    /// Like [`admit`](Self::admit), also returning the window count.
    fn admit_counted(&self, category: Category, actor: &ActorKey, now_ms: u64) -> (Decision, u64) {
        let limit = self.policy.get(category);
        let window_ms = limit.window_ms();
        let block_ms = limit.block_ms();
        let key = WindowKey::new(category, actor.clone());

        self.store.update(key, || WindowEntry::new(now_ms), |entry| {
            if let Some(retry_after_ms) = entry.block_remaining(now_ms) {
                return (Decision::Blocked { retry_after_ms }, entry.count);
            }

            // A finished block is treated like an absent entry, whether or not
            // the sweeper has got to it yet.
            if entry.block_elapsed(now_ms) || entry.window_expired(now_ms, window_ms) {
                *entry = WindowEntry::new(now_ms);
            }

            entry.count += 1;

            if entry.count > limit.max_requests {
                entry.blocked_until_ms = Some(now_ms + block_ms);
                return (
                    Decision::RateLimited {
                        retry_after_ms: block_ms,
                    },
                    entry.count,
                );
            }

            (
                Decision::Allowed {
                    remaining: limit.max_requests - entry.count,
                    reset_at_ms: entry.window_end_ms(window_ms),
                },
                entry.count,
            )
        })
    }

    /// Run the full admission flow for an inbound request.
    ///
    /// Classifies the request unless `category` is given, resolves the actor,
    /// admits against the current clock, and queues audit records when the
    /// request trips the quota. Audit delivery is never awaited here.
    pub fn check(&self, request: &RequestInfo, category: Option<Category>) -> RateLimitOutcome {
        let category = category.unwrap_or_else(|| Category::classify(&request.path, &request.method));
        let limit = self.policy.get(category);
        let now_ms = self.clock.now_ms();

        if !self.enabled {
            let decision = Decision::Allowed {
                remaining: limit.max_requests,
                reset_at_ms: now_ms + limit.window_ms(),
            };
            return RateLimitOutcome::from_decision(category, limit, decision, now_ms);
        }

        let actor = request.actor_key();
        let (decision, count) = self.admit_counted(category, &actor, now_ms);

        match decision {
            Decision::Allowed { remaining, .. } => {
                debug!(
                    category = %category,
                    actor = %actor,
                    remaining = remaining,
                    "Request admitted"
                );
            }
            Decision::Blocked { retry_after_ms } => {
                debug!(
                    category = %category,
                    actor = %actor,
                    retry_after_ms = retry_after_ms,
                    "Request from blocked actor rejected"
                );
            }
            Decision::RateLimited { retry_after_ms } => {
                warn!(
                    category = %category,
                    actor = %actor,
                    path = %request.path,
                    method = %request.method,
                    count = count,
                    limit = limit.max_requests,
                    block_ms = retry_after_ms,
                    "Rate limit exceeded, actor blocked"
                );

                if let Some(audit) = &self.audit {
                    audit.dispatch(Violation {
                        category,
                        actor: actor.clone(),
                        request: request.clone(),
                        count,
                        max_requests: limit.max_requests,
                        block_ms: retry_after_ms,
                        at_ms: now_ms,
                    });
                }
            }
        }

        RateLimitOutcome::from_decision(category, limit, decision, now_ms)
    }

    /// Evict expired blocks and long-stale windows as of `now_ms`.
    pub fn sweep(&self, now_ms: u64) -> SweepReport {
        let report = sweep_store(&self.store, &self.policy, now_ms);
        *self.last_sweep.write() = Some(report);
        report
    }

    /// Aggregate counts over the current store.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats_at(self.clock.now_ms())
    }

    pub fn stats_at(&self, now_ms: u64) -> StatsSnapshot {
        StatsSnapshot::collect(&self.store, now_ms, *self.last_sweep.read())
    }

    /// Inspect the window for a (category, actor) pair.
    pub fn window(&self, category: Category, actor: &ActorKey) -> Option<WindowEntry> {
        self.store.get(&WindowKey::new(category, actor.clone()))
    }

    /// Get the number of tracked windows.
    pub fn window_count(&self) -> usize {
        self.store.len()
    }

    /// Clear all windows.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("windows", &self.store.len())
            .field("enabled", &self.enabled)
            .field("audit", &self.audit.is_some())
            .finish()
    }
}
