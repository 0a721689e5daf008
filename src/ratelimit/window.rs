//! Fixed-window counter state.

/// The counting state for one (category, actor) pair.
///
/// This is a fixed window: the count resets hard when the window ends, so an
/// actor can land up to twice the nominal quota across a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// Requests observed in the current window
    pub count: u64,
    /// When the current window started (epoch ms)
    pub window_start_ms: u64,
    /// End of an active penalty block (epoch ms)
    pub blocked_until_ms: Option<u64>,
}

impl WindowEntry {
    /// Start a fresh, empty window at `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            count: 0,
            window_start_ms: now_ms,
            blocked_until_ms: None,
        }
    }

    /// Remaining block time if the actor is currently blocked.
    pub fn block_remaining(&self, now_ms: u64) -> Option<u64> {
        self.blocked_until_ms
            .filter(|&until| until > now_ms)
            .map(|until| until - now_ms)
    }

    /// Whether a block was set and has since run out.
    pub fn block_elapsed(&self, now_ms: u64) -> bool {
        matches!(self.blocked_until_ms, Some(until) if until <= now_ms)
    }

    /// Whether the window has run past `window_ms`.
    pub fn window_expired(&self, now_ms: u64, window_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) > window_ms
    }

    /// When the current window ends (epoch ms).
    pub fn window_end_ms(&self, window_ms: u64) -> u64 {
        self.window_start_ms + window_ms
    }
}
