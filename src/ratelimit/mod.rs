//! Rate limiting logic and state management.

mod actor;
mod category;
mod limiter;
mod stats;
mod store;
mod sweeper;
mod window;

pub use actor::{ActorKey, AuthenticatedActor, RequestInfo, WindowKey};
pub use category::{Category, CategoryPolicy, LimitConfig, UnknownCategory, DEFAULT_BLOCK};
pub use limiter::{Decision, RateLimitOutcome, RateLimiter};
pub use stats::StatsSnapshot;
pub use store::WindowStore;
pub use sweeper::{SweepReport, Sweeper, SweeperHandle, DEFAULT_SWEEP_INTERVAL};
pub use window::WindowEntry;
