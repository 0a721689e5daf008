//! Traffic categories, their quota policy, and request classification.
//!
//! Every inbound request falls into exactly one [`Category`]. The category
//! picks the quota from a [`CategoryPolicy`], which is a fixed table indexed
//! by the enum rather than a string lookup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Penalty applied to every category in the reference policy.
pub const DEFAULT_BLOCK: Duration = Duration::from_secs(15 * 60);

/// A traffic class with its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Auth,
    Booking,
    Payment,
    Admin,
    Maps,
    Webhook,
    Sensitive,
    Default,
}

impl Category {
    /// All categories, in classification precedence order.
    pub const ALL: [Category; 8] = [
        Category::Auth,
        Category::Booking,
        Category::Payment,
        Category::Admin,
        Category::Maps,
        Category::Webhook,
        Category::Sensitive,
        Category::Default,
    ];

    /// Lower-case name used in keys, headers and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Auth => "auth",
            Category::Booking => "booking",
            Category::Payment => "payment",
            Category::Admin => "admin",
            Category::Maps => "maps",
            Category::Webhook => "webhook",
            Category::Sensitive => "sensitive",
            Category::Default => "default",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Path fragments that select this category.
    fn path_patterns(&self) -> &'static [&'static str] {
        match self {
            Category::Auth => &[
                "/auth",
                "/login",
                "/logout",
                "/register",
                "/signup",
                "/otp",
                "/refresh-token",
            ],
            Category::Booking => &[
                "/booking",
                "/rides",
                "/trips",
                "/orders",
                "/parcels",
                "/deliveries",
            ],
            Category::Payment => &[
                "/payment",
                "/wallet",
                "/payout",
                "/refund",
                "/checkout",
                "/settlement",
            ],
            Category::Admin => &["/admin"],
            Category::Maps => &[
                "/maps",
                "/geocode",
                "/directions",
                "/places",
                "/distance-matrix",
            ],
            Category::Webhook => &["/webhook"],
            Category::Sensitive => &[
                "/kyc",
                "/documents",
                "/bank-account",
                "/password",
                "/2fa",
                "/account/delete",
            ],
            Category::Default => &[],
        }
    }

    /// Whether a lower-cased path and upper-cased method select this category.
    fn matches(&self, path: &str, method: &str) -> bool {
        if self.path_patterns().iter().any(|p| path.contains(p)) {
            return true;
        }

        // Deleting an account or user record is sensitive whatever the path shape.
        *self == Category::Sensitive
            && method == "DELETE"
            && (path.contains("/users") || path.contains("/account"))
    }

    /// Classify a request by path and method.
    ///
    /// Predicates are evaluated in [`Category::ALL`] order and the first match
    /// wins; a request that matches nothing is [`Category::Default`].
    pub fn classify(path: &str, method: &str) -> Category {
        let path = path.to_ascii_lowercase();
        let method = method.to_ascii_uppercase();

        Category::ALL
            .iter()
            .copied()
            .find(|category| category.matches(&path, &method))
            .unwrap_or(Category::Default)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rate limit category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Quota for a single category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests admitted per window
    pub max_requests: u64,
    /// Length of the fixed counting window
    pub window: Duration,
    /// Penalty applied once the quota is exceeded
    pub block: Duration,
    /// Human-readable description used in rejection messages
    pub description: &'static str,
}

impl LimitConfig {
    /// Create a limit with the default block duration.
    pub const fn new(max_requests: u64, window: Duration, description: &'static str) -> Self {
        Self {
            max_requests,
            window,
            block: DEFAULT_BLOCK,
            description,
        }
    }

    /// Override the block duration.
    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }

    pub fn block_ms(&self) -> u64 {
        self.block.as_millis() as u64
    }
}

/// The per-category quota table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPolicy {
    limits: [LimitConfig; 8],
}

impl CategoryPolicy {
    /// The compiled-in production policy.
    pub fn reference() -> Self {
        const MINUTE: Duration = Duration::from_secs(60);

        Self {
            limits: [
                LimitConfig::new(5, Duration::from_secs(15 * 60), "authentication attempts"),
                LimitConfig::new(30, MINUTE, "booking requests"),
                LimitConfig::new(3, MINUTE, "payment requests"),
                LimitConfig::new(100, MINUTE, "admin requests"),
                LimitConfig::new(60, MINUTE, "map lookups"),
                LimitConfig::new(100, MINUTE, "webhook deliveries"),
                LimitConfig::new(3, Duration::from_secs(60 * 60), "sensitive account operations"),
                LimitConfig::new(100, MINUTE, "requests"),
            ],
        }
    }

    /// Replace the limit for one category.
    pub fn with_limit(mut self, category: Category, limit: LimitConfig) -> Self {
        self.limits[category.index()] = limit;
        self
    }

    /// Look up the limit for a category.
    pub fn get(&self, category: Category) -> &LimitConfig {
        &self.limits[category.index()]
    }
}

impl Default for CategoryPolicy {
    fn default() -> Self {
        Self::reference()
    }
}
