//! Actor identity and composite window keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use super::category::Category;

/// Placeholder used when no identity can be resolved.
const UNKNOWN_ACTOR: &str = "unknown";

/// The subject being rate limited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActorKey {
    /// An authenticated user
    User(String),
    /// An anonymous client, identified by IP address
    Ip(String),
    /// Neither a user id nor a parseable IP was available
    Unknown,
}

impl ActorKey {
    /// Resolve the actor for a request.
    ///
    /// An authenticated user always wins. Otherwise the client IP is used if
    /// it parses; failing both, every such request shares a placeholder key so
    /// identity problems never fail the request but still count toward a quota.
    pub fn resolve(user: Option<&AuthenticatedActor>, client_ip: Option<&str>) -> Self {
        if let Some(user) = user.filter(|u| !u.id.trim().is_empty()) {
            return ActorKey::User(user.id.trim().to_string());
        }

        client_ip
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
            .map(|ip| ActorKey::Ip(ip.to_string()))
            .unwrap_or(ActorKey::Unknown)
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorKey::User(id) => write!(f, "user:{}", id),
            ActorKey::Ip(ip) => write!(f, "ip:{}", ip),
            ActorKey::Unknown => write!(f, "ip:{}", UNKNOWN_ACTOR),
        }
    }
}

/// Identifies a single counting window: one per (category, actor) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub category: Category,
    pub actor: ActorKey,
}

impl WindowKey {
    pub fn new(category: Category, actor: ActorKey) -> Self {
        Self { category, actor }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.actor)
    }
}

/// An identity established by the authentication layer upstream of the limiter.
///
/// The HTTP layer reads it from the request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedActor {
    pub id: String,
    /// Role such as `rider`, `driver`, `merchant` or `admin`
    pub role: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// What the limiter needs to know about an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub path: String,
    pub method: String,
    pub actor: Option<AuthenticatedActor>,
    pub client_ip: Option<String>,
}

impl RequestInfo {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            actor: None,
            client_ip: None,
        }
    }

    pub fn with_actor(mut self, actor: AuthenticatedActor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// The actor key this request is counted against.
    pub fn actor_key(&self) -> ActorKey {
        ActorKey::resolve(self.actor.as_ref(), self.client_ip.as_deref())
    }
}
