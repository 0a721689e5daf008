//! Axum middleware enforcing the limiter in front of API routes.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::ratelimit::{AuthenticatedActor, Category, RateLimitOutcome, RateLimiter, RequestInfo};

pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const HEADER_CATEGORY: HeaderName = HeaderName::from_static("x-ratelimit-category");

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// State for [`enforce_rate_limit`].
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<RateLimiter>,
    category: Option<Category>,
    trust_forwarded_headers: bool,
}

impl RateLimitState {
    /// Classify each request by path and method.
    pub fn classified(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            category: None,
            trust_forwarded_headers: true,
        }
    }

    /// Count every request against a fixed category.
    pub fn fixed(limiter: Arc<RateLimiter>, category: Category) -> Self {
        Self {
            limiter,
            category: Some(category),
            trust_forwarded_headers: true,
        }
    }

    pub fn trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }
}

/// Admit or reject the request and attach rate-limit headers.
///
/// Rejected requests get a `429` and never reach the inner service.
pub async fn enforce_rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let info = request_info(&request, state.trust_forwarded_headers);
    let outcome = state.limiter.check(&info, state.category);

    let mut response = if outcome.rejected {
        rejection_response(&outcome)
    } else {
        next.run(request).await
    };

    apply_headers(response.headers_mut(), &outcome);
    response
}

/// Extract what the limiter needs from the request.
pub fn request_info(request: &Request, trust_forwarded_headers: bool) -> RequestInfo {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    RequestInfo {
        path: request.uri().path().to_string(),
        method: request.method().as_str().to_string(),
        actor: request.extensions().get::<AuthenticatedActor>().cloned(),
        client_ip: client_ip(request.headers(), peer, trust_forwarded_headers),
    }
}

/// Resolve the client IP: forwarded-for (first hop), then real-ip, then the peer address.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_headers: bool,
) -> Option<String> {
    let from_header = |name: &str, first_hop: bool| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| if first_hop { value.split(',').next().unwrap_or(value) } else { value })
            .map(str::trim)
            .and_then(|value| value.parse::<IpAddr>().ok())
    };

    let forwarded = if trust_forwarded_headers {
        from_header(FORWARDED_FOR, true).or_else(|| from_header(REAL_IP, false))
    } else {
        None
    };

    forwarded
        .or_else(|| peer.map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
}

fn apply_headers(headers: &mut HeaderMap, outcome: &RateLimitOutcome) {
    headers.insert(HEADER_LIMIT, HeaderValue::from(outcome.limit));
    headers.insert(HEADER_REMAINING, HeaderValue::from(outcome.remaining));
    headers.insert(HEADER_RESET, HeaderValue::from(outcome.reset_at_epoch_secs));
    headers.insert(HEADER_CATEGORY, HeaderValue::from_static(outcome.category.as_str()));

    if let Some(retry_after) = outcome.retry_after_secs {
        headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
    }
}

#[derive(Serialize)]
struct RejectionBody {
    success: bool,
    error: RejectionDetail,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionDetail {
    code: &'static str,
    message: String,
    category: Category,
    retry_after: u64,
}

fn rejection_response(outcome: &RateLimitOutcome) -> Response {
    let body = RejectionBody {
        success: false,
        error: RejectionDetail {
            code: "RATE_LIMIT_EXCEEDED",
            message: outcome
                .message
                .clone()
                .unwrap_or_else(|| "Too many requests".to_string()),
            category: outcome.category,
            retry_after: outcome.retry_after_secs.unwrap_or_default(),
        },
    };

    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}
