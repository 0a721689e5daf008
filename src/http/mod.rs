//! HTTP layer: rate-limit middleware, operational routes and the server.

mod middleware;
mod routes;
mod server;

pub use middleware::{
    client_ip, enforce_rate_limit, request_info, RateLimitState, HEADER_CATEGORY, HEADER_LIMIT,
    HEADER_REMAINING, HEADER_RESET,
};
pub use routes::build_router;
pub use server::HttpServer;
