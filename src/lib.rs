//! Ridegate - Adaptive Rate Limiting and Abuse Blocking
//!
//! This crate implements the per-category rate limiter that sits in front of
//! every marketplace API route. Requests are classified into a traffic
//! category, counted per actor in fixed windows, and actors that exceed a
//! quota are blocked for a penalty period. Violations are written to an audit
//! trail without delaying the admission decision.

pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
