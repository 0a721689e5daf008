//! Audit trail for rate-limit violations.
//!
//! The limiter produces a [`Violation`] when an actor exceeds a quota; the
//! [`AuditDispatcher`] turns it into a [`SecurityEvent`] and an
//! [`AuditRecord`] and delivers both to an [`AuditSink`] in the background.

mod dispatcher;
mod events;
mod sink;

pub use dispatcher::AuditDispatcher;
pub use events::{AuditRecord, DetectionDetails, SecurityEvent, Violation};
pub use sink::{AuditError, AuditSink, FileAuditSink, TracingAuditSink};
