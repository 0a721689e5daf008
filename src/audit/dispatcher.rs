//! Fire-and-forget delivery of audit records.

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::events::Violation;
use super::sink::AuditSink;

/// Hands violations to an [`AuditSink`] without blocking the caller.
///
/// Each dispatch spawns one task that writes the security event and the audit
/// record concurrently. Sink failures are logged and dropped; they never reach
/// the admission path.
#[derive(Clone)]
pub struct AuditDispatcher {
    sink: Arc<dyn AuditSink>,
}

impl AuditDispatcher {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Queue a violation for auditing.
    ///
    /// Returns the delivery task, or `None` when called outside a Tokio
    /// runtime, in which case the records are dropped with a warning.
    pub fn dispatch(&self, violation: Violation) -> Option<JoinHandle<()>> {
        let Ok(runtime) = Handle::try_current() else {
            warn!(
                category = %violation.category,
                actor = %violation.actor,
                "No async runtime available, dropping audit records"
            );
            return None;
        };

        let sink = self.sink.clone();
        let security = violation.security_event();
        let record = violation.audit_record();

        Some(runtime.spawn(async move {
            let (security_result, record_result) = futures::future::join(
                sink.record_security_event(&security),
                sink.record_audit_event(&record),
            )
            .await;

            match security_result {
                Ok(()) => debug!(event_id = %security.id, "Security event recorded"),
                Err(e) => warn!(event_id = %security.id, error = %e, "Failed to record security event"),
            }

            match record_result {
                Ok(()) => debug!(event_id = %record.id, "Audit record written"),
                Err(e) => warn!(event_id = %record.id, error = %e, "Failed to write audit record"),
            }
        }))
    }
}

impl std::fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDispatcher").finish_non_exhaustive()
    }
}
