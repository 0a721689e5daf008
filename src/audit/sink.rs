//! Audit sink trait and built-in sinks.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::events::{AuditRecord, SecurityEvent};

/// Errors that can occur while writing audit records.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Audit sink rejected record: {0}")]
    Rejected(String),
}

/// Destination for rate-limit audit records.
///
/// The limiter never awaits a sink on the admission path; see
/// [`super::AuditDispatcher`].
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record an attack-log entry.
    async fn record_security_event(&self, event: &SecurityEvent) -> Result<(), AuditError>;

    /// Record a generic audit-trail entry.
    async fn record_audit_event(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Emits audit records as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record_security_event(&self, event: &SecurityEvent) -> Result<(), AuditError> {
        warn!(
            target: "ridegate::audit",
            event_id = %event.id,
            event_type = %event.event_type,
            source_ip = %event.source_ip,
            user_id = ?event.user_id,
            path = %event.request_path,
            method = %event.request_method,
            category = %event.detection_details.category,
            reason = %event.detection_reason,
            "Security event"
        );
        Ok(())
    }

    async fn record_audit_event(&self, record: &AuditRecord) -> Result<(), AuditError> {
        info!(
            target: "ridegate::audit",
            event_id = %record.id,
            actor_id = %record.actor_id,
            actor_role = %record.actor_role,
            action = %record.action_type,
            description = %record.description,
            "Audit event"
        );
        Ok(())
    }
}

/// One line of the audit file.
#[derive(Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
enum AuditLine<'a> {
    Security(&'a SecurityEvent),
    Audit(&'a AuditRecord),
}

/// Appends audit records to a newline-delimited JSON file.
pub struct FileAuditSink {
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Open (or create) the audit file in append mode.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, AuditError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening audit log file");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }

    async fn append(&self, line: AuditLine<'_>) -> Result<(), AuditError> {
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record_security_event(&self, event: &SecurityEvent) -> Result<(), AuditError> {
        self.append(AuditLine::Security(event)).await
    }

    async fn record_audit_event(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.append(AuditLine::Audit(record)).await
    }
}
