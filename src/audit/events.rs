//! Audit records produced when an actor trips a quota.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ratelimit::{ActorKey, Category, RequestInfo};

pub const RATE_LIMIT_EVENT_TYPE: &str = "rate_limit_exceeded";
pub const RATE_LIMIT_ACTION_TYPE: &str = "RATE_LIMIT_EXCEEDED";
pub const SECURITY_ENTITY_TYPE: &str = "security";

/// Structured attack-log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source_ip: String,
    pub user_id: Option<String>,
    pub user_type: Option<String>,
    pub request_path: String,
    pub request_method: String,
    pub detection_reason: String,
    pub detection_details: DetectionDetails,
    pub blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionDetails {
    pub category: Category,
    pub timestamp: DateTime<Utc>,
}

/// Generic audit-trail record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_id: String,
    pub actor_email: Option<String>,
    pub actor_role: String,
    pub ip_address: String,
    pub action_type: String,
    pub entity_type: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub success: bool,
}

/// A quota violation, as seen by the decision engine.
#[derive(Debug, Clone)]
pub struct Violation {
    pub category: Category,
    pub actor: ActorKey,
    pub request: RequestInfo,
    /// Count that tripped the quota
    pub count: u64,
    pub max_requests: u64,
    pub block_ms: u64,
    pub at_ms: u64,
}

impl Violation {
    /// `"exceeded N/max in window"`
    pub fn reason(&self) -> String {
        format!(
            "exceeded {}/{} {} requests in window",
            self.count, self.max_requests, self.category
        )
    }

    fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.at_ms as i64)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn source_ip(&self) -> String {
        self.request
            .client_ip
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn security_event(&self) -> SecurityEvent {
        let user = self.request.actor.as_ref();

        SecurityEvent {
            id: Uuid::new_v4(),
            event_type: RATE_LIMIT_EVENT_TYPE.to_string(),
            source_ip: self.source_ip(),
            user_id: user.map(|u| u.id.clone()),
            user_type: user.map(|u| u.role.clone()),
            request_path: self.request.path.clone(),
            request_method: self.request.method.clone(),
            detection_reason: self.reason(),
            detection_details: DetectionDetails {
                category: self.category,
                timestamp: self.timestamp(),
            },
            blocked: true,
        }
    }

    pub fn audit_record(&self) -> AuditRecord {
        let user = self.request.actor.as_ref();

        AuditRecord {
            id: Uuid::new_v4(),
            actor_id: user
                .map(|u| u.id.clone())
                .unwrap_or_else(|| self.actor.to_string()),
            actor_email: user.and_then(|u| u.email.clone()),
            actor_role: user
                .map(|u| u.role.clone())
                .unwrap_or_else(|| "anonymous".to_string()),
            ip_address: self.source_ip(),
            action_type: RATE_LIMIT_ACTION_TYPE.to_string(),
            entity_type: SECURITY_ENTITY_TYPE.to_string(),
            description: format!(
                "Rate limit exceeded for {} on {} {}",
                self.category, self.request.method, self.request.path
            ),
            metadata: serde_json::json!({
                "category": self.category,
                "actorKey": self.actor.to_string(),
                "count": self.count,
                "maxRequests": self.max_requests,
                "blockDurationMs": self.block_ms,
                "timestamp": self.timestamp(),
            }),
            success: false,
        }
    }
}
