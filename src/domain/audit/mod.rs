//! Audit trail sink.
//!
//! Recording is fire-and-forget: a sink must never fail or block the operation
//! being audited.

use std::sync::Mutex;
use std::sync::PoisonError;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One audited action
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub tenant_id: String,
    pub actor: String,
    pub action: String,
    pub target: String,
    pub metadata: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        tenant_id: impl Into<String>,
        actor: impl Into<String>,
        action: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor: actor.into(),
            action: action.into(),
            target: target.into(),
            metadata: serde_json::Value::Null,
            at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Emits audit entries as structured tracing events on the `audit` target
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            target: "audit",
            tenant_id = %entry.tenant_id,
            actor = %entry.actor,
            action = %entry.action,
            target_id = %entry.target,
            metadata = %entry.metadata,
            "audit"
        );
    }
}

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEntry::new("acme", "system", "template.seeded", "acme"));
        sink.record(
            AuditEntry::new("acme", "admin", "template.updated", "auth.welcome")
                .with_metadata(serde_json::json!({"language": "en"})),
        );

        assert_eq!(sink.actions(), vec!["template.seeded", "template.updated"]);
        assert_eq!(sink.entries()[1].metadata["language"], "en");
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingAuditSink.record(AuditEntry::new("acme", "system", "noop", "x"));
    }
}
