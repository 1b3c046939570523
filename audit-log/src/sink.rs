use crate::entry::AuditRecord;
use async_trait::async_trait;

/// Destination for audit records.
///
/// Implementations must be infallible from the caller's perspective;
/// delivery problems are handled (and logged) inside the sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord);
}

/// Default sink: emits records as structured tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn record(&self, record: AuditRecord) {
        tracing::info!(
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            action = %record.action,
            user_id = ?record.user_id,
            reason = ?record.reason,
            "audit"
        );
    }
}
