//! Durable audit sink backed by the billing_audit_log table.

use crate::pool::DatabasePool;
use async_trait::async_trait;
use audit_log::{AuditRecord, AuditSink};
use tracing::error;

/// Writes audit records to Postgres.
///
/// Delivery is best-effort by contract: an insert failure is logged and
/// swallowed so audit plumbing can never roll back a committed ledger
/// operation.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: DatabasePool,
}

impl PgAuditSink {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, record: AuditRecord) {
        let result = sqlx::query(
            "INSERT INTO billing_audit_log \
             (entity_type, entity_id, action, old_json, new_json, user_id, reason, at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&record.entity_type)
        .bind(record.entity_id)
        .bind(&record.action)
        .bind(&record.old)
        .bind(&record.new)
        .bind(record.user_id)
        .bind(&record.reason)
        .bind(record.at)
        .execute(self.pool.pool())
        .await;

        if let Err(e) = result {
            error!(
                entity_type = %record.entity_type,
                entity_id = %record.entity_id,
                action = %record.action,
                error = %e,
                "failed to persist audit record"
            );
        }
    }
}
