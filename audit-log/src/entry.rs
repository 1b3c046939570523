use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// One audited mutation of a billing entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub old: Option<JsonValue>,
    pub new: Option<JsonValue>,
    pub user_id: Option<Uuid>,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(entity_type: impl Into<String>, entity_id: Uuid, action: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
            action: action.into(),
            old: None,
            new: None,
            user_id: None,
            reason: None,
            at: Utc::now(),
        }
    }

    pub fn with_old(mut self, old: JsonValue) -> Self {
        self.old = Some(old);
        self
    }

    pub fn with_new(mut self, new: JsonValue) -> Self {
        self.new = Some(new);
        self
    }

    pub fn by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_fills_optional_fields() {
        let user = Uuid::new_v4();
        let record = AuditRecord::new("billing_invoice", Uuid::new_v4(), "void")
            .with_old(json!({"status": "APPROVED"}))
            .with_new(json!({"status": "VOID"}))
            .by(user)
            .because("duplicate entry");
        assert_eq!(record.action, "void");
        assert_eq!(record.user_id, Some(user));
        assert_eq!(record.old.unwrap()["status"], "APPROVED");
    }
}
