//! Authorization seam.
//!
//! The engine never authenticates anyone; it only asks a single predicate
//! before mutating state. Admin actors bypass the predicate.

use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permission codes checked before each mutating operation.
pub mod perm {
    pub const CASE_OPEN: &str = "billing.case.open";
    pub const CASE_CLOSE: &str = "billing.case.close";
    pub const INVOICE_WRITE: &str = "billing.invoice.write";
    pub const INVOICE_APPROVE: &str = "billing.invoice.approve";
    pub const INVOICE_POST: &str = "billing.invoice.post";
    pub const INVOICE_VOID: &str = "billing.invoice.void";
    pub const INVOICE_EDIT_REQUEST: &str = "billing.invoice.edit_request";
    pub const INVOICE_EDIT_DECIDE: &str = "billing.invoice.edit_decide";
    pub const INVOICE_SPLIT: &str = "billing.invoice.split";
    pub const PAYMENT_RECORD: &str = "billing.payment.record";
    pub const PAYMENT_VOID: &str = "billing.payment.void";
    pub const ADVANCE_RECORD: &str = "billing.advance.record";
    pub const ADVANCE_REFUND: &str = "billing.advance.refund";
    pub const ADVANCE_APPLY: &str = "billing.advance.apply";
    pub const PREAUTH_WRITE: &str = "billing.preauth.write";
    pub const PREAUTH_DECIDE: &str = "billing.preauth.decide";
    pub const CLAIM_WRITE: &str = "billing.claim.write";
    pub const CLAIM_SETTLE: &str = "billing.claim.settle";
}

/// The acting user as seen by the ledger.
///
/// Roles are opaque strings resolved upstream; authorizer implementations
/// decide what they grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub is_admin: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: false,
            roles: Vec::new(),
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_admin: true,
            roles: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }
}

/// Boolean permission predicate supplied by the surrounding system.
pub trait Authorizer: Send + Sync {
    fn has_permission(&self, actor: &Actor, permission: &str) -> bool;

    /// Enforce the predicate, honoring the admin bypass.
    fn ensure(&self, actor: &Actor, permission: &str) -> LedgerResult<()> {
        if actor.is_admin || self.has_permission(actor, permission) {
            Ok(())
        } else {
            Err(LedgerError::Forbidden(permission.to_string()))
        }
    }
}

/// Grants everything; for tests and single-operator deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn has_permission(&self, _actor: &Actor, _permission: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyAll;
    impl Authorizer for DenyAll {
        fn has_permission(&self, _actor: &Actor, _permission: &str) -> bool {
            false
        }
    }

    #[test]
    fn admin_bypasses_the_predicate() {
        let actor = Actor::admin(Uuid::new_v4());
        DenyAll.ensure(&actor, perm::INVOICE_POST).unwrap();
    }

    #[test]
    fn denial_surfaces_the_permission_code() {
        let actor = Actor::new(Uuid::new_v4());
        let err = DenyAll.ensure(&actor, perm::PAYMENT_RECORD).unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(code) if code == perm::PAYMENT_RECORD));
    }
}
