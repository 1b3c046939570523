//! Actor extraction and the role-based permission predicate.
//!
//! Authentication happens upstream (gateway or reverse proxy); this server
//! trusts the identity headers it is handed and only decides what the
//! resolved roles may do.

use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use billing_core::access::{perm, Actor, Authorizer};
use uuid::Uuid;

pub const USER_HEADER: &str = "x-user-id";
pub const ADMIN_HEADER: &str = "x-admin";
pub const ROLES_HEADER: &str = "x-roles";

/// Permissions granted to one named role.
fn role_permissions(role: &str) -> &'static [&'static str] {
    match role {
        // Front-desk: builds documents and takes money, decides nothing.
        "billing_clerk" => &[
            perm::CASE_OPEN,
            perm::INVOICE_WRITE,
            perm::INVOICE_EDIT_REQUEST,
            perm::PAYMENT_RECORD,
            perm::ADVANCE_RECORD,
        ],
        // Supervisor: approvals, postings, voids and wallet movements.
        "billing_supervisor" => &[
            perm::CASE_OPEN,
            perm::CASE_CLOSE,
            perm::INVOICE_WRITE,
            perm::INVOICE_APPROVE,
            perm::INVOICE_POST,
            perm::INVOICE_VOID,
            perm::INVOICE_EDIT_REQUEST,
            perm::INVOICE_EDIT_DECIDE,
            perm::INVOICE_SPLIT,
            perm::PAYMENT_RECORD,
            perm::PAYMENT_VOID,
            perm::ADVANCE_RECORD,
            perm::ADVANCE_REFUND,
            perm::ADVANCE_APPLY,
        ],
        // Insurance desk: the payer-facing pipeline.
        "insurance_desk" => &[
            perm::PREAUTH_WRITE,
            perm::PREAUTH_DECIDE,
            perm::CLAIM_WRITE,
            perm::CLAIM_SETTLE,
            perm::INVOICE_SPLIT,
        ],
        _ => &[],
    }
}

/// Grants the union of the actor's role permission lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAuthorizer;

impl Authorizer for RoleAuthorizer {
    fn has_permission(&self, actor: &Actor, permission: &str) -> bool {
        actor
            .roles
            .iter()
            .any(|role| role_permissions(role).contains(&permission))
    }
}

/// Local extractor wrapper: the orphan rule forbids implementing axum's
/// `FromRequestParts` directly on `billing_core`'s `Actor`.
#[derive(Debug, Clone)]
pub struct AuthActor(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| ApiError::unauthenticated("missing or invalid x-user-id header"))?;

        let is_admin = parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let roles = parts
            .headers
            .get(ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let actor = if is_admin {
            Actor::admin(user_id)
        } else {
            Actor::new(user_id)
        };
        Ok(AuthActor(actor.with_roles(roles)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clerk_cannot_post_invoices() {
        let clerk = Actor::new(Uuid::new_v4()).with_roles(vec!["billing_clerk".into()]);
        assert!(RoleAuthorizer.has_permission(&clerk, perm::INVOICE_WRITE));
        assert!(!RoleAuthorizer.has_permission(&clerk, perm::INVOICE_POST));
    }

    #[test]
    fn roles_union_their_grants() {
        let dual = Actor::new(Uuid::new_v4())
            .with_roles(vec!["billing_clerk".into(), "insurance_desk".into()]);
        assert!(RoleAuthorizer.has_permission(&dual, perm::PAYMENT_RECORD));
        assert!(RoleAuthorizer.has_permission(&dual, perm::CLAIM_SETTLE));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let nobody = Actor::new(Uuid::new_v4()).with_roles(vec!["janitor".into()]);
        assert!(!RoleAuthorizer.has_permission(&nobody, perm::CASE_OPEN));
    }
}
