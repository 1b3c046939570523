//! Preauthorization and claim state machines.

use crate::error::{LedgerError, LedgerResult};
use crate::model::{BillingClaim, BillingInvoice, BillingPreauthRequest};
use crate::money::round_money;
use crate::status::{ClaimStatus, DocStatus, PreauthStatus};
use rust_decimal::Decimal;

/// Validate a preauthorization transition. One decision per request.
pub fn ensure_preauth_transition(from: PreauthStatus, to: PreauthStatus) -> LedgerResult<()> {
    use PreauthStatus::*;
    let allowed = matches!(
        (from, to),
        (Draft, Submitted) | (Submitted, Approved) | (Submitted, Partial) | (Submitted, Rejected)
    );
    if allowed {
        Ok(())
    } else {
        Err(LedgerError::StateConflict(format!(
            "preauth cannot move from {} to {}",
            from, to
        )))
    }
}

/// Validate and normalize a preauth decision.
///
/// Approved and partial decisions must carry a positive approved amount; a
/// partial amount must actually be below the requested amount. The caller
/// copies the approved amount onto the insurance case as its new limit.
pub fn validate_preauth_decision(
    preauth: &BillingPreauthRequest,
    decision: PreauthStatus,
    approved_amount: Option<Decimal>,
) -> LedgerResult<Option<Decimal>> {
    ensure_preauth_transition(preauth.status, decision)?;
    match decision {
        PreauthStatus::Rejected => Ok(None),
        PreauthStatus::Approved | PreauthStatus::Partial => {
            let amount = round_money(approved_amount.ok_or_else(|| {
                LedgerError::Validation("approved_amount is required for this decision".into())
            })?);
            if amount <= Decimal::ZERO {
                return Err(LedgerError::Validation(
                    "approved_amount must be positive".into(),
                ));
            }
            if decision == PreauthStatus::Partial && amount >= preauth.requested_amount {
                return Err(LedgerError::Validation(format!(
                    "partial approval {} must be below the requested {}",
                    amount, preauth.requested_amount
                )));
            }
            Ok(Some(amount))
        }
        other => Err(LedgerError::Validation(format!(
            "{} is not a preauth decision",
            other
        ))),
    }
}

/// Validate a claim transition.
///
/// DENIED and SETTLED are terminal; re-settling an already settled claim is
/// rejected here.
pub fn ensure_claim_transition(from: ClaimStatus, to: ClaimStatus) -> LedgerResult<()> {
    use ClaimStatus::*;
    let allowed = matches!(
        (from, to),
        (Draft, Submitted)
            | (Submitted, Acknowledged)
            | (Submitted, Approved)
            | (Submitted, Denied)
            | (Submitted, UnderQuery)
            | (Acknowledged, Approved)
            | (Acknowledged, Denied)
            | (Acknowledged, UnderQuery)
            | (UnderQuery, Submitted)
            | (UnderQuery, Approved)
            | (UnderQuery, Denied)
            | (Approved, Settled)
            | (Approved, UnderQuery)
            | (Approved, Denied)
    );
    if allowed {
        Ok(())
    } else {
        Err(LedgerError::StateConflict(format!(
            "claim cannot move from {} to {}",
            from, to
        )))
    }
}

/// Claim amount is always re-derived from the linked invoices' current
/// insurer dues (never trusted from the request) at submission time. VOID
/// invoices contribute zero even if a stale link still names them.
pub fn claim_amount_from_invoices(invoices: &[(BillingInvoice, Decimal)]) -> Decimal {
    invoices
        .iter()
        .filter(|(invoice, _)| invoice.is_active())
        .map(|(_, insurer_due)| *insurer_due)
        .sum()
}

/// A claim may be submitted only over POSTED invoices. VOID links are
/// ignored; everything else must be POSTED.
pub fn ensure_submittable(
    claim: &BillingClaim,
    invoices: &[(BillingInvoice, Decimal)],
) -> LedgerResult<Decimal> {
    ensure_claim_transition(claim.status, ClaimStatus::Submitted)?;
    let active: Vec<_> = invoices.iter().filter(|(i, _)| i.is_active()).collect();
    if active.is_empty() {
        return Err(LedgerError::BusinessRule(format!(
            "claim {} has no linked invoices",
            claim.claim_number
        )));
    }
    for (invoice, _) in &active {
        if invoice.status != DocStatus::Posted {
            return Err(LedgerError::StateConflict(format!(
                "claim {} links invoice {} which is {} (must be POSTED)",
                claim.claim_number, invoice.invoice_number, invoice.status
            )));
        }
    }
    let amount = claim_amount_from_invoices(invoices);
    if amount <= Decimal::ZERO {
        return Err(LedgerError::BusinessRule(format!(
            "claim {} has no insurer-payable amount",
            claim.claim_number
        )));
    }
    Ok(amount)
}

/// Settlement guard: APPROVED claims only, positive amount, capped by the
/// approved amount (falling back to the claim amount).
pub fn ensure_settleable(claim: &BillingClaim, settled_amount: Decimal) -> LedgerResult<Decimal> {
    ensure_claim_transition(claim.status, ClaimStatus::Settled)?;
    let settled_amount = round_money(settled_amount);
    if settled_amount <= Decimal::ZERO {
        return Err(LedgerError::Validation("settled_amount must be positive".into()));
    }
    let cap = claim.approved_amount.unwrap_or(claim.claim_amount);
    if settled_amount > cap {
        return Err(LedgerError::BusinessRule(format!(
            "settlement {} exceeds approved amount {} for claim {}",
            settled_amount, cap, claim.claim_number
        )));
    }
    Ok(settled_amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::InvoiceType;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    fn claim(status: ClaimStatus) -> BillingClaim {
        let now = Utc::now();
        BillingClaim {
            id: Uuid::new_v4(),
            insurance_case_id: Uuid::new_v4(),
            claim_number: "CLM-000042".into(),
            claim_amount: dec!(800.00),
            approved_amount: None,
            settled_amount: None,
            status,
            submitted_at: None,
            acknowledged_at: None,
            decided_at: None,
            settled_at: None,
            remarks: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn preauth(status: PreauthStatus) -> BillingPreauthRequest {
        BillingPreauthRequest {
            id: Uuid::new_v4(),
            insurance_case_id: Uuid::new_v4(),
            preauth_number: "PA-000009".into(),
            requested_amount: dec!(1000.00),
            approved_amount: None,
            status,
            remarks: None,
            submitted_at: None,
            decided_at: None,
            created_at: Utc::now(),
        }
    }

    fn linked_invoice(status: DocStatus, insurer_due: Decimal) -> (BillingInvoice, Decimal) {
        let now = Utc::now();
        let invoice = BillingInvoice {
            id: Uuid::new_v4(),
            billing_case_id: Uuid::new_v4(),
            invoice_number: "INV-000321".into(),
            module: "ipd".into(),
            invoice_type: InvoiceType::Insurer,
            payer_kind: None,
            payer_id: None,
            status,
            accepts_patient_advance: false,
            sub_total: insurer_due,
            discount_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            round_off: Decimal::ZERO,
            grand_total: insurer_due,
            service_date: now,
            approved_at: None,
            approved_by: None,
            posted_at: (status == DocStatus::Posted).then_some(now),
            posted_by: None,
            voided_at: None,
            voided_by: None,
            void_reason: None,
            meta: json!({}),
            created_at: now,
            updated_at: now,
        };
        (invoice, insurer_due)
    }

    #[test]
    fn preauth_gets_one_decision() {
        let decided = preauth(PreauthStatus::Approved);
        assert!(validate_preauth_decision(&decided, PreauthStatus::Rejected, None).is_err());
    }

    #[test]
    fn partial_must_be_below_requested() {
        let submitted = preauth(PreauthStatus::Submitted);
        let err =
            validate_preauth_decision(&submitted, PreauthStatus::Partial, Some(dec!(1000.00)))
                .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let ok = validate_preauth_decision(&submitted, PreauthStatus::Partial, Some(dec!(600.00)))
            .unwrap();
        assert_eq!(ok, Some(dec!(600.00)));
    }

    #[test]
    fn claim_walks_the_happy_path() {
        ensure_claim_transition(ClaimStatus::Draft, ClaimStatus::Submitted).unwrap();
        ensure_claim_transition(ClaimStatus::Submitted, ClaimStatus::Acknowledged).unwrap();
        ensure_claim_transition(ClaimStatus::Acknowledged, ClaimStatus::Approved).unwrap();
        ensure_claim_transition(ClaimStatus::Approved, ClaimStatus::Settled).unwrap();
    }

    #[test]
    fn settled_claim_cannot_settle_again() {
        let settled = claim(ClaimStatus::Settled);
        assert!(matches!(
            ensure_settleable(&settled, dec!(100.00)).unwrap_err(),
            LedgerError::StateConflict(_)
        ));
    }

    #[test]
    fn settlement_is_capped_by_approval() {
        let mut approved = claim(ClaimStatus::Approved);
        approved.approved_amount = Some(dec!(700.00));
        assert!(matches!(
            ensure_settleable(&approved, dec!(750.00)).unwrap_err(),
            LedgerError::BusinessRule(_)
        ));
        assert_eq!(ensure_settleable(&approved, dec!(700.00)).unwrap(), dec!(700.00));
    }

    #[test]
    fn void_linked_invoice_contributes_nothing() {
        let posted = linked_invoice(DocStatus::Posted, dec!(400.00));
        let voided = linked_invoice(DocStatus::Void, dec!(400.00));
        assert_eq!(
            claim_amount_from_invoices(&[posted.clone(), voided.clone()]),
            dec!(400.00)
        );
        // A stale VOID link must not block submission either.
        let draft = claim(ClaimStatus::Draft);
        assert_eq!(
            ensure_submittable(&draft, &[posted, voided]).unwrap(),
            dec!(400.00)
        );
    }

    #[test]
    fn claim_with_only_void_links_cannot_submit() {
        let draft = claim(ClaimStatus::Draft);
        let voided = linked_invoice(DocStatus::Void, dec!(400.00));
        assert!(matches!(
            ensure_submittable(&draft, &[voided]).unwrap_err(),
            LedgerError::BusinessRule(_)
        ));
    }

    #[test]
    fn draft_claim_cannot_be_settled_or_denied() {
        assert!(ensure_claim_transition(ClaimStatus::Draft, ClaimStatus::Settled).is_err());
        assert!(ensure_claim_transition(ClaimStatus::Draft, ClaimStatus::Denied).is_err());
    }
}
