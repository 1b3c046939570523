//! Invoice lifecycle: DRAFT → APPROVED → POSTED, VOID from any non-terminal
//! state, the preauthorization posting gate, and the edit-after-approval
//! request machine.

use crate::error::{LedgerError, LedgerResult};
use crate::model::{BillingInvoice, BillingInvoiceLine, BillingPreauthRequest, InvoiceEditRequest};
use crate::status::{DocStatus, EditRequestStatus};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Validate a document status transition.
pub fn ensure_transition(from: DocStatus, to: DocStatus) -> LedgerResult<()> {
    use DocStatus::*;
    let allowed = matches!(
        (from, to),
        (Draft, Approved) | (Approved, Posted) | (Draft, Void) | (Approved, Void)
    );
    if allowed {
        Ok(())
    } else {
        Err(LedgerError::StateConflict(format!(
            "invoice cannot move from {} to {}",
            from, to
        )))
    }
}

/// An invoice must carry at least one active line before approval.
pub fn ensure_approvable(invoice: &BillingInvoice, lines: &[BillingInvoiceLine]) -> LedgerResult<()> {
    ensure_transition(invoice.status, DocStatus::Approved)?;
    if !lines.iter().any(|l| l.is_active()) {
        return Err(LedgerError::BusinessRule(format!(
            "invoice {} has no active lines to approve",
            invoice.invoice_number
        )));
    }
    Ok(())
}

/// The posting gate of the claim pipeline.
///
/// Posting requires APPROVED status, and every line that both requires
/// preauthorization and carries an insurer share must be covered by an
/// approved or partial preauth. The case-wide approved limit must absorb
/// this invoice's insurer due on top of insurer dues already posted on the
/// same case.
pub fn check_posting_gate(
    invoice: &BillingInvoice,
    lines: &[BillingInvoiceLine],
    preauths: &[BillingPreauthRequest],
    approved_limit: Option<Decimal>,
    posted_insurer_due: Decimal,
) -> LedgerResult<()> {
    ensure_transition(invoice.status, DocStatus::Posted)?;

    let gated: Vec<&BillingInvoiceLine> = lines
        .iter()
        .filter(|l| l.is_active() && l.requires_preauth && l.insurer_pay_amount > Decimal::ZERO)
        .collect();
    if gated.is_empty() {
        return Ok(());
    }

    if !preauths.iter().any(|p| p.status.grants_coverage()) {
        return Err(LedgerError::BusinessRule(format!(
            "invoice {} has lines requiring preauthorization but no approved preauth exists",
            invoice.invoice_number
        )));
    }

    let limit = approved_limit.unwrap_or(Decimal::ZERO);
    let invoice_insurer_due: Decimal = lines
        .iter()
        .filter(|l| l.is_active())
        .map(|l| l.insurer_pay_amount)
        .sum();
    let projected = posted_insurer_due + invoice_insurer_due;
    if projected > limit {
        return Err(LedgerError::BusinessRule(format!(
            "posting invoice {} would raise insurer dues to {} beyond the approved limit {}",
            invoice.invoice_number, projected, limit
        )));
    }
    Ok(())
}

/// Voiding is allowed from any non-terminal state and requires a reason.
pub fn ensure_voidable(invoice: &BillingInvoice, reason: &str) -> LedgerResult<()> {
    if reason.trim().is_empty() {
        return Err(LedgerError::Validation("void_reason is required".into()));
    }
    match invoice.status {
        DocStatus::Void => Err(LedgerError::StateConflict(format!(
            "invoice {} is already void",
            invoice.invoice_number
        ))),
        DocStatus::Posted => Err(LedgerError::StateConflict(format!(
            "posted invoice {} is financially final",
            invoice.invoice_number
        ))),
        _ => Ok(()),
    }
}

/// An edit may only be requested against an APPROVED invoice.
pub fn ensure_edit_requestable(invoice: &BillingInvoice) -> LedgerResult<()> {
    if invoice.status != DocStatus::Approved {
        return Err(LedgerError::StateConflict(format!(
            "edit requests apply to approved invoices; {} is {}",
            invoice.invoice_number, invoice.status
        )));
    }
    Ok(())
}

/// Only a PENDING request may be decided.
pub fn ensure_request_decidable(request: &InvoiceEditRequest) -> LedgerResult<()> {
    if request.status != EditRequestStatus::Pending {
        return Err(LedgerError::StateConflict(format!(
            "edit request is already {}",
            request.status
        )));
    }
    Ok(())
}

/// Unlock deadline granted by approving an edit request.
pub fn unlock_deadline(now: DateTime<Utc>, window_hours: i64) -> DateTime<Utc> {
    now + Duration::hours(window_hours)
}

/// True while the reopened invoice may still be edited.
pub fn edit_window_open(request: &InvoiceEditRequest, now: DateTime<Utc>) -> bool {
    request.status == EditRequestStatus::Approved
        && request.unlock_until.is_some_and(|until| now <= until)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{
        CoverageFlag, InvoiceType, PayerKind, PreauthStatus, ServiceGroup,
    };
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    fn invoice(status: DocStatus) -> BillingInvoice {
        let now = Utc::now();
        BillingInvoice {
            id: Uuid::new_v4(),
            billing_case_id: Uuid::new_v4(),
            invoice_number: "INV-000123".into(),
            module: "ipd".into(),
            invoice_type: InvoiceType::Insurer,
            payer_kind: Some(PayerKind::Insurance),
            payer_id: Some(Uuid::new_v4()),
            status,
            accepts_patient_advance: false,
            sub_total: dec!(800.00),
            discount_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            round_off: Decimal::ZERO,
            grand_total: dec!(800.00),
            service_date: now,
            approved_at: None,
            approved_by: None,
            posted_at: None,
            posted_by: None,
            voided_at: None,
            voided_by: None,
            void_reason: None,
            meta: json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    fn preauth_line(insurer: Decimal) -> BillingInvoiceLine {
        let now = Utc::now();
        BillingInvoiceLine {
            id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            service_group: ServiceGroup::Procedure,
            description: "arthroscopy".into(),
            qty: dec!(1),
            unit_price: insurer,
            discount_percent: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            gst_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            line_total: insurer,
            net_amount: insurer,
            is_covered: CoverageFlag::Covered,
            approved_amount: Some(insurer),
            insurer_pay_amount: insurer,
            patient_pay_amount: Decimal::ZERO,
            requires_preauth: true,
            source_module: None,
            source_ref_id: None,
            source_line_key: None,
            is_manual: false,
            manual_reason: None,
            is_deleted: false,
            meta: json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    fn preauth(status: PreauthStatus, approved: Option<Decimal>) -> BillingPreauthRequest {
        BillingPreauthRequest {
            id: Uuid::new_v4(),
            insurance_case_id: Uuid::new_v4(),
            preauth_number: "PA-000001".into(),
            requested_amount: dec!(1000.00),
            approved_amount: approved,
            status,
            remarks: None,
            submitted_at: None,
            decided_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn draft_cannot_post() {
        let err = ensure_transition(DocStatus::Draft, DocStatus::Posted).unwrap_err();
        assert!(matches!(err, LedgerError::StateConflict(_)));
    }

    #[test]
    fn posting_without_preauth_is_rejected() {
        // Scenario D, first half.
        let inv = invoice(DocStatus::Approved);
        let lines = vec![preauth_line(dec!(800.00))];
        let err = check_posting_gate(&inv, &lines, &[], None, Decimal::ZERO).unwrap_err();
        assert!(matches!(err, LedgerError::BusinessRule(_)));
    }

    #[test]
    fn posting_succeeds_inside_approved_limit() {
        // Scenario D, second half: preauth approved for 1000.00.
        let inv = invoice(DocStatus::Approved);
        let lines = vec![preauth_line(dec!(800.00))];
        let pas = vec![preauth(PreauthStatus::Approved, Some(dec!(1000.00)))];
        check_posting_gate(&inv, &lines, &pas, Some(dec!(1000.00)), Decimal::ZERO).unwrap();
    }

    #[test]
    fn posting_beyond_limit_counts_prior_posted_dues() {
        let inv = invoice(DocStatus::Approved);
        let lines = vec![preauth_line(dec!(800.00))];
        let pas = vec![preauth(PreauthStatus::Partial, Some(dec!(1000.00)))];
        let err =
            check_posting_gate(&inv, &lines, &pas, Some(dec!(1000.00)), dec!(300.00)).unwrap_err();
        assert!(matches!(err, LedgerError::BusinessRule(_)));
    }

    #[test]
    fn ungated_invoice_posts_without_preauth() {
        let inv = invoice(DocStatus::Approved);
        let mut line = preauth_line(dec!(500.00));
        line.requires_preauth = false;
        check_posting_gate(&inv, &[line], &[], None, Decimal::ZERO).unwrap();
    }

    #[test]
    fn posted_invoice_cannot_be_voided() {
        let inv = invoice(DocStatus::Posted);
        assert!(matches!(
            ensure_voidable(&inv, "duplicate").unwrap_err(),
            LedgerError::StateConflict(_)
        ));
    }

    #[test]
    fn edit_window_expires() {
        let now = Utc::now();
        let request = InvoiceEditRequest {
            id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            status: EditRequestStatus::Approved,
            reason: "wrong qty".into(),
            requested_by: Uuid::new_v4(),
            requested_at: now,
            decided_by: Some(Uuid::new_v4()),
            decided_at: Some(now),
            decision_reason: None,
            unlock_until: Some(unlock_deadline(now, 24)),
        };
        assert!(edit_window_open(&request, now + Duration::hours(23)));
        assert!(!edit_window_open(&request, now + Duration::hours(25)));
    }
}
