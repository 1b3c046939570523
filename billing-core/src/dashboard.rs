//! Case financial dashboard: a pure aggregation over ledger snapshots.
//!
//! The advance wallet is reported alongside the dues but never offsets
//! them; the only place advance money reduces an outstanding figure is the
//! explicit what-if field.

use crate::advance::{wallet, AdvanceWallet};
use crate::model::{
    BillingAdvance, BillingAdvanceApplication, BillingInvoice, BillingPaymentAllocation,
};
use crate::status::{DocStatus, PayStatus, PayerBucket};
use rust_decimal::Decimal;
use serde::Serialize;

/// Invoice snapshot with dues pre-derived from its active lines.
#[derive(Debug, Clone)]
pub struct InvoiceSnapshot {
    pub invoice: BillingInvoice,
    pub patient_due: Decimal,
    pub insurer_due: Decimal,
}

/// The computed dashboard payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default, utoipa::ToSchema)]
pub struct CaseFinancials {
    pub posted_total: Decimal,
    pub patient_due: Decimal,
    pub insurer_due: Decimal,
    pub patient_paid: Decimal,
    pub insurer_paid: Decimal,
    pub patient_outstanding: Decimal,
    pub insurer_outstanding: Decimal,
    pub advance_in: Decimal,
    pub advance_refunded: Decimal,
    pub advance_applied: Decimal,
    pub advance_balance: Decimal,
    /// What-if figure only: patient outstanding after hypothetically
    /// applying the whole advance balance.
    pub patient_payable_after_advance: Decimal,
}

/// Compute the dashboard for one case.
///
/// VOID invoices and VOID payments contribute nothing. Dues count
/// APPROVED and POSTED invoices (the settleable set); the posted total
/// counts POSTED only.
pub fn case_financials(
    invoices: &[InvoiceSnapshot],
    allocations: &[BillingPaymentAllocation],
    advances: &[BillingAdvance],
    applications: &[BillingAdvanceApplication],
) -> CaseFinancials {
    let mut out = CaseFinancials::default();

    for snap in invoices {
        match snap.invoice.status {
            DocStatus::Posted => {
                out.posted_total += snap.invoice.grand_total;
                out.patient_due += snap.patient_due;
                out.insurer_due += snap.insurer_due;
            }
            DocStatus::Approved => {
                out.patient_due += snap.patient_due;
                out.insurer_due += snap.insurer_due;
            }
            DocStatus::Draft | DocStatus::Void => {}
        }
    }

    for alloc in allocations.iter().filter(|a| a.status == PayStatus::Active) {
        match alloc.payer_bucket {
            PayerBucket::Patient => out.patient_paid += alloc.amount,
            PayerBucket::Insurer | PayerBucket::Tpa | PayerBucket::Corporate => {
                out.insurer_paid += alloc.amount
            }
        }
    }

    out.patient_outstanding = out.patient_due - out.patient_paid;
    out.insurer_outstanding = out.insurer_due - out.insurer_paid;

    let AdvanceWallet {
        total_in,
        total_refunded,
        total_applied,
        balance,
    } = wallet(advances, applications);
    out.advance_in = total_in;
    out.advance_refunded = total_refunded;
    out.advance_applied = total_applied;
    out.advance_balance = balance;

    out.patient_payable_after_advance =
        (out.patient_outstanding - out.advance_balance).max(Decimal::ZERO);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{AdvanceEntryType, InvoiceType, PaymentMode};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    fn snapshot(
        status: DocStatus,
        grand: Decimal,
        patient_due: Decimal,
        insurer_due: Decimal,
    ) -> InvoiceSnapshot {
        let now = Utc::now();
        InvoiceSnapshot {
            invoice: BillingInvoice {
                id: Uuid::new_v4(),
                billing_case_id: Uuid::new_v4(),
                invoice_number: "INV-1".into(),
                module: "opd".into(),
                invoice_type: InvoiceType::Patient,
                payer_kind: None,
                payer_id: None,
                status,
                accepts_patient_advance: true,
                sub_total: grand,
                discount_total: Decimal::ZERO,
                tax_total: Decimal::ZERO,
                round_off: Decimal::ZERO,
                grand_total: grand,
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
            },
            patient_due,
            insurer_due,
        }
    }

    fn alloc(bucket: PayerBucket, amount: Decimal, status: PayStatus) -> BillingPaymentAllocation {
        BillingPaymentAllocation {
            id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            payer_bucket: bucket,
            amount,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn void_documents_contribute_nothing() {
        let invoices = vec![
            snapshot(DocStatus::Posted, dec!(1000.00), dec!(600.00), dec!(400.00)),
            snapshot(DocStatus::Void, dec!(999.00), dec!(999.00), Decimal::ZERO),
        ];
        let allocations = vec![
            alloc(PayerBucket::Patient, dec!(200.00), PayStatus::Active),
            alloc(PayerBucket::Patient, dec!(123.00), PayStatus::Void),
        ];
        let fin = case_financials(&invoices, &allocations, &[], &[]);
        assert_eq!(fin.posted_total, dec!(1000.00));
        assert_eq!(fin.patient_due, dec!(600.00));
        assert_eq!(fin.patient_paid, dec!(200.00));
        assert_eq!(fin.patient_outstanding, dec!(400.00));
        assert_eq!(fin.insurer_outstanding, dec!(400.00));
    }

    #[test]
    fn advance_balance_never_offsets_outstanding() {
        let invoices = vec![snapshot(
            DocStatus::Posted,
            dec!(500.00),
            dec!(500.00),
            Decimal::ZERO,
        )];
        let advances = vec![BillingAdvance {
            id: Uuid::new_v4(),
            billing_case_id: Uuid::new_v4(),
            entry_type: AdvanceEntryType::Advance,
            mode: PaymentMode::Cash,
            amount: dec!(300.00),
            remarks: None,
            recorded_by: None,
            created_at: Utc::now(),
        }];
        let fin = case_financials(&invoices, &[], &advances, &[]);
        assert_eq!(fin.patient_outstanding, dec!(500.00));
        assert_eq!(fin.advance_balance, dec!(300.00));
        assert_eq!(fin.patient_payable_after_advance, dec!(200.00));
    }

    #[test]
    fn tpa_allocations_count_as_insurer_paid() {
        let invoices = vec![snapshot(
            DocStatus::Approved,
            dec!(800.00),
            Decimal::ZERO,
            dec!(800.00),
        )];
        let allocations = vec![alloc(PayerBucket::Tpa, dec!(500.00), PayStatus::Active)];
        let fin = case_financials(&invoices, &allocations, &[], &[]);
        assert_eq!(fin.posted_total, Decimal::ZERO);
        assert_eq!(fin.insurer_paid, dec!(500.00));
        assert_eq!(fin.insurer_outstanding, dec!(300.00));
    }
}
