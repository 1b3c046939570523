//! Insurance split engine.
//!
//! Divides one mixed-liability invoice into a PATIENT invoice and an
//! INSURER invoice, line by line. Shares are exact complements of each
//! other, so the two new grand totals always reassemble the original.

use crate::error::{LedgerError, LedgerResult};
use crate::model::{BillingInvoice, BillingInvoiceLine};
use crate::money::round_money;
use crate::status::{CoverageFlag, DocStatus, PayerBucket};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

/// One line of a split-result invoice, carrying full provenance.
#[derive(Debug, Clone)]
pub struct PlannedShareLine {
    pub source_line_id: Uuid,
    pub service_group: crate::status::ServiceGroup,
    pub description: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub gst_rate: Decimal,
    pub line_total: Decimal,
    pub tax_amount: Decimal,
    pub net_amount: Decimal,
    pub is_covered: CoverageFlag,
    pub insurer_pay_amount: Decimal,
    pub patient_pay_amount: Decimal,
    pub requires_preauth: bool,
    pub meta: serde_json::Value,
}

/// Full plan for a split; nothing is written until the store executes it.
#[derive(Debug, Clone)]
pub struct SplitPlan {
    pub source_invoice_id: Uuid,
    pub patient_lines: Vec<PlannedShareLine>,
    pub insurer_lines: Vec<PlannedShareLine>,
    pub patient_total: Decimal,
    pub insurer_total: Decimal,
    pub migrate_payments: bool,
}

fn share_line(
    invoice: &BillingInvoice,
    line: &BillingInvoiceLine,
    bucket: PayerBucket,
    share: Decimal,
    tax_share: Decimal,
) -> PlannedShareLine {
    let ratio = if line.net_amount.is_zero() {
        Decimal::ZERO
    } else {
        share / line.net_amount
    };
    let (insurer, patient, coverage) = match bucket {
        PayerBucket::Patient => (Decimal::ZERO, share, CoverageFlag::NotCovered),
        _ => (share, Decimal::ZERO, CoverageFlag::Covered),
    };
    PlannedShareLine {
        source_line_id: line.id,
        service_group: line.service_group,
        description: line.description.clone(),
        qty: line.qty,
        unit_price: line.unit_price,
        gst_rate: line.gst_rate,
        line_total: share - tax_share,
        tax_amount: tax_share,
        net_amount: share,
        is_covered: coverage,
        insurer_pay_amount: insurer,
        patient_pay_amount: patient,
        requires_preauth: line.requires_preauth,
        meta: json!({
            "split": {
                "source_invoice_id": invoice.id,
                "source_invoice_number": invoice.invoice_number,
                "source_line_id": line.id,
                "bucket": bucket.as_str(),
                "ratio": ratio.to_string(),
            }
        }),
    }
}

/// Plan the split of `invoice` into patient-share and insurer-share lines.
///
/// Rejected when the invoice is DRAFT (edit the lines instead) or VOID,
/// when it carries no insurer share at all, or when payments exist and the
/// caller has not explicitly allowed migrating them to the new PATIENT
/// invoice.
pub fn plan_split(
    invoice: &BillingInvoice,
    lines: &[BillingInvoiceLine],
    has_payments: bool,
    allow_payment_migration: bool,
) -> LedgerResult<SplitPlan> {
    match invoice.status {
        DocStatus::Approved | DocStatus::Posted => {}
        status => {
            return Err(LedgerError::StateConflict(format!(
                "invoice {} cannot be split while {}",
                invoice.invoice_number, status
            )))
        }
    }
    if has_payments && !allow_payment_migration {
        return Err(LedgerError::BusinessRule(format!(
            "invoice {} already has payments; pass allow_payment_migration to move them",
            invoice.invoice_number
        )));
    }

    let active: Vec<&BillingInvoiceLine> = lines.iter().filter(|l| l.is_active()).collect();
    let insurer_total: Decimal = active.iter().map(|l| l.insurer_pay_amount).sum();
    if insurer_total <= Decimal::ZERO {
        return Err(LedgerError::BusinessRule(format!(
            "invoice {} carries no insurer share to split",
            invoice.invoice_number
        )));
    }

    let mut patient_lines = Vec::new();
    let mut insurer_lines = Vec::new();
    for line in &active {
        let patient_share = line.patient_pay_amount;
        let insurer_share = line.net_amount - patient_share;

        // Tax splits proportionally; the insurer side takes the exact
        // complement so the two lines reassemble the original to the cent.
        let patient_tax = if line.net_amount.is_zero() {
            Decimal::ZERO
        } else {
            round_money(line.tax_amount * patient_share / line.net_amount)
        };
        let insurer_tax = line.tax_amount - patient_tax;

        if patient_share > Decimal::ZERO {
            patient_lines.push(share_line(
                invoice,
                line,
                PayerBucket::Patient,
                patient_share,
                patient_tax,
            ));
        }
        if insurer_share > Decimal::ZERO {
            insurer_lines.push(share_line(
                invoice,
                line,
                PayerBucket::Insurer,
                insurer_share,
                insurer_tax,
            ));
        }
    }

    let patient_total = patient_lines.iter().map(|l| l.net_amount).sum();
    let insurer_total = insurer_lines.iter().map(|l| l.net_amount).sum();

    Ok(SplitPlan {
        source_invoice_id: invoice.id,
        patient_lines,
        insurer_lines,
        patient_total,
        insurer_total,
        migrate_payments: has_payments && allow_payment_migration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{InvoiceType, PayerKind, ServiceGroup};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn invoice(status: DocStatus) -> BillingInvoice {
        let now = Utc::now();
        BillingInvoice {
            id: Uuid::new_v4(),
            billing_case_id: Uuid::new_v4(),
            invoice_number: "INV-000777".into(),
            module: "ipd".into(),
            invoice_type: InvoiceType::Patient,
            payer_kind: Some(PayerKind::Insurance),
            payer_id: Some(Uuid::new_v4()),
            status,
            accepts_patient_advance: true,
            sub_total: Decimal::ZERO,
            discount_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            round_off: Decimal::ZERO,
            grand_total: Decimal::ZERO,
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

    fn mixed_line(net: Decimal, tax: Decimal, insurer: Decimal) -> BillingInvoiceLine {
        let now = Utc::now();
        BillingInvoiceLine {
            id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            service_group: ServiceGroup::Room,
            description: "room rent".into(),
            qty: dec!(1),
            unit_price: net - tax,
            discount_percent: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            gst_rate: Decimal::ZERO,
            tax_amount: tax,
            line_total: net - tax,
            net_amount: net,
            is_covered: CoverageFlag::Partial,
            approved_amount: Some(insurer),
            insurer_pay_amount: insurer,
            patient_pay_amount: net - insurer,
            requires_preauth: false,
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

    #[test]
    fn shares_reassemble_the_original_total() {
        let inv = invoice(DocStatus::Approved);
        let lines = vec![
            mixed_line(dec!(1120.00), dec!(120.00), dec!(700.00)),
            mixed_line(dec!(333.33), dec!(0.00), dec!(111.11)),
        ];
        let original: Decimal = lines.iter().map(|l| l.net_amount).sum();
        let plan = plan_split(&inv, &lines, false, false).unwrap();
        assert_eq!(plan.patient_total + plan.insurer_total, original);
    }

    #[test]
    fn line_tax_shares_are_exact_complements() {
        let inv = invoice(DocStatus::Posted);
        let line = mixed_line(dec!(1120.00), dec!(120.00), dec!(700.00));
        let plan = plan_split(&inv, std::slice::from_ref(&line), false, false).unwrap();
        let patient = &plan.patient_lines[0];
        let insurer = &plan.insurer_lines[0];
        assert_eq!(patient.tax_amount + insurer.tax_amount, line.tax_amount);
        assert_eq!(patient.net_amount, dec!(420.00));
        assert_eq!(insurer.net_amount, dec!(700.00));
        assert_eq!(insurer.meta["split"]["source_invoice_number"], "INV-000777");
    }

    #[test]
    fn fully_patient_line_lands_on_one_side_only() {
        let inv = invoice(DocStatus::Approved);
        let lines = vec![
            mixed_line(dec!(200.00), dec!(0.00), dec!(0.00)),
            mixed_line(dec!(300.00), dec!(0.00), dec!(300.00)),
        ];
        let plan = plan_split(&inv, &lines, false, false).unwrap();
        assert_eq!(plan.patient_lines.len(), 1);
        assert_eq!(plan.insurer_lines.len(), 1);
    }

    #[test]
    fn rejects_payments_without_migration_consent() {
        let inv = invoice(DocStatus::Posted);
        let lines = vec![mixed_line(dec!(500.00), dec!(0.00), dec!(200.00))];
        let err = plan_split(&inv, &lines, true, false).unwrap_err();
        assert!(matches!(err, LedgerError::BusinessRule(_)));
        assert!(plan_split(&inv, &lines, true, true).unwrap().migrate_payments);
    }

    #[test]
    fn rejects_pure_self_pay_invoice() {
        let inv = invoice(DocStatus::Approved);
        let lines = vec![mixed_line(dec!(500.00), dec!(0.00), dec!(0.00))];
        assert!(matches!(
            plan_split(&inv, &lines, false, false).unwrap_err(),
            LedgerError::BusinessRule(_)
        ));
    }

    #[test]
    fn draft_invoices_are_not_splittable() {
        let inv = invoice(DocStatus::Draft);
        let lines = vec![mixed_line(dec!(500.00), dec!(0.00), dec!(200.00))];
        assert!(matches!(
            plan_split(&inv, &lines, false, false).unwrap_err(),
            LedgerError::StateConflict(_)
        ));
    }
}
