//! Charge-line arithmetic: totals, GST, and the insurer/patient split.

use crate::error::{LedgerError, LedgerResult};
use crate::model::{BillingInvoiceLine, BillingPaymentAllocation};
use crate::money::{clamp_money, round_money, round_qty};
use crate::status::{CoverageFlag, PayStatus, PayerBucket};
use rust_decimal::Decimal;

/// Monetary result of pricing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAmounts {
    pub qty: Decimal,
    pub gross: Decimal,
    pub discount_amount: Decimal,
    pub line_total: Decimal,
    pub tax_amount: Decimal,
    pub net_amount: Decimal,
    pub insurer_pay_amount: Decimal,
    pub patient_pay_amount: Decimal,
}

/// Price a line from its raw inputs.
///
/// `discount_percent` takes precedence over a flat `discount_amount` when
/// both are supplied. The insurer/patient split always satisfies
/// `insurer + patient == net`, each clamped to `[0, net]`.
pub fn compute_line(
    qty: Decimal,
    unit_price: Decimal,
    discount_percent: Decimal,
    discount_amount: Decimal,
    gst_rate: Decimal,
    coverage: CoverageFlag,
    approved_amount: Option<Decimal>,
) -> LedgerResult<LineAmounts> {
    if qty <= Decimal::ZERO {
        return Err(LedgerError::Validation("qty must be positive".into()));
    }
    if unit_price < Decimal::ZERO {
        return Err(LedgerError::Validation("unit_price must not be negative".into()));
    }
    if discount_percent < Decimal::ZERO || discount_percent > Decimal::ONE_HUNDRED {
        return Err(LedgerError::Validation(
            "discount_percent must be within 0..=100".into(),
        ));
    }
    if discount_amount < Decimal::ZERO {
        return Err(LedgerError::Validation("discount_amount must not be negative".into()));
    }
    if gst_rate < Decimal::ZERO || gst_rate > Decimal::ONE_HUNDRED {
        return Err(LedgerError::Validation("gst_rate must be within 0..=100".into()));
    }

    let qty = round_qty(qty);
    let gross = round_money(qty * unit_price);
    let discount = if discount_percent > Decimal::ZERO {
        round_money(gross * discount_percent / Decimal::ONE_HUNDRED)
    } else {
        round_money(discount_amount)
    };
    if discount > gross {
        return Err(LedgerError::Validation(format!(
            "discount {} exceeds line gross {}",
            discount, gross
        )));
    }

    let line_total = gross - discount;
    let tax_amount = round_money(line_total * gst_rate / Decimal::ONE_HUNDRED);
    let net_amount = line_total + tax_amount;

    let insurer_pay_amount = match coverage {
        CoverageFlag::NotCovered => Decimal::ZERO,
        CoverageFlag::Covered => clamp_money(approved_amount.unwrap_or(net_amount), net_amount),
        CoverageFlag::Partial => clamp_money(approved_amount.unwrap_or(Decimal::ZERO), net_amount),
    };
    let patient_pay_amount = net_amount - insurer_pay_amount;

    Ok(LineAmounts {
        qty,
        gross,
        discount_amount: discount,
        line_total,
        tax_amount,
        net_amount,
        insurer_pay_amount,
        patient_pay_amount,
    })
}

/// Derived invoice header totals.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvoiceTotals {
    pub sub_total: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub round_off: Decimal,
    pub grand_total: Decimal,
    pub insurer_due: Decimal,
    pub patient_due: Decimal,
}

/// Recompute header totals from active lines. Must run after every line
/// mutation; the grand total is by definition the sum of active nets.
pub fn recompute_totals(lines: &[BillingInvoiceLine]) -> InvoiceTotals {
    let mut totals = InvoiceTotals::default();
    for line in lines.iter().filter(|l| l.is_active()) {
        totals.sub_total += line.line_total + line.discount_amount;
        totals.discount_total += line.discount_amount;
        totals.tax_total += line.tax_amount;
        totals.grand_total += line.net_amount;
        totals.insurer_due += line.insurer_pay_amount;
        totals.patient_due += line.patient_pay_amount;
    }
    // Lines are individually rounded, so header arithmetic is exact.
    totals.round_off =
        totals.grand_total - (totals.sub_total - totals.discount_total + totals.tax_total);
    totals
}

/// Idempotency key tying a line to the external service event it bills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    pub source_module: String,
    pub source_ref_id: uuid::Uuid,
    pub source_line_key: String,
}

impl SourceKey {
    /// True when `line` already bills this external event.
    pub fn matches(&self, line: &BillingInvoiceLine) -> bool {
        line.is_active()
            && line.source_module.as_deref() == Some(self.source_module.as_str())
            && line.source_ref_id == Some(self.source_ref_id)
            && line.source_line_key.as_deref() == Some(self.source_line_key.as_str())
    }
}

/// Amount already allocated to one invoice for one bucket across ACTIVE
/// payments.
pub fn allocated_for_bucket(
    allocations: &[BillingPaymentAllocation],
    invoice_id: uuid::Uuid,
    bucket: PayerBucket,
) -> Decimal {
    allocations
        .iter()
        .filter(|a| {
            a.invoice_id == invoice_id && a.payer_bucket == bucket && a.status == PayStatus::Active
        })
        .map(|a| a.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn prices_a_gst_line() {
        // qty=2 @ 100.00, 5% GST
        let amounts = compute_line(
            dec!(2),
            dec!(100.00),
            Decimal::ZERO,
            Decimal::ZERO,
            dec!(5),
            CoverageFlag::NotCovered,
            None,
        )
        .unwrap();
        assert_eq!(amounts.line_total, dec!(200.00));
        assert_eq!(amounts.tax_amount, dec!(10.00));
        assert_eq!(amounts.net_amount, dec!(210.00));
        assert_eq!(amounts.patient_pay_amount, dec!(210.00));
        assert_eq!(amounts.insurer_pay_amount, dec!(0));
    }

    #[test]
    fn percent_discount_wins_over_flat() {
        let amounts = compute_line(
            dec!(1),
            dec!(100.00),
            dec!(10),
            dec!(50.00),
            Decimal::ZERO,
            CoverageFlag::NotCovered,
            None,
        )
        .unwrap();
        assert_eq!(amounts.discount_amount, dec!(10.00));
        assert_eq!(amounts.net_amount, dec!(90.00));
    }

    #[test]
    fn split_always_sums_to_net() {
        let amounts = compute_line(
            dec!(1),
            dec!(1000.00),
            Decimal::ZERO,
            Decimal::ZERO,
            dec!(12),
            CoverageFlag::Partial,
            Some(dec!(700.00)),
        )
        .unwrap();
        assert_eq!(amounts.net_amount, dec!(1120.00));
        assert_eq!(amounts.insurer_pay_amount, dec!(700.00));
        assert_eq!(amounts.patient_pay_amount, dec!(420.00));
        assert_eq!(
            amounts.insurer_pay_amount + amounts.patient_pay_amount,
            amounts.net_amount
        );
    }

    #[test]
    fn covered_approval_is_clamped_to_net() {
        let amounts = compute_line(
            dec!(1),
            dec!(100.00),
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            CoverageFlag::Covered,
            Some(dec!(500.00)),
        )
        .unwrap();
        assert_eq!(amounts.insurer_pay_amount, dec!(100.00));
        assert_eq!(amounts.patient_pay_amount, dec!(0.00));
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(compute_line(
            Decimal::ZERO,
            dec!(10),
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            CoverageFlag::NotCovered,
            None
        )
        .is_err());
        assert!(compute_line(
            dec!(1),
            dec!(10),
            dec!(101),
            Decimal::ZERO,
            Decimal::ZERO,
            CoverageFlag::NotCovered,
            None
        )
        .is_err());
        assert!(compute_line(
            dec!(1),
            dec!(10),
            Decimal::ZERO,
            dec!(11),
            Decimal::ZERO,
            CoverageFlag::NotCovered,
            None
        )
        .is_err());
    }
}
