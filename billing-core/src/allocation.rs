//! The sequential settlement allocator.
//!
//! Payment recording, advance application and claim settlement all settle a
//! single amount across an ordered list of invoices; this is the one shared
//! implementation. Targets are consumed oldest-first and each allocation is
//! capped by the target's outstanding balance.

use crate::error::{LedgerError, LedgerResult};
use crate::money::round_money;
use crate::status::PayerBucket;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// One invoice eligible to receive part of a settlement.
#[derive(Debug, Clone)]
pub struct AllocationTarget {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub bucket: PayerBucket,
    /// Due for this bucket minus amount already allocated by active payments.
    pub outstanding: Decimal,
    /// posted_at falling back to created_at; ties broken by invoice id.
    pub sort_at: DateTime<Utc>,
}

/// A planned allocation row, produced before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAllocation {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub bucket: PayerBucket,
    pub amount: Decimal,
}

/// Restrict targets to an explicit invoice selection.
///
/// Every selected id must name an open target; an id that is settled, void
/// or foreign to the case is rejected rather than silently skipped, so a
/// clerk learns the selection is stale instead of paying other invoices.
pub fn select_targets(
    targets: Vec<AllocationTarget>,
    selected: &[Uuid],
) -> LedgerResult<Vec<AllocationTarget>> {
    if selected.is_empty() {
        return Err(LedgerError::Validation(
            "invoice selection must not be empty".into(),
        ));
    }
    for id in selected {
        if !targets.iter().any(|t| t.invoice_id == *id) {
            return Err(LedgerError::BusinessRule(format!(
                "invoice {} is not an open target for this operation",
                id
            )));
        }
    }
    Ok(targets
        .into_iter()
        .filter(|t| selected.contains(&t.invoice_id))
        .collect())
}

/// Total outstanding across targets.
pub fn total_outstanding(targets: &[AllocationTarget]) -> Decimal {
    targets
        .iter()
        .map(|t| t.outstanding.max(Decimal::ZERO))
        .sum()
}

/// Allocate `amount` across `targets`, oldest invoice first.
///
/// The caller validates the amount against `total_outstanding` beforehand
/// (receipts must not overpay); any remainder left after exhausting every
/// target is therefore an internal inconsistency, and the whole operation
/// must abort.
pub fn plan_allocation(
    targets: &[AllocationTarget],
    amount: Decimal,
) -> LedgerResult<Vec<PlannedAllocation>> {
    let amount = round_money(amount);
    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation("amount must be positive".into()));
    }

    let mut ordered: Vec<&AllocationTarget> = targets.iter().collect();
    ordered.sort_by(|a, b| {
        a.sort_at
            .cmp(&b.sort_at)
            .then_with(|| a.invoice_id.cmp(&b.invoice_id))
    });

    let mut remaining = amount;
    let mut planned = Vec::new();
    for target in ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        let outstanding = round_money(target.outstanding);
        if outstanding <= Decimal::ZERO {
            continue;
        }
        let take = remaining.min(outstanding);
        planned.push(PlannedAllocation {
            invoice_id: target.invoice_id,
            invoice_number: target.invoice_number.clone(),
            bucket: target.bucket,
            amount: take,
        });
        remaining -= take;
    }

    if remaining > Decimal::ZERO {
        tracing::error!(
            leftover = %remaining,
            amount = %amount,
            targets = targets.len(),
            "allocation left an unassigned remainder after pre-validation"
        );
        return Err(LedgerError::Invariant(format!(
            "allocation remainder {} not absorbed by {} target(s)",
            remaining,
            targets.len()
        )));
    }

    debug_assert_eq!(planned.iter().map(|p| p.amount).sum::<Decimal>(), amount);
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn target(n: &str, outstanding: Decimal, day: u32) -> AllocationTarget {
        AllocationTarget {
            invoice_id: Uuid::new_v4(),
            invoice_number: n.to_string(),
            bucket: PayerBucket::Patient,
            outstanding,
            sort_at: Utc.with_ymd_and_hms(2026, 3, day, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn settles_oldest_invoice_first() {
        // Scenario B: dues 100.00 and 50.00, one 120.00 payment.
        let older = target("INV-001", dec!(100.00), 1);
        let newer = target("INV-002", dec!(50.00), 2);
        let planned = plan_allocation(&[newer.clone(), older.clone()], dec!(120.00)).unwrap();
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].invoice_id, older.invoice_id);
        assert_eq!(planned[0].amount, dec!(100.00));
        assert_eq!(planned[1].invoice_id, newer.invoice_id);
        assert_eq!(planned[1].amount, dec!(20.00));
    }

    #[test]
    fn exact_payment_leaves_zero_outstanding() {
        let t = target("INV-003", dec!(210.00), 1);
        let planned = plan_allocation(&[t], dec!(210.00)).unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].amount, dec!(210.00));
    }

    #[test]
    fn skips_settled_targets() {
        let settled = target("INV-004", dec!(0.00), 1);
        let open = target("INV-005", dec!(75.00), 2);
        let planned = plan_allocation(&[settled, open.clone()], dec!(75.00)).unwrap();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].invoice_id, open.invoice_id);
    }

    #[test]
    fn remainder_is_an_invariant_error() {
        let t = target("INV-006", dec!(50.00), 1);
        let err = plan_allocation(&[t], dec!(60.00)).unwrap_err();
        assert!(matches!(err, LedgerError::Invariant(_)));
    }

    #[test]
    fn allocations_sum_to_amount() {
        let targets = vec![
            target("A", dec!(33.33), 1),
            target("B", dec!(33.33), 2),
            target("C", dec!(33.34), 3),
        ];
        let planned = plan_allocation(&targets, dec!(100.00)).unwrap();
        let sum: Decimal = planned.iter().map(|p| p.amount).sum();
        assert_eq!(sum, dec!(100.00));
    }

    #[test]
    fn rejects_non_positive_amount() {
        let t = target("INV-007", dec!(10.00), 1);
        assert!(plan_allocation(&[t], Decimal::ZERO).is_err());
    }

    #[test]
    fn selection_restricts_to_the_named_invoices() {
        let older = target("INV-010", dec!(500.00), 1);
        let a = target("INV-011", dec!(200.00), 2);
        let b = target("INV-012", dec!(150.00), 3);
        let picked = select_targets(
            vec![older.clone(), a.clone(), b.clone()],
            &[a.invoice_id, b.invoice_id],
        )
        .unwrap();
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|t| t.invoice_id != older.invoice_id));

        // The money must land on the selection, not the case's oldest due.
        let planned = plan_allocation(&picked, dec!(300.00)).unwrap();
        assert_eq!(planned[0].invoice_id, a.invoice_id);
        assert_eq!(planned[0].amount, dec!(200.00));
        assert_eq!(planned[1].invoice_id, b.invoice_id);
        assert_eq!(planned[1].amount, dec!(100.00));
    }

    #[test]
    fn single_invoice_selection_caps_at_that_invoice() {
        let only = target("INV-013", dec!(80.00), 1);
        let other = target("INV-014", dec!(900.00), 2);
        let picked = select_targets(vec![only.clone(), other], &[only.invoice_id]).unwrap();
        assert_eq!(total_outstanding(&picked), dec!(80.00));
        let err = plan_allocation(&picked, dec!(100.00)).unwrap_err();
        assert!(matches!(err, LedgerError::Invariant(_)));
    }

    #[test]
    fn selecting_an_unknown_invoice_is_rejected() {
        let open = target("INV-015", dec!(50.00), 1);
        let err = select_targets(vec![open], &[Uuid::new_v4()]).unwrap_err();
        assert!(matches!(err, LedgerError::BusinessRule(_)));
    }

    #[test]
    fn empty_selection_is_rejected() {
        let open = target("INV-016", dec!(50.00), 1);
        let err = select_targets(vec![open], &[]).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}
