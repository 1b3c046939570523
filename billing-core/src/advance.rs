//! Advance (deposit) wallet arithmetic.
//!
//! Advances are patient money held apart from invoices. The wallet never
//! offsets dues implicitly; application is always an explicit operation and
//! the balance can never go negative.

use crate::error::{LedgerError, LedgerResult};
use crate::model::{BillingAdvance, BillingAdvanceApplication};
use crate::money::round_money;
use crate::status::AdvanceEntryType;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Derived wallet state for one case.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvanceWallet {
    pub total_in: Decimal,
    pub total_refunded: Decimal,
    pub total_applied: Decimal,
    pub balance: Decimal,
}

/// Derive the wallet from the raw ledger rows.
pub fn wallet(
    entries: &[BillingAdvance],
    applications: &[BillingAdvanceApplication],
) -> AdvanceWallet {
    let mut w = AdvanceWallet::default();
    for entry in entries {
        match entry.entry_type {
            AdvanceEntryType::Advance => w.total_in += entry.amount,
            AdvanceEntryType::Refund => w.total_refunded += entry.amount,
            // Signed corrections posted by supervisors.
            AdvanceEntryType::Adjustment => w.total_in += entry.amount,
        }
    }
    w.total_applied = applications.iter().map(|a| a.amount).sum();
    w.balance = w.total_in - w.total_refunded - w.total_applied;
    w
}

/// A refund may not exceed the current balance.
pub fn ensure_refundable(wallet: &AdvanceWallet, amount: Decimal) -> LedgerResult<()> {
    let amount = round_money(amount);
    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation("refund amount must be positive".into()));
    }
    if amount > wallet.balance {
        return Err(LedgerError::BusinessRule(format!(
            "refund {} exceeds advance balance {}",
            amount, wallet.balance
        )));
    }
    Ok(())
}

/// Consumption of one advance entry, planned before any write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedConsumption {
    pub advance_id: Uuid,
    pub amount: Decimal,
}

/// Consume ADVANCE entries oldest-first until `amount` is fully accounted.
///
/// `entries` must carry every wallet row of the case; prior applications
/// reduce each entry's remaining capacity. A remainder after exhausting all
/// entries means the caller's balance validation and this plan disagree,
/// which is an engine bug.
pub fn plan_consumption(
    entries: &[BillingAdvance],
    applications: &[BillingAdvanceApplication],
    amount: Decimal,
) -> LedgerResult<Vec<PlannedConsumption>> {
    let amount = round_money(amount);
    if amount <= Decimal::ZERO {
        return Err(LedgerError::Validation("apply amount must be positive".into()));
    }

    let mut consumable: Vec<&BillingAdvance> = entries
        .iter()
        .filter(|e| e.entry_type == AdvanceEntryType::Advance)
        .collect();
    consumable.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut remaining = amount;
    let mut planned = Vec::new();
    for entry in consumable {
        if remaining <= Decimal::ZERO {
            break;
        }
        let already: Decimal = applications
            .iter()
            .filter(|a| a.advance_id == entry.id)
            .map(|a| a.amount)
            .sum();
        let capacity = entry.amount - already;
        if capacity <= Decimal::ZERO {
            continue;
        }
        let take = remaining.min(capacity);
        planned.push(PlannedConsumption {
            advance_id: entry.id,
            amount: take,
        });
        remaining -= take;
    }

    if remaining > Decimal::ZERO {
        tracing::error!(
            leftover = %remaining,
            amount = %amount,
            "advance consumption left an unaccounted remainder"
        );
        return Err(LedgerError::Invariant(format!(
            "advance consumption remainder {} after exhausting wallet",
            remaining
        )));
    }
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::PaymentMode;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn entry(entry_type: AdvanceEntryType, amount: Decimal, age_days: i64) -> BillingAdvance {
        BillingAdvance {
            id: Uuid::new_v4(),
            billing_case_id: Uuid::new_v4(),
            entry_type,
            mode: PaymentMode::Cash,
            amount,
            remarks: None,
            recorded_by: None,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    fn application(advance_id: Uuid, amount: Decimal) -> BillingAdvanceApplication {
        BillingAdvanceApplication {
            id: Uuid::new_v4(),
            advance_id,
            payment_id: Uuid::new_v4(),
            amount,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn balance_nets_refunds_and_applications() {
        let deposit = entry(AdvanceEntryType::Advance, dec!(500.00), 3);
        let refund = entry(AdvanceEntryType::Refund, dec!(100.00), 1);
        let apps = vec![application(deposit.id, dec!(150.00))];
        let w = wallet(&[deposit, refund], &apps);
        assert_eq!(w.total_in, dec!(500.00));
        assert_eq!(w.total_refunded, dec!(100.00));
        assert_eq!(w.total_applied, dec!(150.00));
        assert_eq!(w.balance, dec!(250.00));
    }

    #[test]
    fn refund_beyond_balance_is_rejected() {
        // Scenario E: balance 500.00, refund attempt 600.00.
        let w = wallet(&[entry(AdvanceEntryType::Advance, dec!(500.00), 1)], &[]);
        let err = ensure_refundable(&w, dec!(600.00)).unwrap_err();
        assert!(matches!(err, LedgerError::BusinessRule(_)));
        assert_eq!(w.balance, dec!(500.00));
    }

    #[test]
    fn consumes_oldest_entries_first() {
        let oldest = entry(AdvanceEntryType::Advance, dec!(200.00), 10);
        let newest = entry(AdvanceEntryType::Advance, dec!(300.00), 1);
        let planned = plan_consumption(&[newest.clone(), oldest.clone()], &[], dec!(250.00)).unwrap();
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].advance_id, oldest.id);
        assert_eq!(planned[0].amount, dec!(200.00));
        assert_eq!(planned[1].advance_id, newest.id);
        assert_eq!(planned[1].amount, dec!(50.00));
    }

    #[test]
    fn prior_applications_reduce_capacity() {
        let deposit = entry(AdvanceEntryType::Advance, dec!(200.00), 5);
        let apps = vec![application(deposit.id, dec!(180.00))];
        let planned = plan_consumption(&[deposit.clone()], &apps, dec!(20.00)).unwrap();
        assert_eq!(planned, vec![PlannedConsumption { advance_id: deposit.id, amount: dec!(20.00) }]);
    }

    #[test]
    fn overconsumption_is_an_invariant_error() {
        let deposit = entry(AdvanceEntryType::Advance, dec!(100.00), 5);
        let err = plan_consumption(&[deposit], &[], dec!(150.00)).unwrap_err();
        assert!(matches!(err, LedgerError::Invariant(_)));
    }

    #[test]
    fn applying_to_selected_invoices_leaves_the_residual_in_wallet() {
        use crate::allocation::{plan_allocation, select_targets, AllocationTarget};
        use crate::status::PayerBucket;
        use chrono::TimeZone;

        // Scenario C: wallet 500.00, apply 300.00 to two selected invoices
        // with patient dues 200.00 and 150.00 while an older 500.00 invoice
        // stays untouched.
        fn due(n: &str, outstanding: Decimal, day: u32) -> AllocationTarget {
            AllocationTarget {
                invoice_id: Uuid::new_v4(),
                invoice_number: n.to_string(),
                bucket: PayerBucket::Patient,
                outstanding,
                sort_at: chrono::Utc.with_ymd_and_hms(2026, 4, day, 9, 0, 0).unwrap(),
            }
        }

        let deposit = entry(AdvanceEntryType::Advance, dec!(500.00), 7);
        let older = due("INV-020", dec!(500.00), 1);
        let a = due("INV-021", dec!(200.00), 2);
        let b = due("INV-022", dec!(150.00), 3);

        let picked =
            select_targets(vec![older.clone(), a.clone(), b.clone()], &[a.invoice_id, b.invoice_id])
                .unwrap();
        let allocations = plan_allocation(&picked, dec!(300.00)).unwrap();
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].invoice_id, a.invoice_id);
        assert_eq!(allocations[0].amount, dec!(200.00));
        assert_eq!(allocations[1].invoice_id, b.invoice_id);
        assert_eq!(allocations[1].amount, dec!(100.00));
        assert!(allocations.iter().all(|p| p.invoice_id != older.invoice_id));

        let consumed = plan_consumption(&[deposit.clone()], &[], dec!(300.00)).unwrap();
        let apps: Vec<_> = consumed
            .iter()
            .map(|c| application(c.advance_id, c.amount))
            .collect();
        let w = wallet(&[deposit], &apps);
        assert_eq!(w.balance, dec!(200.00));
    }
}
