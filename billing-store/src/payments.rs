//! Payments, allocations and the advance wallet.
//!
//! A payment is one money event against a case; allocation rows record how
//! it settles invoices, oldest first. Advance money lives in its own wallet
//! and only reaches invoices through an explicit apply operation, which is
//! itself recorded as an ADVANCE_ADJUSTMENT payment.

use crate::error::StoreResult;
use crate::rows::{AdvanceApplicationRow, AdvanceRow, AllocationRow, PaymentRow};
use crate::store::{LedgerStore, PgTx};
use audit_log::AuditRecord;
use billing_core::access::{perm, Actor};
use billing_core::advance::{plan_consumption, wallet};
use billing_core::allocation::{
    plan_allocation, select_targets, total_outstanding, AllocationTarget,
};
use billing_core::money::{is_positive, round_money};
use billing_core::{
    BillingAdvance, BillingAdvanceApplication, BillingPayment, BillingPaymentAllocation, DocStatus,
    DocType, LedgerError, PayStatus, PayerBucket, PaymentDirection, PaymentKind, PaymentMode,
    ResetPeriod,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Input for recording a receipt against a case.
#[derive(Debug, Clone)]
pub struct RecordPayment {
    pub billing_case_id: Uuid,
    pub payer_bucket: PayerBucket,
    pub payer_id: Option<Uuid>,
    pub mode: PaymentMode,
    pub amount: Decimal,
    /// When set, the receipt settles only this invoice.
    pub invoice_id: Option<Uuid>,
}

/// Input for an advance (deposit) wallet entry.
#[derive(Debug, Clone)]
pub struct RecordAdvance {
    pub billing_case_id: Uuid,
    pub mode: PaymentMode,
    pub amount: Decimal,
    pub remarks: Option<String>,
}

/// A payment together with the allocation rows it produced.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub payment: BillingPayment,
    pub allocations: Vec<BillingPaymentAllocation>,
}

impl LedgerStore {
    /// Record a receipt and settle it across the case's open invoices,
    /// oldest first, or against the one invoice named by `invoice_id`.
    /// Overpayment is rejected up front; receipts for more than the
    /// target's outstanding belong in the advance wallet.
    pub async fn record_payment(
        &self,
        actor: &Actor,
        input: RecordPayment,
    ) -> StoreResult<PaymentReceipt> {
        self.authorize(actor, perm::PAYMENT_RECORD)?;
        let amount = round_money(input.amount);
        if !is_positive(amount) {
            return Err(LedgerError::Validation("payment amount must be positive".into()).into());
        }

        let mut tx = self.begin().await?;
        self.lock_case_tx(&mut tx, input.billing_case_id).await?;

        let selection = input.invoice_id.map(|id| vec![id]);
        let targets = self
            .allocation_targets_tx(
                &mut tx,
                input.billing_case_id,
                input.payer_bucket,
                false,
                selection.as_deref(),
            )
            .await?;
        let open = total_outstanding(&targets);
        if amount > open {
            return Err(LedgerError::BusinessRule(format!(
                "payment {} exceeds outstanding {} for bucket {}; record the excess as an advance",
                amount,
                open,
                input.payer_bucket
            ))
            .into());
        }
        let planned = plan_allocation(&targets, amount)?;

        let payment = self
            .insert_payment_tx(
                &mut tx,
                actor,
                input.billing_case_id,
                input.invoice_id,
                input.payer_bucket,
                input.payer_id,
                input.mode,
                amount,
                PaymentKind::Receipt,
                json!({}),
            )
            .await?;
        let allocations = self
            .insert_allocations_tx(&mut tx, payment.id, &planned)
            .await?;
        tx.commit().await?;

        info!(
            receipt = %payment.receipt_number,
            amount = %payment.amount,
            bucket = %payment.payer_bucket,
            allocations = allocations.len(),
            "payment recorded"
        );
        self.emit_audit(
            AuditRecord::new("billing_payment", payment.id, "record")
                .with_new(serde_json::to_value(&payment)?)
                .by(actor.user_id),
        )
        .await;
        Ok(PaymentReceipt {
            payment,
            allocations,
        })
    }

    /// Void a receipt; its allocations void with it and the dues reopen.
    /// ADVANCE_ADJUSTMENT payments cannot be voided (the wallet money they
    /// consumed would be stranded); reverse those with a supervisor
    /// adjustment entry instead.
    pub async fn void_payment(
        &self,
        actor: &Actor,
        payment_id: Uuid,
        reason: &str,
    ) -> StoreResult<BillingPayment> {
        self.authorize(actor, perm::PAYMENT_VOID)?;
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation("void requires a reason".into()).into());
        }

        let mut tx = self.begin().await?;
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM billing_payments WHERE id = $1 FOR UPDATE",
        )
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::not_found("payment", payment_id))?;
        let payment = row.into_model()?;

        if payment.status == PayStatus::Void {
            return Err(LedgerError::StateConflict(format!(
                "receipt {} is already void",
                payment.receipt_number
            ))
            .into());
        }
        if payment.kind == PaymentKind::AdvanceAdjustment {
            return Err(LedgerError::BusinessRule(format!(
                "receipt {} is an advance adjustment and cannot be voided",
                payment.receipt_number
            ))
            .into());
        }

        let voided = sqlx::query_as::<_, PaymentRow>(
            "UPDATE billing_payments SET status = 'VOID', void_reason = $2 WHERE id = $1 RETURNING *",
        )
        .bind(payment_id)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?
        .into_model()?;
        sqlx::query("UPDATE billing_payment_allocations SET status = 'VOID' WHERE payment_id = $1")
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.emit_audit(
            AuditRecord::new("billing_payment", payment_id, "void")
                .with_old(json!({"status": "ACTIVE"}))
                .with_new(json!({"status": "VOID"}))
                .by(actor.user_id)
                .because(reason),
        )
        .await;
        Ok(voided)
    }

    pub async fn list_payments(&self, case_id: Uuid) -> StoreResult<Vec<BillingPayment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT * FROM billing_payments WHERE billing_case_id = $1 ORDER BY created_at, id",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await?;
        rows.into_iter().map(PaymentRow::into_model).collect()
    }

    pub async fn list_allocations(
        &self,
        payment_id: Uuid,
    ) -> StoreResult<Vec<BillingPaymentAllocation>> {
        let rows = sqlx::query_as::<_, AllocationRow>(
            "SELECT * FROM billing_payment_allocations WHERE payment_id = $1 ORDER BY created_at, id",
        )
        .bind(payment_id)
        .fetch_all(self.pool.pool())
        .await?;
        rows.into_iter().map(AllocationRow::into_model).collect()
    }

    /// Record an advance deposit into the case wallet.
    pub async fn record_advance(
        &self,
        actor: &Actor,
        input: RecordAdvance,
    ) -> StoreResult<BillingAdvance> {
        self.authorize(actor, perm::ADVANCE_RECORD)?;
        let amount = round_money(input.amount);
        if !is_positive(amount) {
            return Err(LedgerError::Validation("advance amount must be positive".into()).into());
        }
        // Existence check doubles as the foreign-key error upgrade.
        self.get_case(input.billing_case_id).await?;

        let row = sqlx::query_as::<_, AdvanceRow>(
            "INSERT INTO billing_advances (billing_case_id, entry_type, mode, amount, remarks, recorded_by) \
             VALUES ($1, 'ADVANCE', $2, $3, $4, $5) RETURNING *",
        )
        .bind(input.billing_case_id)
        .bind(input.mode.as_str())
        .bind(amount)
        .bind(&input.remarks)
        .bind(actor.user_id)
        .fetch_one(self.pool.pool())
        .await?;
        let advance = row.into_model()?;

        info!(case_id = %advance.billing_case_id, amount = %advance.amount, "advance recorded");
        self.emit_audit(
            AuditRecord::new("billing_advance", advance.id, "deposit")
                .with_new(serde_json::to_value(&advance)?)
                .by(actor.user_id),
        )
        .await;
        Ok(advance)
    }

    /// Refund part of the wallet balance to the patient. Serialized per
    /// case so two refunds cannot both pass the balance check.
    pub async fn refund_advance(
        &self,
        actor: &Actor,
        case_id: Uuid,
        amount: Decimal,
        mode: PaymentMode,
        remarks: Option<String>,
    ) -> StoreResult<BillingAdvance> {
        self.authorize(actor, perm::ADVANCE_REFUND)?;
        let amount = round_money(amount);

        let mut tx = self.begin().await?;
        self.lock_case_tx(&mut tx, case_id).await?;
        let entries = self.load_advances_tx(&mut tx, case_id).await?;
        let applications = self.load_applications_tx(&mut tx, case_id).await?;
        let w = wallet(&entries, &applications);
        billing_core::advance::ensure_refundable(&w, amount)?;

        let row = sqlx::query_as::<_, AdvanceRow>(
            "INSERT INTO billing_advances (billing_case_id, entry_type, mode, amount, remarks, recorded_by) \
             VALUES ($1, 'REFUND', $2, $3, $4, $5) RETURNING *",
        )
        .bind(case_id)
        .bind(mode.as_str())
        .bind(amount)
        .bind(&remarks)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let refund = row.into_model()?;

        info!(case_id = %case_id, amount = %amount, balance = %w.balance, "advance refunded");
        self.emit_audit(
            AuditRecord::new("billing_advance", refund.id, "refund")
                .with_old(json!({"balance": w.balance}))
                .with_new(serde_json::to_value(&refund)?)
                .by(actor.user_id),
        )
        .await;
        Ok(refund)
    }

    /// Explicitly apply wallet money to the patient dues of the selected
    /// invoices, oldest of the selection first.
    ///
    /// Creates one ADVANCE_ADJUSTMENT payment whose allocations settle the
    /// selected invoices, and application rows that pin the consumed amount
    /// to concrete wallet entries. Every selected invoice must be an open
    /// patient-due invoice of the case that accepts patient advances; the
    /// amount is bounded by the selection's dues, not the whole case.
    pub async fn apply_advances(
        &self,
        actor: &Actor,
        case_id: Uuid,
        invoice_ids: &[Uuid],
        amount: Decimal,
    ) -> StoreResult<PaymentReceipt> {
        self.authorize(actor, perm::ADVANCE_APPLY)?;
        let amount = round_money(amount);
        if !is_positive(amount) {
            return Err(LedgerError::Validation("apply amount must be positive".into()).into());
        }

        let mut tx = self.begin().await?;
        self.lock_case_tx(&mut tx, case_id).await?;

        let entries = self.load_advances_tx(&mut tx, case_id).await?;
        let applications = self.load_applications_tx(&mut tx, case_id).await?;
        let w = wallet(&entries, &applications);
        if amount > w.balance {
            return Err(LedgerError::BusinessRule(format!(
                "apply amount {} exceeds advance balance {}",
                amount, w.balance
            ))
            .into());
        }

        let targets = self
            .allocation_targets_tx(&mut tx, case_id, PayerBucket::Patient, true, Some(invoice_ids))
            .await?;
        let open = total_outstanding(&targets);
        if amount > open {
            return Err(LedgerError::BusinessRule(format!(
                "apply amount {} exceeds the selected invoices' patient dues {}",
                amount, open
            ))
            .into());
        }

        let planned_allocs = plan_allocation(&targets, amount)?;
        let planned_consumption = plan_consumption(&entries, &applications, amount)?;

        let payment = self
            .insert_payment_tx(
                &mut tx,
                actor,
                case_id,
                None,
                PayerBucket::Patient,
                None,
                PaymentMode::Advance,
                amount,
                PaymentKind::AdvanceAdjustment,
                json!({"advance_application": true}),
            )
            .await?;
        let allocations = self
            .insert_allocations_tx(&mut tx, payment.id, &planned_allocs)
            .await?;
        for consumed in &planned_consumption {
            sqlx::query(
                "INSERT INTO billing_advance_applications (advance_id, payment_id, amount) \
                 VALUES ($1, $2, $3)",
            )
            .bind(consumed.advance_id)
            .bind(payment.id)
            .bind(consumed.amount)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(
            case_id = %case_id,
            amount = %amount,
            receipt = %payment.receipt_number,
            entries = planned_consumption.len(),
            "advance applied to dues"
        );
        self.emit_audit(
            AuditRecord::new("billing_payment", payment.id, "advance_apply")
                .with_old(json!({"wallet_balance": w.balance}))
                .with_new(serde_json::to_value(&payment)?)
                .by(actor.user_id),
        )
        .await;
        Ok(PaymentReceipt {
            payment,
            allocations,
        })
    }

    pub async fn list_advances(&self, case_id: Uuid) -> StoreResult<Vec<BillingAdvance>> {
        let rows = sqlx::query_as::<_, AdvanceRow>(
            "SELECT * FROM billing_advances WHERE billing_case_id = $1 ORDER BY created_at, id",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await?;
        rows.into_iter().map(AdvanceRow::into_model).collect()
    }

    // ---- transaction-scoped helpers ----

    /// Serialize financial operations per case.
    pub(crate) async fn lock_case_tx(&self, tx: &mut PgTx<'_>, case_id: Uuid) -> StoreResult<()> {
        let found: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM billing_cases WHERE id = $1 FOR UPDATE")
                .bind(case_id)
                .fetch_optional(&mut **tx)
                .await?;
        found
            .map(|_| ())
            .ok_or_else(|| LedgerError::not_found("billing_case", case_id).into())
    }

    /// Settleable invoices of a case with their outstanding for `bucket`.
    ///
    /// `selection` narrows the result to the named invoices; an id that is
    /// not an open, eligible target of the case is rejected.
    pub(crate) async fn allocation_targets_tx(
        &self,
        tx: &mut PgTx<'_>,
        case_id: Uuid,
        bucket: PayerBucket,
        advance_eligible_only: bool,
        selection: Option<&[Uuid]>,
    ) -> StoreResult<Vec<AllocationTarget>> {
        let rows = sqlx::query_as::<_, crate::rows::InvoiceRow>(
            "SELECT * FROM billing_invoices \
             WHERE billing_case_id = $1 AND status IN ('APPROVED', 'POSTED') \
             ORDER BY created_at, id FOR UPDATE",
        )
        .bind(case_id)
        .fetch_all(&mut **tx)
        .await?;

        let mut targets = Vec::new();
        for row in rows {
            let invoice = row.into_model()?;
            debug_assert!(matches!(
                invoice.status,
                DocStatus::Approved | DocStatus::Posted
            ));
            if advance_eligible_only && !invoice.accepts_patient_advance {
                continue;
            }
            let outstanding = self.outstanding_tx(tx, &invoice, bucket).await?;
            if outstanding <= Decimal::ZERO {
                continue;
            }
            let (sort_at, _) = invoice.settlement_sort_key();
            targets.push(AllocationTarget {
                invoice_id: invoice.id,
                invoice_number: invoice.invoice_number,
                bucket,
                outstanding,
                sort_at,
            });
        }
        match selection {
            Some(selected) => Ok(select_targets(targets, selected)?),
            None => Ok(targets),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn insert_payment_tx(
        &self,
        tx: &mut PgTx<'_>,
        actor: &Actor,
        case_id: Uuid,
        invoice_id: Option<Uuid>,
        bucket: PayerBucket,
        payer_id: Option<Uuid>,
        mode: PaymentMode,
        amount: Decimal,
        kind: PaymentKind,
        meta: serde_json::Value,
    ) -> StoreResult<BillingPayment> {
        let receipt_number = self
            .next_document_number(tx, DocType::Receipt, "RCP-", ResetPeriod::Year, 6)
            .await?;
        let row = sqlx::query_as::<_, PaymentRow>(
            "INSERT INTO billing_payments \
             (billing_case_id, invoice_id, payer_bucket, payer_id, mode, amount, kind, direction, \
              receipt_number, received_by, received_at, meta) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
        )
        .bind(case_id)
        .bind(invoice_id)
        .bind(bucket.as_str())
        .bind(payer_id)
        .bind(mode.as_str())
        .bind(amount)
        .bind(kind.as_str())
        .bind(PaymentDirection::In.as_str())
        .bind(&receipt_number)
        .bind(actor.user_id)
        .bind(Utc::now())
        .bind(meta)
        .fetch_one(&mut **tx)
        .await?;
        row.into_model()
    }

    pub(crate) async fn insert_allocations_tx(
        &self,
        tx: &mut PgTx<'_>,
        payment_id: Uuid,
        planned: &[billing_core::allocation::PlannedAllocation],
    ) -> StoreResult<Vec<BillingPaymentAllocation>> {
        let mut saved = Vec::with_capacity(planned.len());
        for p in planned {
            let row = sqlx::query_as::<_, AllocationRow>(
                "INSERT INTO billing_payment_allocations (payment_id, invoice_id, payer_bucket, amount) \
                 VALUES ($1, $2, $3, $4) RETURNING *",
            )
            .bind(payment_id)
            .bind(p.invoice_id)
            .bind(p.bucket.as_str())
            .bind(p.amount)
            .fetch_one(&mut **tx)
            .await?;
            saved.push(row.into_model()?);
        }
        Ok(saved)
    }

    pub(crate) async fn load_advances_tx(
        &self,
        tx: &mut PgTx<'_>,
        case_id: Uuid,
    ) -> StoreResult<Vec<BillingAdvance>> {
        let rows = sqlx::query_as::<_, AdvanceRow>(
            "SELECT * FROM billing_advances WHERE billing_case_id = $1 ORDER BY created_at, id",
        )
        .bind(case_id)
        .fetch_all(&mut **tx)
        .await?;
        rows.into_iter().map(AdvanceRow::into_model).collect()
    }

    pub(crate) async fn load_applications_tx(
        &self,
        tx: &mut PgTx<'_>,
        case_id: Uuid,
    ) -> StoreResult<Vec<BillingAdvanceApplication>> {
        let rows = sqlx::query_as::<_, AdvanceApplicationRow>(
            "SELECT ap.* FROM billing_advance_applications ap \
             JOIN billing_advances ad ON ad.id = ap.advance_id \
             WHERE ad.billing_case_id = $1",
        )
        .bind(case_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows
            .into_iter()
            .map(AdvanceApplicationRow::into_model)
            .collect())
    }
}
