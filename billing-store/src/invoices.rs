//! Invoices and charge lines: creation, idempotent line capture from
//! service modules, the approval/posting/void lifecycle, and the
//! edit-after-approval workflow.

use crate::error::StoreResult;
use crate::rows::{EditRequestRow, InvoiceLineRow, InvoiceRow};
use crate::store::{LedgerStore, PgTx};
use audit_log::AuditRecord;
use billing_core::access::{perm, Actor};
use billing_core::invoice as lifecycle;
use billing_core::lines::{compute_line, recompute_totals, SourceKey};
use billing_core::{
    BillingInvoice, BillingInvoiceLine, CoverageFlag, DocStatus, DocType, InvoiceEditRequest,
    InvoiceType, LedgerError, PayerKind, ResetPeriod, ServiceGroup,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Input for creating a draft invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub billing_case_id: Uuid,
    pub module: String,
    pub invoice_type: InvoiceType,
    pub payer_kind: Option<PayerKind>,
    pub payer_id: Option<Uuid>,
    pub service_date: DateTime<Utc>,
}

/// Pricing inputs shared by source-module and manual lines.
#[derive(Debug, Clone)]
pub struct NewLine {
    pub service_group: ServiceGroup,
    pub description: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub gst_rate: Decimal,
    pub is_covered: CoverageFlag,
    pub approved_amount: Option<Decimal>,
    pub requires_preauth: bool,
}

impl LedgerStore {
    pub async fn create_invoice(
        &self,
        actor: &Actor,
        input: CreateInvoice,
    ) -> StoreResult<BillingInvoice> {
        self.authorize(actor, perm::INVOICE_WRITE)?;
        let case = self.get_case(input.billing_case_id).await?;

        let mut tx = self.begin().await?;
        let number = self
            .next_document_number(&mut tx, DocType::Invoice, "INV-", ResetPeriod::Year, 6)
            .await?;
        // Insurer-billed invoices never absorb patient deposits.
        let accepts_patient_advance = input.invoice_type == InvoiceType::Patient;

        let row = sqlx::query_as::<_, InvoiceRow>(
            "INSERT INTO billing_invoices \
             (billing_case_id, invoice_number, module, invoice_type, payer_kind, payer_id, \
              accepts_patient_advance, service_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(case.id)
        .bind(&number)
        .bind(&input.module)
        .bind(input.invoice_type.as_str())
        .bind(input.payer_kind.map(|k| k.as_str()))
        .bind(input.payer_id)
        .bind(accepts_patient_advance)
        .bind(input.service_date)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        let invoice = row.into_model()?;
        info!(invoice_number = %invoice.invoice_number, case = %case.case_number, "invoice created");
        self.emit_audit(
            AuditRecord::new("billing_invoice", invoice.id, "create")
                .with_new(serde_json::to_value(&invoice)?)
                .by(actor.user_id),
        )
        .await;
        Ok(invoice)
    }

    pub async fn get_invoice(&self, invoice_id: Uuid) -> StoreResult<BillingInvoice> {
        let row = sqlx::query_as::<_, InvoiceRow>("SELECT * FROM billing_invoices WHERE id = $1")
            .bind(invoice_id)
            .fetch_optional(self.pool.pool())
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice", invoice_id))?;
        row.into_model()
    }

    pub async fn list_invoices(&self, case_id: Uuid) -> StoreResult<Vec<BillingInvoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(
            "SELECT * FROM billing_invoices WHERE billing_case_id = $1 ORDER BY created_at, id",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await?;
        rows.into_iter().map(InvoiceRow::into_model).collect()
    }

    pub async fn list_lines(&self, invoice_id: Uuid) -> StoreResult<Vec<BillingInvoiceLine>> {
        let rows = sqlx::query_as::<_, InvoiceLineRow>(
            "SELECT * FROM billing_invoice_lines WHERE invoice_id = $1 ORDER BY created_at, id",
        )
        .bind(invoice_id)
        .fetch_all(self.pool.pool())
        .await?;
        rows.into_iter().map(InvoiceLineRow::into_model).collect()
    }

    /// Idempotent line capture from a service module.
    ///
    /// Keyed by `(source_module, source_ref_id, source_line_key)`: the
    /// first call inserts, repeat calls re-price the same line. A given
    /// external event can never produce two active lines.
    pub async fn add_source_line(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        key: SourceKey,
        line: NewLine,
    ) -> StoreResult<BillingInvoiceLine> {
        self.authorize(actor, perm::INVOICE_WRITE)?;
        let mut tx = self.begin().await?;
        let invoice = self.load_invoice_tx(&mut tx, invoice_id, true).await?;
        self.ensure_editable_tx(&mut tx, &invoice).await?;

        let amounts = compute_line(
            line.qty,
            line.unit_price,
            line.discount_percent,
            line.discount_amount,
            line.gst_rate,
            line.is_covered,
            line.approved_amount,
        )?;

        let existing = sqlx::query_as::<_, InvoiceLineRow>(
            "SELECT * FROM billing_invoice_lines \
             WHERE source_module = $1 AND source_ref_id = $2 AND source_line_key = $3 \
               AND NOT is_deleted FOR UPDATE",
        )
        .bind(&key.source_module)
        .bind(key.source_ref_id)
        .bind(&key.source_line_key)
        .fetch_optional(&mut *tx)
        .await?;

        let saved = if let Some(row) = existing {
            let prior = row.into_model()?;
            let updated = sqlx::query_as::<_, InvoiceLineRow>(
                "UPDATE billing_invoice_lines SET \
                 service_group = $2, description = $3, qty = $4, unit_price = $5, \
                 discount_percent = $6, discount_amount = $7, gst_rate = $8, tax_amount = $9, \
                 line_total = $10, net_amount = $11, is_covered = $12, approved_amount = $13, \
                 insurer_pay_amount = $14, patient_pay_amount = $15, requires_preauth = $16, \
                 updated_at = now() WHERE id = $1 RETURNING *",
            )
            .bind(prior.id)
            .bind(line.service_group.as_str())
            .bind(&line.description)
            .bind(amounts.qty)
            .bind(line.unit_price)
            .bind(line.discount_percent)
            .bind(amounts.discount_amount)
            .bind(line.gst_rate)
            .bind(amounts.tax_amount)
            .bind(amounts.line_total)
            .bind(amounts.net_amount)
            .bind(line.is_covered.as_str())
            .bind(line.approved_amount)
            .bind(amounts.insurer_pay_amount)
            .bind(amounts.patient_pay_amount)
            .bind(line.requires_preauth)
            .fetch_one(&mut *tx)
            .await?
            .into_model()?;
            self.refresh_totals_tx(&mut tx, prior.invoice_id).await?;
            tx.commit().await?;

            self.emit_audit(
                AuditRecord::new("billing_invoice_line", updated.id, "source_reprice")
                    .with_old(serde_json::to_value(&prior)?)
                    .with_new(serde_json::to_value(&updated)?)
                    .by(actor.user_id),
            )
            .await;
            updated
        } else {
            let inserted = sqlx::query_as::<_, InvoiceLineRow>(
                "INSERT INTO billing_invoice_lines \
                 (invoice_id, service_group, description, qty, unit_price, discount_percent, \
                  discount_amount, gst_rate, tax_amount, line_total, net_amount, is_covered, \
                  approved_amount, insurer_pay_amount, patient_pay_amount, requires_preauth, \
                  source_module, source_ref_id, source_line_key) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19) \
                 RETURNING *",
            )
            .bind(invoice.id)
            .bind(line.service_group.as_str())
            .bind(&line.description)
            .bind(amounts.qty)
            .bind(line.unit_price)
            .bind(line.discount_percent)
            .bind(amounts.discount_amount)
            .bind(line.gst_rate)
            .bind(amounts.tax_amount)
            .bind(amounts.line_total)
            .bind(amounts.net_amount)
            .bind(line.is_covered.as_str())
            .bind(line.approved_amount)
            .bind(amounts.insurer_pay_amount)
            .bind(amounts.patient_pay_amount)
            .bind(line.requires_preauth)
            .bind(&key.source_module)
            .bind(key.source_ref_id)
            .bind(&key.source_line_key)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                Self::concurrency_on_conflict(e.into(), "source line")
            })?
            .into_model()?;
            self.refresh_totals_tx(&mut tx, invoice.id).await?;
            tx.commit().await?;

            self.emit_audit(
                AuditRecord::new("billing_invoice_line", inserted.id, "source_capture")
                    .with_new(serde_json::to_value(&inserted)?)
                    .by(actor.user_id),
            )
            .await;
            inserted
        };
        Ok(saved)
    }

    /// Human-added line; requires a reason.
    pub async fn add_manual_line(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        line: NewLine,
        reason: &str,
    ) -> StoreResult<BillingInvoiceLine> {
        self.authorize(actor, perm::INVOICE_WRITE)?;
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation("manual lines require a reason".into()).into());
        }
        let mut tx = self.begin().await?;
        let invoice = self.load_invoice_tx(&mut tx, invoice_id, true).await?;
        self.ensure_editable_tx(&mut tx, &invoice).await?;

        let amounts = compute_line(
            line.qty,
            line.unit_price,
            line.discount_percent,
            line.discount_amount,
            line.gst_rate,
            line.is_covered,
            line.approved_amount,
        )?;

        let inserted = sqlx::query_as::<_, InvoiceLineRow>(
            "INSERT INTO billing_invoice_lines \
             (invoice_id, service_group, description, qty, unit_price, discount_percent, \
              discount_amount, gst_rate, tax_amount, line_total, net_amount, is_covered, \
              approved_amount, insurer_pay_amount, patient_pay_amount, requires_preauth, \
              is_manual, manual_reason) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,TRUE,$17) \
             RETURNING *",
        )
        .bind(invoice.id)
        .bind(line.service_group.as_str())
        .bind(&line.description)
        .bind(amounts.qty)
        .bind(line.unit_price)
        .bind(line.discount_percent)
        .bind(amounts.discount_amount)
        .bind(line.gst_rate)
        .bind(amounts.tax_amount)
        .bind(amounts.line_total)
        .bind(amounts.net_amount)
        .bind(line.is_covered.as_str())
        .bind(line.approved_amount)
        .bind(amounts.insurer_pay_amount)
        .bind(amounts.patient_pay_amount)
        .bind(line.requires_preauth)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?
        .into_model()?;
        self.refresh_totals_tx(&mut tx, invoice.id).await?;
        tx.commit().await?;

        self.emit_audit(
            AuditRecord::new("billing_invoice_line", inserted.id, "manual_add")
                .with_new(serde_json::to_value(&inserted)?)
                .by(actor.user_id)
                .because(reason),
        )
        .await;
        Ok(inserted)
    }

    /// Re-price an existing line. Audited with old/new snapshots.
    pub async fn update_line(
        &self,
        actor: &Actor,
        line_id: Uuid,
        line: NewLine,
        reason: &str,
    ) -> StoreResult<BillingInvoiceLine> {
        self.authorize(actor, perm::INVOICE_WRITE)?;
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation("line edits require a reason".into()).into());
        }
        let mut tx = self.begin().await?;
        let prior = self.load_line_tx(&mut tx, line_id).await?;
        let invoice = self.load_invoice_tx(&mut tx, prior.invoice_id, true).await?;
        self.ensure_editable_tx(&mut tx, &invoice).await?;

        let amounts = compute_line(
            line.qty,
            line.unit_price,
            line.discount_percent,
            line.discount_amount,
            line.gst_rate,
            line.is_covered,
            line.approved_amount,
        )?;

        let updated = sqlx::query_as::<_, InvoiceLineRow>(
            "UPDATE billing_invoice_lines SET \
             service_group = $2, description = $3, qty = $4, unit_price = $5, \
             discount_percent = $6, discount_amount = $7, gst_rate = $8, tax_amount = $9, \
             line_total = $10, net_amount = $11, is_covered = $12, approved_amount = $13, \
             insurer_pay_amount = $14, patient_pay_amount = $15, requires_preauth = $16, \
             updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(line_id)
        .bind(line.service_group.as_str())
        .bind(&line.description)
        .bind(amounts.qty)
        .bind(line.unit_price)
        .bind(line.discount_percent)
        .bind(amounts.discount_amount)
        .bind(line.gst_rate)
        .bind(amounts.tax_amount)
        .bind(amounts.line_total)
        .bind(amounts.net_amount)
        .bind(line.is_covered.as_str())
        .bind(line.approved_amount)
        .bind(amounts.insurer_pay_amount)
        .bind(amounts.patient_pay_amount)
        .bind(line.requires_preauth)
        .fetch_one(&mut *tx)
        .await?
        .into_model()?;
        self.refresh_totals_tx(&mut tx, invoice.id).await?;
        tx.commit().await?;

        self.emit_audit(
            AuditRecord::new("billing_invoice_line", line_id, "update")
                .with_old(serde_json::to_value(&prior)?)
                .with_new(serde_json::to_value(&updated)?)
                .by(actor.user_id)
                .because(reason),
        )
        .await;
        Ok(updated)
    }

    /// Soft-delete a line; it drops out of every aggregate.
    pub async fn delete_line(&self, actor: &Actor, line_id: Uuid, reason: &str) -> StoreResult<()> {
        self.authorize(actor, perm::INVOICE_WRITE)?;
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation("line deletion requires a reason".into()).into());
        }
        let mut tx = self.begin().await?;
        let prior = self.load_line_tx(&mut tx, line_id).await?;
        if prior.is_deleted {
            return Err(LedgerError::StateConflict("line is already deleted".into()).into());
        }
        let invoice = self.load_invoice_tx(&mut tx, prior.invoice_id, true).await?;
        self.ensure_editable_tx(&mut tx, &invoice).await?;

        sqlx::query(
            "UPDATE billing_invoice_lines SET is_deleted = TRUE, updated_at = now() WHERE id = $1",
        )
        .bind(line_id)
        .execute(&mut *tx)
        .await?;
        self.refresh_totals_tx(&mut tx, invoice.id).await?;
        tx.commit().await?;

        self.emit_audit(
            AuditRecord::new("billing_invoice_line", line_id, "delete")
                .with_old(serde_json::to_value(&prior)?)
                .by(actor.user_id)
                .because(reason),
        )
        .await;
        Ok(())
    }

    pub async fn approve_invoice(&self, actor: &Actor, invoice_id: Uuid) -> StoreResult<BillingInvoice> {
        self.authorize(actor, perm::INVOICE_APPROVE)?;
        let mut tx = self.begin().await?;
        let invoice = self.load_invoice_tx(&mut tx, invoice_id, true).await?;
        let lines = self.load_lines_tx(&mut tx, invoice_id).await?;
        lifecycle::ensure_approvable(&invoice, &lines)?;

        let row = sqlx::query_as::<_, InvoiceRow>(
            "UPDATE billing_invoices SET status = 'APPROVED', approved_at = now(), \
             approved_by = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(invoice_id)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let approved = row.into_model()?;

        self.emit_audit(
            AuditRecord::new("billing_invoice", invoice_id, "approve")
                .with_old(json!({"status": invoice.status.as_str()}))
                .with_new(json!({"status": "APPROVED"}))
                .by(actor.user_id),
        )
        .await;
        Ok(approved)
    }

    /// Post an invoice: the preauthorization gate, then auto-maintenance of
    /// the draft claim when insurer-payable lines exist.
    pub async fn post_invoice(&self, actor: &Actor, invoice_id: Uuid) -> StoreResult<BillingInvoice> {
        self.authorize(actor, perm::INVOICE_POST)?;
        let mut tx = self.begin().await?;
        let invoice = self.load_invoice_tx(&mut tx, invoice_id, true).await?;
        let lines = self.load_lines_tx(&mut tx, invoice_id).await?;

        let insurance = self
            .load_insurance_case_tx(&mut tx, invoice.billing_case_id)
            .await?;
        let preauths = match &insurance {
            Some(ic) => self.load_preauths_tx(&mut tx, ic.id).await?,
            None => Vec::new(),
        };
        let posted_insurer_due = self
            .posted_insurer_due_tx(&mut tx, invoice.billing_case_id, invoice_id)
            .await?;

        lifecycle::check_posting_gate(
            &invoice,
            &lines,
            &preauths,
            insurance.as_ref().map(|ic| ic.approved_limit),
            posted_insurer_due,
        )?;

        let row = sqlx::query_as::<_, InvoiceRow>(
            "UPDATE billing_invoices SET status = 'POSTED', posted_at = now(), \
             posted_by = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(invoice_id)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;
        let posted = row.into_model()?;

        // Insurer-payable lines feed the claim pipeline.
        let totals = recompute_totals(&lines);
        if totals.insurer_due > Decimal::ZERO {
            if let Some(ic) = &insurance {
                self.upsert_draft_claim_tx(&mut tx, actor, ic, &posted, totals.insurer_due)
                    .await?;
            }
        }
        tx.commit().await?;

        info!(invoice_number = %posted.invoice_number, "invoice posted");
        self.emit_audit(
            AuditRecord::new("billing_invoice", invoice_id, "post")
                .with_old(json!({"status": invoice.status.as_str()}))
                .with_new(json!({"status": "POSTED"}))
                .by(actor.user_id),
        )
        .await;
        Ok(posted)
    }

    pub async fn void_invoice(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        reason: &str,
    ) -> StoreResult<BillingInvoice> {
        self.authorize(actor, perm::INVOICE_VOID)?;
        let mut tx = self.begin().await?;
        let invoice = self.load_invoice_tx(&mut tx, invoice_id, true).await?;
        lifecycle::ensure_voidable(&invoice, reason)?;
        let voided = self.void_invoice_tx(&mut tx, actor, invoice_id, reason).await?;
        tx.commit().await?;

        self.emit_audit(
            AuditRecord::new("billing_invoice", invoice_id, "void")
                .with_old(json!({"status": invoice.status.as_str()}))
                .with_new(json!({"status": "VOID"}))
                .by(actor.user_id)
                .because(reason),
        )
        .await;
        Ok(voided)
    }

    /// Ask to reopen an APPROVED invoice. A duplicate request returns the
    /// existing pending one.
    pub async fn request_edit(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        reason: &str,
    ) -> StoreResult<InvoiceEditRequest> {
        self.authorize(actor, perm::INVOICE_EDIT_REQUEST)?;
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation("edit requests require a reason".into()).into());
        }
        let invoice = self.get_invoice(invoice_id).await?;
        lifecycle::ensure_edit_requestable(&invoice)?;

        if let Some(pending) = self.find_pending_edit(invoice_id).await? {
            return Ok(pending);
        }

        let inserted = sqlx::query_as::<_, EditRequestRow>(
            "INSERT INTO billing_invoice_edit_requests (invoice_id, reason, requested_by) \
             VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(invoice_id)
        .bind(reason)
        .bind(actor.user_id)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Self::concurrency_on_conflict(e.into(), "edit request"))?;
        inserted.into_model()
    }

    /// Approve or reject a pending edit request. Approval reopens the
    /// invoice to DRAFT inside a bounded unlock window.
    pub async fn decide_edit(
        &self,
        actor: &Actor,
        request_id: Uuid,
        approve: bool,
        decision_reason: Option<&str>,
    ) -> StoreResult<InvoiceEditRequest> {
        self.authorize(actor, perm::INVOICE_EDIT_DECIDE)?;
        let mut tx = self.begin().await?;
        let row = sqlx::query_as::<_, EditRequestRow>(
            "SELECT * FROM billing_invoice_edit_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::not_found("edit_request", request_id))?;
        let request = row.into_model()?;
        lifecycle::ensure_request_decidable(&request)?;

        let invoice = self.load_invoice_tx(&mut tx, request.invoice_id, true).await?;
        let decided = if approve {
            lifecycle::ensure_edit_requestable(&invoice)?;
            let unlock_until = lifecycle::unlock_deadline(Utc::now(), self.config.unlock_window_hours);
            sqlx::query(
                "UPDATE billing_invoices SET status = 'DRAFT', updated_at = now() WHERE id = $1",
            )
            .bind(invoice.id)
            .execute(&mut *tx)
            .await?;
            sqlx::query_as::<_, EditRequestRow>(
                "UPDATE billing_invoice_edit_requests SET status = 'APPROVED', decided_by = $2, \
                 decided_at = now(), decision_reason = $3, unlock_until = $4 \
                 WHERE id = $1 RETURNING *",
            )
            .bind(request_id)
            .bind(actor.user_id)
            .bind(decision_reason)
            .bind(unlock_until)
            .fetch_one(&mut *tx)
            .await?
            .into_model()?
        } else {
            sqlx::query_as::<_, EditRequestRow>(
                "UPDATE billing_invoice_edit_requests SET status = 'REJECTED', decided_by = $2, \
                 decided_at = now(), decision_reason = $3 WHERE id = $1 RETURNING *",
            )
            .bind(request_id)
            .bind(actor.user_id)
            .bind(decision_reason)
            .fetch_one(&mut *tx)
            .await?
            .into_model()?
        };
        tx.commit().await?;

        self.emit_audit(
            AuditRecord::new("billing_invoice", invoice.id, if approve { "edit_unlock" } else { "edit_reject" })
                .with_old(json!({"edit_request": request.id, "status": "PENDING"}))
                .with_new(json!({"status": decided.status.as_str(), "unlock_until": decided.unlock_until}))
                .by(actor.user_id),
        )
        .await;
        Ok(decided)
    }

    // ---- transaction-scoped helpers ----

    pub(crate) async fn void_invoice_tx(
        &self,
        tx: &mut PgTx<'_>,
        actor: &Actor,
        invoice_id: Uuid,
        reason: &str,
    ) -> StoreResult<BillingInvoice> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            "UPDATE billing_invoices SET status = 'VOID', voided_at = now(), voided_by = $2, \
             void_reason = $3, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(invoice_id)
        .bind(actor.user_id)
        .bind(reason)
        .fetch_one(&mut **tx)
        .await?;
        self.unlink_voided_invoice_tx(tx, invoice_id).await?;
        row.into_model()
    }

    async fn load_line_tx(&self, tx: &mut PgTx<'_>, line_id: Uuid) -> StoreResult<BillingInvoiceLine> {
        let row = sqlx::query_as::<_, InvoiceLineRow>(
            "SELECT * FROM billing_invoice_lines WHERE id = $1 FOR UPDATE",
        )
        .bind(line_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| LedgerError::not_found("invoice_line", line_id))?;
        row.into_model()
    }

    async fn find_pending_edit(&self, invoice_id: Uuid) -> StoreResult<Option<InvoiceEditRequest>> {
        let row = sqlx::query_as::<_, EditRequestRow>(
            "SELECT * FROM billing_invoice_edit_requests \
             WHERE invoice_id = $1 AND status = 'PENDING'",
        )
        .bind(invoice_id)
        .fetch_optional(self.pool.pool())
        .await?;
        row.map(EditRequestRow::into_model).transpose()
    }

    /// Lines may be edited while DRAFT; a reopened invoice additionally has
    /// to be inside its unlock window.
    async fn ensure_editable_tx(&self, tx: &mut PgTx<'_>, invoice: &BillingInvoice) -> StoreResult<()> {
        if invoice.status != DocStatus::Draft {
            return Err(LedgerError::StateConflict(format!(
                "invoice {} is {}; lines can only change while DRAFT",
                invoice.invoice_number, invoice.status
            ))
            .into());
        }
        let reopened = sqlx::query_as::<_, EditRequestRow>(
            "SELECT * FROM billing_invoice_edit_requests \
             WHERE invoice_id = $1 AND status = 'APPROVED' \
             ORDER BY decided_at DESC NULLS LAST LIMIT 1",
        )
        .bind(invoice.id)
        .fetch_optional(&mut **tx)
        .await?;
        if let Some(row) = reopened {
            let request = row.into_model()?;
            if !lifecycle::edit_window_open(&request, Utc::now()) {
                return Err(LedgerError::StateConflict(format!(
                    "edit window for invoice {} expired at {:?}",
                    invoice.invoice_number, request.unlock_until
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Insurer dues already POSTED on the case, excluding one invoice.
    pub(crate) async fn posted_insurer_due_tx(
        &self,
        tx: &mut PgTx<'_>,
        case_id: Uuid,
        exclude_invoice: Uuid,
    ) -> StoreResult<Decimal> {
        let rows = sqlx::query_as::<_, InvoiceLineRow>(
            "SELECT l.* FROM billing_invoice_lines l \
             JOIN billing_invoices i ON i.id = l.invoice_id \
             WHERE i.billing_case_id = $1 AND i.status = 'POSTED' AND i.id <> $2 \
               AND NOT l.is_deleted",
        )
        .bind(case_id)
        .bind(exclude_invoice)
        .fetch_all(&mut **tx)
        .await?;
        let mut sum = Decimal::ZERO;
        for row in rows {
            sum += row.into_model()?.insurer_pay_amount;
        }
        Ok(sum)
    }
}
