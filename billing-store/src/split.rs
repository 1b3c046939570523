//! Split execution: turn one mixed-liability invoice into a PATIENT
//! invoice and an INSURER invoice, then void the original.
//!
//! The arithmetic lives in `billing_core::split`; this module only writes
//! the planned rows inside one transaction.

use crate::error::StoreResult;
use crate::rows::{InvoiceLineRow, InvoiceRow};
use crate::store::{LedgerStore, PgTx};
use audit_log::AuditRecord;
use billing_core::access::{perm, Actor};
use billing_core::split::{plan_split, PlannedShareLine};
use billing_core::{
    BillingInvoice, DocType, InvoiceType, PayerKind, ResetPeriod,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// The three invoices touched by a split.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub source: BillingInvoice,
    pub patient_invoice: Option<BillingInvoice>,
    pub insurer_invoice: BillingInvoice,
}

impl LedgerStore {
    /// Split an APPROVED or POSTED invoice into per-payer invoices.
    ///
    /// The source is voided with a reason naming its replacements; its
    /// payments migrate to the new PATIENT invoice only when the caller
    /// explicitly allows it. Both new invoices start APPROVED (their
    /// content was already approved once on the source); the INSURER
    /// invoice still has to pass the posting gate on its own.
    pub async fn split_invoice(
        &self,
        actor: &Actor,
        invoice_id: Uuid,
        allow_payment_migration: bool,
    ) -> StoreResult<SplitOutcome> {
        self.authorize(actor, perm::INVOICE_SPLIT)?;

        let mut tx = self.begin().await?;
        let source = self.load_invoice_tx(&mut tx, invoice_id, true).await?;
        self.lock_case_tx(&mut tx, source.billing_case_id).await?;
        let lines = self.load_lines_tx(&mut tx, invoice_id).await?;

        let active_payments: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM billing_payment_allocations a \
             JOIN billing_payments p ON p.id = a.payment_id \
             WHERE a.invoice_id = $1 AND a.status = 'ACTIVE' AND p.status = 'ACTIVE'",
        )
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await?;

        let plan = plan_split(&source, &lines, active_payments > 0, allow_payment_migration)?;

        let insurance = self
            .load_insurance_case_tx(&mut tx, source.billing_case_id)
            .await?;
        let (payer_kind, payer_id) = match &insurance {
            Some(ic) => (
                Some(ic.payer_kind),
                match ic.payer_kind {
                    PayerKind::Insurance => ic.insurer_id,
                    PayerKind::Tpa => ic.tpa_id,
                    PayerKind::Corporate => ic.corporate_id,
                },
            ),
            None => (source.payer_kind, source.payer_id),
        };

        let patient_invoice = if plan.patient_lines.is_empty() {
            None
        } else {
            let invoice = self
                .insert_share_invoice_tx(
                    &mut tx,
                    actor,
                    &source,
                    InvoiceType::Patient,
                    None,
                    None,
                    &plan.patient_lines,
                )
                .await?;
            Some(invoice)
        };
        let insurer_invoice = self
            .insert_share_invoice_tx(
                &mut tx,
                actor,
                &source,
                InvoiceType::Insurer,
                payer_kind,
                payer_id,
                &plan.insurer_lines,
            )
            .await?;

        if plan.migrate_payments {
            if let Some(patient) = &patient_invoice {
                sqlx::query(
                    "UPDATE billing_payment_allocations SET invoice_id = $2 \
                     WHERE invoice_id = $1 AND payer_bucket = 'PATIENT' AND status = 'ACTIVE'",
                )
                .bind(source.id)
                .bind(patient.id)
                .execute(&mut *tx)
                .await?;
            }
        }

        let void_reason = match &patient_invoice {
            Some(patient) => format!(
                "split into {} and {}",
                patient.invoice_number, insurer_invoice.invoice_number
            ),
            None => format!("split into {}", insurer_invoice.invoice_number),
        };
        let voided = self
            .void_invoice_tx(&mut tx, actor, source.id, &void_reason)
            .await?;
        tx.commit().await?;

        info!(
            source = %voided.invoice_number,
            patient = ?patient_invoice.as_ref().map(|i| i.invoice_number.clone()),
            insurer = %insurer_invoice.invoice_number,
            migrated_payments = plan.migrate_payments,
            "invoice split"
        );
        self.emit_audit(
            AuditRecord::new("billing_invoice", source.id, "split")
                .with_old(json!({
                    "invoice_number": voided.invoice_number,
                    "grand_total": source.grand_total,
                }))
                .with_new(json!({
                    "patient_invoice": patient_invoice.as_ref().map(|i| i.invoice_number.clone()),
                    "patient_total": plan.patient_total,
                    "insurer_invoice": insurer_invoice.invoice_number,
                    "insurer_total": plan.insurer_total,
                }))
                .by(actor.user_id)
                .because(void_reason),
        )
        .await;

        Ok(SplitOutcome {
            source: voided,
            patient_invoice,
            insurer_invoice,
        })
    }

    /// Insert one share invoice with its planned lines, APPROVED.
    async fn insert_share_invoice_tx(
        &self,
        tx: &mut PgTx<'_>,
        actor: &Actor,
        source: &BillingInvoice,
        invoice_type: InvoiceType,
        payer_kind: Option<PayerKind>,
        payer_id: Option<Uuid>,
        lines: &[PlannedShareLine],
    ) -> StoreResult<BillingInvoice> {
        let number = self
            .next_document_number(tx, DocType::Invoice, "INV-", ResetPeriod::Year, 6)
            .await?;
        let row = sqlx::query_as::<_, InvoiceRow>(
            "INSERT INTO billing_invoices \
             (billing_case_id, invoice_number, module, invoice_type, payer_kind, payer_id, \
              accepts_patient_advance, status, service_date, approved_at, approved_by, meta) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'APPROVED', $8, now(), $9, $10) RETURNING *",
        )
        .bind(source.billing_case_id)
        .bind(&number)
        .bind(&source.module)
        .bind(invoice_type.as_str())
        .bind(payer_kind.map(|k| k.as_str()))
        .bind(payer_id)
        .bind(invoice_type == InvoiceType::Patient)
        .bind(source.service_date)
        .bind(actor.user_id)
        .bind(json!({
            "split_source": {
                "invoice_id": source.id,
                "invoice_number": source.invoice_number,
            }
        }))
        .fetch_one(&mut **tx)
        .await?;
        let invoice = row.into_model()?;

        for line in lines {
            sqlx::query_as::<_, InvoiceLineRow>(
                "INSERT INTO billing_invoice_lines \
                 (invoice_id, service_group, description, qty, unit_price, gst_rate, tax_amount, \
                  line_total, net_amount, is_covered, insurer_pay_amount, patient_pay_amount, \
                  requires_preauth, meta) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14) RETURNING *",
            )
            .bind(invoice.id)
            .bind(line.service_group.as_str())
            .bind(&line.description)
            .bind(line.qty)
            .bind(line.unit_price)
            .bind(line.gst_rate)
            .bind(line.tax_amount)
            .bind(line.line_total)
            .bind(line.net_amount)
            .bind(line.is_covered.as_str())
            .bind(line.insurer_pay_amount)
            .bind(line.patient_pay_amount)
            .bind(line.requires_preauth)
            .bind(&line.meta)
            .fetch_one(&mut **tx)
            .await?;
        }
        self.refresh_totals_tx(tx, invoice.id).await?;
        self.load_invoice_tx(tx, invoice.id, false).await
    }
}
