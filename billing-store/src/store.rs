//! The ledger store: shared state and transaction-scoped helpers.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::pool::DatabasePool;
use crate::rows::{AllocationRow, InvoiceLineRow, InvoiceRow};
use audit_log::{AuditRecord, AuditSink, TracingSink};
use billing_core::access::{Actor, Authorizer};
use billing_core::lines::recompute_totals;
use billing_core::{BillingInvoice, BillingInvoiceLine, LedgerError, PayStatus, PayerBucket};
use rust_decimal::Decimal;
use std::sync::Arc;

pub(crate) type PgTx<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// Entry point for every ledger operation.
///
/// Holds the pool, the permission predicate, the audit sink and the
/// explicit policy configuration. One instance is shared by all request
/// handlers.
#[derive(Clone)]
pub struct LedgerStore {
    pub(crate) pool: DatabasePool,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) config: StoreConfig,
}

impl LedgerStore {
    pub fn new(pool: DatabasePool, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            pool,
            authorizer,
            audit: Arc::new(TracingSink),
            config: StoreConfig::default(),
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub(crate) fn authorize(&self, actor: &Actor, permission: &str) -> StoreResult<()> {
        self.authorizer.ensure(actor, permission)?;
        Ok(())
    }

    pub(crate) async fn emit_audit(&self, record: AuditRecord) {
        self.audit.record(record).await;
    }

    pub(crate) async fn begin(&self) -> StoreResult<PgTx<'static>> {
        Ok(self.pool.pool().begin().await?)
    }

    pub(crate) async fn load_invoice_tx(
        &self,
        tx: &mut PgTx<'_>,
        invoice_id: uuid::Uuid,
        lock: bool,
    ) -> StoreResult<BillingInvoice> {
        let sql = if lock {
            "SELECT * FROM billing_invoices WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT * FROM billing_invoices WHERE id = $1"
        };
        let row = sqlx::query_as::<_, InvoiceRow>(sql)
            .bind(invoice_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| LedgerError::not_found("invoice", invoice_id))?;
        row.into_model()
    }

    pub(crate) async fn load_lines_tx(
        &self,
        tx: &mut PgTx<'_>,
        invoice_id: uuid::Uuid,
    ) -> StoreResult<Vec<BillingInvoiceLine>> {
        let rows = sqlx::query_as::<_, InvoiceLineRow>(
            "SELECT * FROM billing_invoice_lines WHERE invoice_id = $1 ORDER BY created_at, id",
        )
        .bind(invoice_id)
        .fetch_all(&mut **tx)
        .await?;
        rows.into_iter().map(InvoiceLineRow::into_model).collect()
    }

    /// Amount already allocated to `invoice_id` for `bucket` across
    /// allocations of ACTIVE payments.
    pub(crate) async fn allocated_tx(
        &self,
        tx: &mut PgTx<'_>,
        invoice_id: uuid::Uuid,
        bucket: PayerBucket,
    ) -> StoreResult<Decimal> {
        let rows = sqlx::query_as::<_, AllocationRow>(
            "SELECT a.* FROM billing_payment_allocations a \
             JOIN billing_payments p ON p.id = a.payment_id \
             WHERE a.invoice_id = $1 AND a.payer_bucket = $2 \
               AND a.status = 'ACTIVE' AND p.status = 'ACTIVE'",
        )
        .bind(invoice_id)
        .bind(bucket.as_str())
        .fetch_all(&mut **tx)
        .await?;
        let mut sum = Decimal::ZERO;
        for row in rows {
            let alloc = row.into_model()?;
            if alloc.status == PayStatus::Active {
                sum += alloc.amount;
            }
        }
        Ok(sum)
    }

    /// Outstanding = bucket due across active lines minus already allocated.
    pub(crate) async fn outstanding_tx(
        &self,
        tx: &mut PgTx<'_>,
        invoice: &BillingInvoice,
        bucket: PayerBucket,
    ) -> StoreResult<Decimal> {
        let lines = self.load_lines_tx(tx, invoice.id).await?;
        let totals = recompute_totals(&lines);
        let due = match bucket {
            PayerBucket::Patient => totals.patient_due,
            PayerBucket::Insurer | PayerBucket::Tpa | PayerBucket::Corporate => totals.insurer_due,
        };
        let paid = self.allocated_tx(tx, invoice.id, bucket).await?;
        Ok(due - paid)
    }

    /// Recompute and persist invoice header totals; runs after every line
    /// mutation so the grand total always equals the active-line net sum.
    pub(crate) async fn refresh_totals_tx(
        &self,
        tx: &mut PgTx<'_>,
        invoice_id: uuid::Uuid,
    ) -> StoreResult<()> {
        let lines = self.load_lines_tx(tx, invoice_id).await?;
        let totals = recompute_totals(&lines);
        sqlx::query(
            "UPDATE billing_invoices SET sub_total = $2, discount_total = $3, tax_total = $4, \
             round_off = $5, grand_total = $6, updated_at = now() WHERE id = $1",
        )
        .bind(invoice_id)
        .bind(totals.sub_total)
        .bind(totals.discount_total)
        .bind(totals.tax_total)
        .bind(totals.round_off)
        .bind(totals.grand_total)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Map a unique-violation into a retryable concurrency conflict.
    pub(crate) fn concurrency_on_conflict(err: StoreError, what: &str) -> StoreError {
        if err.is_unique_violation() {
            StoreError::Ledger(LedgerError::Concurrency(format!(
                "{} was created concurrently; retry the operation",
                what
            )))
        } else {
            err
        }
    }
}
