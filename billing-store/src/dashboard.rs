//! Case financial dashboard: load the ledger snapshots and hand them to
//! the pure aggregation in `billing_core::dashboard`.

use crate::error::StoreResult;
use crate::rows::{AdvanceApplicationRow, AdvanceRow, AllocationRow, InvoiceLineRow, InvoiceRow};
use crate::store::LedgerStore;
use billing_core::dashboard::{case_financials, CaseFinancials, InvoiceSnapshot};
use billing_core::lines::recompute_totals;
use billing_core::BillingInvoiceLine;
use std::collections::HashMap;
use uuid::Uuid;

impl LedgerStore {
    /// Compute the financial dashboard for one case.
    ///
    /// Reads a consistent snapshot of invoices, lines, allocations and the
    /// advance wallet; all derivation is pure and lives in `billing-core`.
    pub async fn case_financials(&self, case_id: Uuid) -> StoreResult<CaseFinancials> {
        // Existence check so an unknown case is a 404, not an empty dashboard.
        self.get_case(case_id).await?;

        let invoice_rows = sqlx::query_as::<_, InvoiceRow>(
            "SELECT * FROM billing_invoices WHERE billing_case_id = $1",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await?;

        let line_rows = sqlx::query_as::<_, InvoiceLineRow>(
            "SELECT l.* FROM billing_invoice_lines l \
             JOIN billing_invoices i ON i.id = l.invoice_id \
             WHERE i.billing_case_id = $1",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await?;
        let mut lines_by_invoice: HashMap<Uuid, Vec<BillingInvoiceLine>> = HashMap::new();
        for row in line_rows {
            let line = row.into_model()?;
            lines_by_invoice.entry(line.invoice_id).or_default().push(line);
        }

        let mut snapshots = Vec::with_capacity(invoice_rows.len());
        for row in invoice_rows {
            let invoice = row.into_model()?;
            let totals = lines_by_invoice
                .get(&invoice.id)
                .map(|lines| recompute_totals(lines))
                .unwrap_or_default();
            snapshots.push(InvoiceSnapshot {
                invoice,
                patient_due: totals.patient_due,
                insurer_due: totals.insurer_due,
            });
        }

        let allocation_rows = sqlx::query_as::<_, AllocationRow>(
            "SELECT a.* FROM billing_payment_allocations a \
             JOIN billing_payments p ON p.id = a.payment_id \
             WHERE p.billing_case_id = $1 AND p.status = 'ACTIVE'",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await?;
        let allocations = allocation_rows
            .into_iter()
            .map(AllocationRow::into_model)
            .collect::<StoreResult<Vec<_>>>()?;

        let advance_rows = sqlx::query_as::<_, AdvanceRow>(
            "SELECT * FROM billing_advances WHERE billing_case_id = $1",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await?;
        let advances = advance_rows
            .into_iter()
            .map(AdvanceRow::into_model)
            .collect::<StoreResult<Vec<_>>>()?;

        let application_rows = sqlx::query_as::<_, AdvanceApplicationRow>(
            "SELECT ap.* FROM billing_advance_applications ap \
             JOIN billing_advances ad ON ad.id = ap.advance_id \
             WHERE ad.billing_case_id = $1",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await?;
        let applications: Vec<_> = application_rows
            .into_iter()
            .map(AdvanceApplicationRow::into_model)
            .collect();

        Ok(case_financials(
            &snapshots,
            &allocations,
            &advances,
            &applications,
        ))
    }
}
