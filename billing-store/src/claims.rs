//! Insurance cases, preauthorizations and claims.
//!
//! The claim↔invoice linkage is explicit join rows; a POSTED invoice with
//! insurer-payable lines lands on its case's draft claim automatically and
//! at most once. Settlement money flows through the same allocator as every
//! other payment.

use crate::error::StoreResult;
use crate::rows::{ClaimInvoiceRow, ClaimRow, InsuranceCaseRow, PreauthRow};
use crate::store::{LedgerStore, PgTx};
use audit_log::AuditRecord;
use billing_core::access::{perm, Actor};
use billing_core::allocation::{plan_allocation, total_outstanding, AllocationTarget};
use billing_core::claim as lifecycle;
use billing_core::lines::recompute_totals;
use billing_core::money::{is_positive, round_money};
use billing_core::{
    BillingClaim, BillingInsuranceCase, BillingInvoice, BillingPreauthRequest, ClaimInvoiceLink,
    ClaimStatus, DocType, LedgerError, PayerBucket, PayerKind, PaymentKind, PaymentMode,
    PreauthStatus, ResetPeriod,
};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// Input for creating or refreshing the payer record of a case.
#[derive(Debug, Clone)]
pub struct UpsertInsuranceCase {
    pub billing_case_id: Uuid,
    pub payer_kind: PayerKind,
    pub insurer_id: Option<Uuid>,
    pub tpa_id: Option<Uuid>,
    pub corporate_id: Option<Uuid>,
    pub policy_number: Option<String>,
    pub member_id: Option<String>,
}

impl LedgerStore {
    /// Create or refresh the insurance case of a billing case. One per
    /// case; repeat calls update the payer details and leave the approved
    /// limit untouched (the limit only moves with preauth decisions).
    pub async fn upsert_insurance_case(
        &self,
        actor: &Actor,
        input: UpsertInsuranceCase,
    ) -> StoreResult<BillingInsuranceCase> {
        self.authorize(actor, perm::PREAUTH_WRITE)?;
        self.get_case(input.billing_case_id).await?;

        let row = sqlx::query_as::<_, InsuranceCaseRow>(
            "INSERT INTO billing_insurance_cases \
             (billing_case_id, payer_kind, insurer_id, tpa_id, corporate_id, policy_number, member_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (billing_case_id) DO UPDATE SET \
               payer_kind = EXCLUDED.payer_kind, insurer_id = EXCLUDED.insurer_id, \
               tpa_id = EXCLUDED.tpa_id, corporate_id = EXCLUDED.corporate_id, \
               policy_number = EXCLUDED.policy_number, member_id = EXCLUDED.member_id, \
               updated_at = now() \
             RETURNING *",
        )
        .bind(input.billing_case_id)
        .bind(input.payer_kind.as_str())
        .bind(input.insurer_id)
        .bind(input.tpa_id)
        .bind(input.corporate_id)
        .bind(&input.policy_number)
        .bind(&input.member_id)
        .fetch_one(self.pool.pool())
        .await?;
        let ic = row.into_model()?;

        self.emit_audit(
            AuditRecord::new("billing_insurance_case", ic.id, "upsert")
                .with_new(serde_json::to_value(&ic)?)
                .by(actor.user_id),
        )
        .await;
        Ok(ic)
    }

    pub async fn get_insurance_case(
        &self,
        billing_case_id: Uuid,
    ) -> StoreResult<Option<BillingInsuranceCase>> {
        let row = sqlx::query_as::<_, InsuranceCaseRow>(
            "SELECT * FROM billing_insurance_cases WHERE billing_case_id = $1",
        )
        .bind(billing_case_id)
        .fetch_optional(self.pool.pool())
        .await?;
        row.map(InsuranceCaseRow::into_model).transpose()
    }

    /// Draft a preauthorization request.
    pub async fn create_preauth(
        &self,
        actor: &Actor,
        insurance_case_id: Uuid,
        requested_amount: Decimal,
        remarks: Option<String>,
    ) -> StoreResult<BillingPreauthRequest> {
        self.authorize(actor, perm::PREAUTH_WRITE)?;
        let requested_amount = round_money(requested_amount);
        if !is_positive(requested_amount) {
            return Err(
                LedgerError::Validation("requested_amount must be positive".into()).into(),
            );
        }

        let mut tx = self.begin().await?;
        let number = self
            .next_document_number(&mut tx, DocType::Preauth, "PA-", ResetPeriod::Year, 6)
            .await?;
        let row = sqlx::query_as::<_, PreauthRow>(
            "INSERT INTO billing_preauth_requests \
             (insurance_case_id, preauth_number, requested_amount, remarks) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(insurance_case_id)
        .bind(&number)
        .bind(requested_amount)
        .bind(&remarks)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let preauth = row.into_model()?;

        self.emit_audit(
            AuditRecord::new("billing_preauth", preauth.id, "create")
                .with_new(serde_json::to_value(&preauth)?)
                .by(actor.user_id),
        )
        .await;
        Ok(preauth)
    }

    pub async fn submit_preauth(
        &self,
        actor: &Actor,
        preauth_id: Uuid,
    ) -> StoreResult<BillingPreauthRequest> {
        self.authorize(actor, perm::PREAUTH_WRITE)?;
        let mut tx = self.begin().await?;
        let preauth = self.load_preauth_tx(&mut tx, preauth_id).await?;
        lifecycle::ensure_preauth_transition(preauth.status, PreauthStatus::Submitted)?;

        let row = sqlx::query_as::<_, PreauthRow>(
            "UPDATE billing_preauth_requests SET status = 'SUBMITTED', submitted_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(preauth_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let submitted = row.into_model()?;

        self.emit_audit(
            AuditRecord::new("billing_preauth", preauth_id, "submit")
                .with_old(json!({"status": preauth.status.as_str()}))
                .with_new(json!({"status": "SUBMITTED"}))
                .by(actor.user_id),
        )
        .await;
        Ok(submitted)
    }

    /// Record the payer's decision on a submitted preauth. Approved and
    /// partial decisions carry the payer's current sanctioned limit, which
    /// is copied onto the insurance case.
    pub async fn decide_preauth(
        &self,
        actor: &Actor,
        preauth_id: Uuid,
        decision: PreauthStatus,
        approved_amount: Option<Decimal>,
        remarks: Option<String>,
    ) -> StoreResult<BillingPreauthRequest> {
        self.authorize(actor, perm::PREAUTH_DECIDE)?;
        let mut tx = self.begin().await?;
        let preauth = self.load_preauth_tx(&mut tx, preauth_id).await?;
        let approved = lifecycle::validate_preauth_decision(&preauth, decision, approved_amount)?;

        let row = sqlx::query_as::<_, PreauthRow>(
            "UPDATE billing_preauth_requests SET status = $2, approved_amount = $3, \
             remarks = COALESCE($4, remarks), decided_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(preauth_id)
        .bind(decision.as_str())
        .bind(approved)
        .bind(&remarks)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(limit) = approved {
            sqlx::query(
                "UPDATE billing_insurance_cases SET approved_limit = $2, approved_at = now(), \
                 updated_at = now() WHERE id = $1",
            )
            .bind(preauth.insurance_case_id)
            .bind(limit)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        let decided = row.into_model()?;

        info!(
            preauth = %decided.preauth_number,
            decision = %decision,
            approved = ?approved,
            "preauth decided"
        );
        self.emit_audit(
            AuditRecord::new("billing_preauth", preauth_id, "decide")
                .with_old(json!({"status": preauth.status.as_str()}))
                .with_new(json!({"status": decision.as_str(), "approved_amount": approved}))
                .by(actor.user_id),
        )
        .await;
        Ok(decided)
    }

    pub async fn list_preauths(
        &self,
        insurance_case_id: Uuid,
    ) -> StoreResult<Vec<BillingPreauthRequest>> {
        let rows = sqlx::query_as::<_, PreauthRow>(
            "SELECT * FROM billing_preauth_requests WHERE insurance_case_id = $1 \
             ORDER BY created_at, id",
        )
        .bind(insurance_case_id)
        .fetch_all(self.pool.pool())
        .await?;
        rows.into_iter().map(PreauthRow::into_model).collect()
    }

    pub async fn get_claim(&self, claim_id: Uuid) -> StoreResult<BillingClaim> {
        let row = sqlx::query_as::<_, ClaimRow>("SELECT * FROM billing_claims WHERE id = $1")
            .bind(claim_id)
            .fetch_optional(self.pool.pool())
            .await?
            .ok_or_else(|| LedgerError::not_found("claim", claim_id))?;
        row.into_model()
    }

    pub async fn list_claims(&self, insurance_case_id: Uuid) -> StoreResult<Vec<BillingClaim>> {
        let rows = sqlx::query_as::<_, ClaimRow>(
            "SELECT * FROM billing_claims WHERE insurance_case_id = $1 ORDER BY created_at, id",
        )
        .bind(insurance_case_id)
        .fetch_all(self.pool.pool())
        .await?;
        rows.into_iter().map(ClaimRow::into_model).collect()
    }

    pub async fn claim_invoices(&self, claim_id: Uuid) -> StoreResult<Vec<ClaimInvoiceLink>> {
        let rows = sqlx::query_as::<_, ClaimInvoiceRow>(
            "SELECT * FROM billing_claim_invoices WHERE claim_id = $1 ORDER BY invoice_number",
        )
        .bind(claim_id)
        .fetch_all(self.pool.pool())
        .await?;
        Ok(rows.into_iter().map(ClaimInvoiceRow::into_model).collect())
    }

    /// Submit a draft claim to the payer. The claim amount is re-derived
    /// from the linked invoices' current insurer dues, never trusted from
    /// an earlier write.
    pub async fn submit_claim(&self, actor: &Actor, claim_id: Uuid) -> StoreResult<BillingClaim> {
        self.authorize(actor, perm::CLAIM_WRITE)?;
        let mut tx = self.begin().await?;
        let claim = self.load_claim_tx(&mut tx, claim_id).await?;
        let linked = self.linked_invoice_dues_tx(&mut tx, claim_id).await?;
        let amount = lifecycle::ensure_submittable(&claim, &linked)?;

        let row = sqlx::query_as::<_, ClaimRow>(
            "UPDATE billing_claims SET status = 'SUBMITTED', claim_amount = $2, \
             submitted_at = now(), updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(claim_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let submitted = row.into_model()?;

        info!(claim = %submitted.claim_number, amount = %amount, "claim submitted");
        self.emit_audit(
            AuditRecord::new("billing_claim", claim_id, "submit")
                .with_old(json!({"status": claim.status.as_str()}))
                .with_new(json!({"status": "SUBMITTED", "claim_amount": amount}))
                .by(actor.user_id),
        )
        .await;
        Ok(submitted)
    }

    /// The payer confirmed receipt but has not adjudicated yet.
    pub async fn acknowledge_claim(
        &self,
        actor: &Actor,
        claim_id: Uuid,
    ) -> StoreResult<BillingClaim> {
        self.authorize(actor, perm::CLAIM_WRITE)?;
        self.transition_claim(
            actor,
            claim_id,
            ClaimStatus::Acknowledged,
            "acknowledge",
            "UPDATE billing_claims SET status = 'ACKNOWLEDGED', acknowledged_at = now(), \
             updated_at = now() WHERE id = $1 RETURNING *",
            None,
        )
        .await
    }

    /// The payer raised a query; the claim leaves the adjudication queue
    /// until it is resubmitted.
    pub async fn query_claim(
        &self,
        actor: &Actor,
        claim_id: Uuid,
        remarks: &str,
    ) -> StoreResult<BillingClaim> {
        self.authorize(actor, perm::CLAIM_WRITE)?;
        self.transition_claim(
            actor,
            claim_id,
            ClaimStatus::UnderQuery,
            "query",
            "UPDATE billing_claims SET status = 'UNDER_QUERY', remarks = $2, \
             updated_at = now() WHERE id = $1 RETURNING *",
            Some(remarks),
        )
        .await
    }

    pub async fn approve_claim(
        &self,
        actor: &Actor,
        claim_id: Uuid,
        approved_amount: Decimal,
    ) -> StoreResult<BillingClaim> {
        self.authorize(actor, perm::CLAIM_WRITE)?;
        let approved_amount = round_money(approved_amount);
        if !is_positive(approved_amount) {
            return Err(LedgerError::Validation("approved_amount must be positive".into()).into());
        }

        let mut tx = self.begin().await?;
        let claim = self.load_claim_tx(&mut tx, claim_id).await?;
        lifecycle::ensure_claim_transition(claim.status, ClaimStatus::Approved)?;

        let row = sqlx::query_as::<_, ClaimRow>(
            "UPDATE billing_claims SET status = 'APPROVED', approved_amount = $2, \
             decided_at = now(), updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(claim_id)
        .bind(approved_amount)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let approved = row.into_model()?;

        self.emit_audit(
            AuditRecord::new("billing_claim", claim_id, "approve")
                .with_old(json!({"status": claim.status.as_str()}))
                .with_new(json!({"status": "APPROVED", "approved_amount": approved_amount}))
                .by(actor.user_id),
        )
        .await;
        Ok(approved)
    }

    pub async fn deny_claim(
        &self,
        actor: &Actor,
        claim_id: Uuid,
        remarks: &str,
    ) -> StoreResult<BillingClaim> {
        self.authorize(actor, perm::CLAIM_WRITE)?;
        self.transition_claim(
            actor,
            claim_id,
            ClaimStatus::Denied,
            "deny",
            "UPDATE billing_claims SET status = 'DENIED', remarks = $2, decided_at = now(), \
             updated_at = now() WHERE id = $1 RETURNING *",
            Some(remarks),
        )
        .await
    }

    /// Settle an approved claim: record the insurer's remittance and
    /// allocate it across the claim's linked invoices, oldest first.
    pub async fn settle_claim(
        &self,
        actor: &Actor,
        claim_id: Uuid,
        settled_amount: Decimal,
        mode: PaymentMode,
    ) -> StoreResult<BillingClaim> {
        self.authorize(actor, perm::CLAIM_SETTLE)?;

        let mut tx = self.begin().await?;
        let claim = self.load_claim_tx(&mut tx, claim_id).await?;
        let settled_amount = lifecycle::ensure_settleable(&claim, settled_amount)?;

        let ic = sqlx::query_as::<_, InsuranceCaseRow>(
            "SELECT * FROM billing_insurance_cases WHERE id = $1",
        )
        .bind(claim.insurance_case_id)
        .fetch_one(&mut *tx)
        .await?
        .into_model()?;
        self.lock_case_tx(&mut tx, ic.billing_case_id).await?;

        let bucket = match ic.payer_kind {
            PayerKind::Insurance => PayerBucket::Insurer,
            PayerKind::Tpa => PayerBucket::Tpa,
            PayerKind::Corporate => PayerBucket::Corporate,
        };

        let mut targets = Vec::new();
        for link in self.linked_invoices_tx(&mut tx, claim_id).await? {
            let invoice = self.load_invoice_tx(&mut tx, link.invoice_id, true).await?;
            if !invoice.is_active() {
                continue;
            }
            let outstanding = self.outstanding_tx(&mut tx, &invoice, bucket).await?;
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
        let open = total_outstanding(&targets);
        if settled_amount > open {
            return Err(LedgerError::BusinessRule(format!(
                "settlement {} exceeds the claim's open insurer dues {}",
                settled_amount, open
            ))
            .into());
        }
        let planned = plan_allocation(&targets, settled_amount)?;

        let payment = self
            .insert_payment_tx(
                &mut tx,
                actor,
                ic.billing_case_id,
                None,
                bucket,
                ic.insurer_id.or(ic.tpa_id).or(ic.corporate_id),
                mode,
                settled_amount,
                PaymentKind::Receipt,
                json!({"claim_settlement": claim.claim_number}),
            )
            .await?;
        self.insert_allocations_tx(&mut tx, payment.id, &planned)
            .await?;

        let row = sqlx::query_as::<_, ClaimRow>(
            "UPDATE billing_claims SET status = 'SETTLED', settled_amount = $2, \
             settled_at = now(), updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(claim_id)
        .bind(settled_amount)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let settled = row.into_model()?;

        info!(
            claim = %settled.claim_number,
            amount = %settled_amount,
            receipt = %payment.receipt_number,
            "claim settled"
        );
        self.emit_audit(
            AuditRecord::new("billing_claim", claim_id, "settle")
                .with_old(json!({"status": claim.status.as_str()}))
                .with_new(json!({"status": "SETTLED", "settled_amount": settled_amount, "receipt": payment.receipt_number}))
                .by(actor.user_id),
        )
        .await;
        Ok(settled)
    }

    // ---- transaction-scoped helpers ----

    pub(crate) async fn load_insurance_case_tx(
        &self,
        tx: &mut PgTx<'_>,
        billing_case_id: Uuid,
    ) -> StoreResult<Option<BillingInsuranceCase>> {
        let row = sqlx::query_as::<_, InsuranceCaseRow>(
            "SELECT * FROM billing_insurance_cases WHERE billing_case_id = $1",
        )
        .bind(billing_case_id)
        .fetch_optional(&mut **tx)
        .await?;
        row.map(InsuranceCaseRow::into_model).transpose()
    }

    pub(crate) async fn load_preauths_tx(
        &self,
        tx: &mut PgTx<'_>,
        insurance_case_id: Uuid,
    ) -> StoreResult<Vec<BillingPreauthRequest>> {
        let rows = sqlx::query_as::<_, PreauthRow>(
            "SELECT * FROM billing_preauth_requests WHERE insurance_case_id = $1",
        )
        .bind(insurance_case_id)
        .fetch_all(&mut **tx)
        .await?;
        rows.into_iter().map(PreauthRow::into_model).collect()
    }

    async fn load_preauth_tx(
        &self,
        tx: &mut PgTx<'_>,
        preauth_id: Uuid,
    ) -> StoreResult<BillingPreauthRequest> {
        let row = sqlx::query_as::<_, PreauthRow>(
            "SELECT * FROM billing_preauth_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(preauth_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| LedgerError::not_found("preauth", preauth_id))?;
        row.into_model()
    }

    async fn load_claim_tx(&self, tx: &mut PgTx<'_>, claim_id: Uuid) -> StoreResult<BillingClaim> {
        let row =
            sqlx::query_as::<_, ClaimRow>("SELECT * FROM billing_claims WHERE id = $1 FOR UPDATE")
                .bind(claim_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| LedgerError::not_found("claim", claim_id))?;
        row.into_model()
    }

    async fn linked_invoices_tx(
        &self,
        tx: &mut PgTx<'_>,
        claim_id: Uuid,
    ) -> StoreResult<Vec<ClaimInvoiceLink>> {
        let rows = sqlx::query_as::<_, ClaimInvoiceRow>(
            "SELECT * FROM billing_claim_invoices WHERE claim_id = $1 ORDER BY invoice_number",
        )
        .bind(claim_id)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.into_iter().map(ClaimInvoiceRow::into_model).collect())
    }

    /// Linked invoices with their current insurer dues from active lines.
    /// VOID invoices are excluded; a stale link contributes nothing.
    async fn linked_invoice_dues_tx(
        &self,
        tx: &mut PgTx<'_>,
        claim_id: Uuid,
    ) -> StoreResult<Vec<(BillingInvoice, Decimal)>> {
        let mut out = Vec::new();
        for link in self.linked_invoices_tx(tx, claim_id).await? {
            let invoice = self.load_invoice_tx(tx, link.invoice_id, false).await?;
            if !invoice.is_active() {
                continue;
            }
            let lines = self.load_lines_tx(tx, link.invoice_id).await?;
            out.push((invoice, recompute_totals(&lines).insurer_due));
        }
        Ok(out)
    }

    /// Detach a voided invoice from its DRAFT claim and recompute the
    /// claim amount. Links on submitted-or-later claims are left in place
    /// as history; the dues and settlement loops skip VOID invoices.
    pub(crate) async fn unlink_voided_invoice_tx(
        &self,
        tx: &mut PgTx<'_>,
        invoice_id: Uuid,
    ) -> StoreResult<()> {
        let link = sqlx::query_as::<_, ClaimInvoiceRow>(
            "SELECT * FROM billing_claim_invoices WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await?;
        let Some(link) = link else {
            return Ok(());
        };
        let claim = self.load_claim_tx(tx, link.claim_id).await?;
        if claim.status != ClaimStatus::Draft {
            return Ok(());
        }
        sqlx::query("DELETE FROM billing_claim_invoices WHERE claim_id = $1 AND invoice_id = $2")
            .bind(link.claim_id)
            .bind(invoice_id)
            .execute(&mut **tx)
            .await?;
        let refreshed = self.bump_draft_claim_amount_tx(tx, link.claim_id).await?;
        info!(
            claim = %refreshed.claim_number,
            invoice = %link.invoice_number,
            claim_amount = %refreshed.claim_amount,
            "voided invoice detached from draft claim"
        );
        Ok(())
    }

    /// Attach a freshly POSTED invoice to its case's draft claim, creating
    /// the claim if none is open. Idempotent: the link table's uniqueness
    /// on invoice_id means an invoice lands on exactly one claim.
    pub(crate) async fn upsert_draft_claim_tx(
        &self,
        tx: &mut PgTx<'_>,
        actor: &Actor,
        insurance_case: &BillingInsuranceCase,
        invoice: &BillingInvoice,
        insurer_due: Decimal,
    ) -> StoreResult<BillingClaim> {
        let already = sqlx::query_as::<_, ClaimInvoiceRow>(
            "SELECT * FROM billing_claim_invoices WHERE invoice_id = $1",
        )
        .bind(invoice.id)
        .fetch_optional(&mut **tx)
        .await?;
        if let Some(link) = already {
            return self.bump_draft_claim_amount_tx(tx, link.claim_id).await;
        }

        let draft = sqlx::query_as::<_, ClaimRow>(
            "SELECT * FROM billing_claims \
             WHERE insurance_case_id = $1 AND status = 'DRAFT' \
             ORDER BY created_at LIMIT 1 FOR UPDATE",
        )
        .bind(insurance_case.id)
        .fetch_optional(&mut **tx)
        .await?;

        let claim = match draft {
            Some(row) => row.into_model()?,
            None => {
                let number = self
                    .next_document_number(tx, DocType::Claim, "CLM-", ResetPeriod::Year, 6)
                    .await?;
                let row = sqlx::query_as::<_, ClaimRow>(
                    "INSERT INTO billing_claims (insurance_case_id, claim_number, claim_amount) \
                     VALUES ($1, $2, $3) RETURNING *",
                )
                .bind(insurance_case.id)
                .bind(&number)
                .bind(Decimal::ZERO)
                .fetch_one(&mut **tx)
                .await?
                .into_model()?;
                info!(claim = %row.claim_number, "draft claim opened");
                row
            }
        };

        sqlx::query(
            "INSERT INTO billing_claim_invoices (claim_id, invoice_id, invoice_number) \
             VALUES ($1, $2, $3) ON CONFLICT (invoice_id) DO NOTHING",
        )
        .bind(claim.id)
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .execute(&mut **tx)
        .await?;
        let refreshed = self.bump_draft_claim_amount_tx(tx, claim.id).await?;

        self.emit_audit(
            AuditRecord::new("billing_claim", refreshed.id, "link_invoice")
                .with_new(json!({
                    "invoice_number": invoice.invoice_number,
                    "insurer_due": insurer_due,
                    "claim_amount": refreshed.claim_amount,
                }))
                .by(actor.user_id),
        )
        .await;
        Ok(refreshed)
    }

    /// Recompute a DRAFT claim's amount from its linked invoices.
    async fn bump_draft_claim_amount_tx(
        &self,
        tx: &mut PgTx<'_>,
        claim_id: Uuid,
    ) -> StoreResult<BillingClaim> {
        let claim = self.load_claim_tx(tx, claim_id).await?;
        if claim.status != ClaimStatus::Draft {
            return Ok(claim);
        }
        let linked = self.linked_invoice_dues_tx(tx, claim_id).await?;
        let amount = lifecycle::claim_amount_from_invoices(&linked);
        let row = sqlx::query_as::<_, ClaimRow>(
            "UPDATE billing_claims SET claim_amount = $2, updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(claim_id)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await?;
        row.into_model()
    }

    async fn transition_claim(
        &self,
        actor: &Actor,
        claim_id: Uuid,
        to: ClaimStatus,
        action: &str,
        sql: &str,
        remarks: Option<&str>,
    ) -> StoreResult<BillingClaim> {
        let mut tx = self.begin().await?;
        let claim = self.load_claim_tx(&mut tx, claim_id).await?;
        lifecycle::ensure_claim_transition(claim.status, to)?;

        let mut query = sqlx::query_as::<_, ClaimRow>(sql).bind(claim_id);
        if let Some(remarks) = remarks {
            query = query.bind(remarks);
        }
        let row = query.fetch_one(&mut *tx).await?;
        tx.commit().await?;
        let updated = row.into_model()?;

        self.emit_audit(
            AuditRecord::new("billing_claim", claim_id, action)
                .with_old(json!({"status": claim.status.as_str()}))
                .with_new(json!({"status": to.as_str()}))
                .by(actor.user_id),
        )
        .await;
        Ok(updated)
    }
}
