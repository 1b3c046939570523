//! Billing cases: the aggregate root per clinical encounter.

use crate::error::StoreResult;
use crate::rows::CaseRow;
use crate::store::LedgerStore;
use audit_log::AuditRecord;
use billing_core::access::{perm, Actor};
use billing_core::{
    BillingCase, CaseStatus, DocType, LedgerError, PayerMode, ResetPeriod,
};
use tracing::info;
use uuid::Uuid;

/// Input for opening (or re-locating) the case of an encounter.
#[derive(Debug, Clone)]
pub struct OpenCase {
    pub patient_id: Uuid,
    pub encounter_type: String,
    pub encounter_id: Uuid,
    pub payer_mode: PayerMode,
    pub default_payer_id: Option<Uuid>,
    pub default_tpa_id: Option<Uuid>,
    pub default_plan_id: Option<Uuid>,
}

impl LedgerStore {
    /// Open the billing case for an encounter.
    ///
    /// Idempotent: a second call for the same `(encounter_type,
    /// encounter_id)` returns the existing case. The uniqueness constraint
    /// backs this up under concurrency; on conflict the loser re-reads the
    /// winner's row.
    pub async fn open_case(&self, actor: &Actor, input: OpenCase) -> StoreResult<BillingCase> {
        self.authorize(actor, perm::CASE_OPEN)?;
        if input.encounter_type.trim().is_empty() {
            return Err(LedgerError::Validation("encounter_type is required".into()).into());
        }

        if let Some(existing) = self
            .find_case_by_encounter(&input.encounter_type, input.encounter_id)
            .await?
        {
            return Ok(existing);
        }

        let mut tx = self.begin().await?;
        let case_number = self
            .next_document_number(&mut tx, DocType::Case, "BC-", ResetPeriod::Year, 6)
            .await?;

        let inserted = sqlx::query_as::<_, CaseRow>(
            "INSERT INTO billing_cases \
             (case_number, patient_id, encounter_type, encounter_id, payer_mode, \
              default_payer_id, default_tpa_id, default_plan_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(&case_number)
        .bind(input.patient_id)
        .bind(&input.encounter_type)
        .bind(input.encounter_id)
        .bind(input.payer_mode.as_str())
        .bind(input.default_payer_id)
        .bind(input.default_tpa_id)
        .bind(input.default_plan_id)
        .fetch_one(&mut *tx)
        .await;

        let case = match inserted {
            Ok(row) => {
                tx.commit().await?;
                row.into_model()?
            }
            Err(e) => {
                tx.rollback().await?;
                let err = crate::error::StoreError::Database(e);
                if err.is_unique_violation() {
                    // Lost the race; the winner's case is the case.
                    self.find_case_by_encounter(&input.encounter_type, input.encounter_id)
                        .await?
                        .ok_or_else(|| {
                            LedgerError::Concurrency(
                                "case creation conflicted but no existing case was found".into(),
                            )
                        })?
                } else {
                    return Err(err);
                }
            }
        };

        info!(case_number = %case.case_number, patient_id = %case.patient_id, "billing case opened");
        self.emit_audit(
            AuditRecord::new("billing_case", case.id, "open")
                .with_new(serde_json::to_value(&case)?)
                .by(actor.user_id),
        )
        .await;
        Ok(case)
    }

    pub async fn get_case(&self, case_id: Uuid) -> StoreResult<BillingCase> {
        let row = sqlx::query_as::<_, CaseRow>("SELECT * FROM billing_cases WHERE id = $1")
            .bind(case_id)
            .fetch_optional(self.pool.pool())
            .await?
            .ok_or_else(|| LedgerError::not_found("billing_case", case_id))?;
        row.into_model()
    }

    pub async fn find_case_by_encounter(
        &self,
        encounter_type: &str,
        encounter_id: Uuid,
    ) -> StoreResult<Option<BillingCase>> {
        let row = sqlx::query_as::<_, CaseRow>(
            "SELECT * FROM billing_cases WHERE encounter_type = $1 AND encounter_id = $2",
        )
        .bind(encounter_type)
        .bind(encounter_id)
        .fetch_optional(self.pool.pool())
        .await?;
        row.map(CaseRow::into_model).transpose()
    }

    /// Close a case. Unless `force`, closing requires no DRAFT invoices and
    /// zero outstanding across both buckets.
    pub async fn close_case(&self, actor: &Actor, case_id: Uuid, force: bool) -> StoreResult<BillingCase> {
        self.authorize(actor, perm::CASE_CLOSE)?;
        let case = self.get_case(case_id).await?;
        if case.status == CaseStatus::Closed {
            return Err(LedgerError::StateConflict(format!(
                "case {} is already closed",
                case.case_number
            ))
            .into());
        }

        if !force {
            let financials = self.case_financials(case_id).await?;
            if financials.patient_outstanding > rust_decimal::Decimal::ZERO
                || financials.insurer_outstanding > rust_decimal::Decimal::ZERO
            {
                return Err(LedgerError::BusinessRule(format!(
                    "case {} still has outstanding dues (patient {}, insurer {})",
                    case.case_number,
                    financials.patient_outstanding,
                    financials.insurer_outstanding
                ))
                .into());
            }
            let drafts: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM billing_invoices WHERE billing_case_id = $1 AND status = 'DRAFT'",
            )
            .bind(case_id)
            .fetch_one(self.pool.pool())
            .await?;
            if drafts > 0 {
                return Err(LedgerError::BusinessRule(format!(
                    "case {} has {} draft invoice(s)",
                    case.case_number, drafts
                ))
                .into());
            }
        }

        let row = sqlx::query_as::<_, CaseRow>(
            "UPDATE billing_cases SET status = 'CLOSED', updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(case_id)
        .fetch_one(self.pool.pool())
        .await?;
        let closed = row.into_model()?;

        self.emit_audit(
            AuditRecord::new("billing_case", closed.id, "close")
                .with_old(serde_json::to_value(&case)?)
                .with_new(serde_json::to_value(&closed)?)
                .by(actor.user_id),
        )
        .await;
        Ok(closed)
    }
}
