use crate::status::*;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Aggregate financial record for one clinical encounter.
///
/// Exactly one case exists per `(encounter_type, encounter_id)`; creation is
/// idempotent behind a uniqueness constraint.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BillingCase {
    pub id: Uuid,
    pub case_number: String,
    pub patient_id: Uuid,
    pub encounter_type: String,
    pub encounter_id: Uuid,
    pub status: CaseStatus,
    pub payer_mode: PayerMode,
    pub default_payer_id: Option<Uuid>,
    pub default_tpa_id: Option<Uuid>,
    pub default_plan_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A billable document scoped to one case, one service module and one payer.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BillingInvoice {
    pub id: Uuid,
    pub billing_case_id: Uuid,
    pub invoice_number: String,
    pub module: String,
    pub invoice_type: InvoiceType,
    pub payer_kind: Option<PayerKind>,
    pub payer_id: Option<Uuid>,
    pub status: DocStatus,
    /// Whether patient advances may be applied against this invoice.
    /// Set false at creation for insurer-billed invoices.
    pub accepts_patient_advance: bool,
    pub sub_total: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub round_off: Decimal,
    pub grand_total: Decimal,
    pub service_date: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub posted_at: Option<DateTime<Utc>>,
    pub posted_by: Option<Uuid>,
    pub voided_at: Option<DateTime<Utc>>,
    pub voided_by: Option<Uuid>,
    pub void_reason: Option<String>,
    pub meta: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillingInvoice {
    /// Active invoices participate in due/paid/claim aggregates.
    pub fn is_active(&self) -> bool {
        self.status != DocStatus::Void
    }

    /// Sort key for oldest-first settlement: posted time (falling back to
    /// creation time), then id for a stable tie-break.
    pub fn settlement_sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.posted_at.unwrap_or(self.created_at), self.id)
    }
}

/// One charge line of an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BillingInvoiceLine {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub service_group: ServiceGroup,
    pub description: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub gst_rate: Decimal,
    pub tax_amount: Decimal,
    /// qty × unit_price − discount.
    pub line_total: Decimal,
    /// line_total + tax; always equals insurer + patient shares.
    pub net_amount: Decimal,
    pub is_covered: CoverageFlag,
    pub approved_amount: Option<Decimal>,
    pub insurer_pay_amount: Decimal,
    pub patient_pay_amount: Decimal,
    pub requires_preauth: bool,
    pub source_module: Option<String>,
    pub source_ref_id: Option<Uuid>,
    pub source_line_key: Option<String>,
    pub is_manual: bool,
    pub manual_reason: Option<String>,
    pub is_deleted: bool,
    pub meta: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillingInvoiceLine {
    /// Lines excluded from every aggregate once soft-deleted.
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// One money-receipt event against a case. Immutable after creation except
/// for voiding.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BillingPayment {
    pub id: Uuid,
    pub billing_case_id: Uuid,
    /// Set when the receipt targeted one invoice; allocations remain the
    /// settlement source of truth either way.
    pub invoice_id: Option<Uuid>,
    pub payer_bucket: PayerBucket,
    pub payer_id: Option<Uuid>,
    pub mode: PaymentMode,
    pub amount: Decimal,
    pub kind: PaymentKind,
    pub direction: PaymentDirection,
    pub status: PayStatus,
    pub receipt_number: String,
    pub received_by: Option<Uuid>,
    pub received_at: DateTime<Utc>,
    pub void_reason: Option<String>,
    pub meta: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// How much of one payment settled one invoice for one bucket.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BillingPaymentAllocation {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub payer_bucket: PayerBucket,
    pub amount: Decimal,
    pub status: PayStatus,
    pub created_at: DateTime<Utc>,
}

/// Advance (deposit) wallet entry, independent of any invoice.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BillingAdvance {
    pub id: Uuid,
    pub billing_case_id: Uuid,
    pub entry_type: AdvanceEntryType,
    pub mode: PaymentMode,
    pub amount: Decimal,
    pub remarks: Option<String>,
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Consumption of one advance entry by one ADVANCE_ADJUSTMENT payment.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BillingAdvanceApplication {
    pub id: Uuid,
    pub advance_id: Uuid,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Payer-side master record for a non-self-pay case.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BillingInsuranceCase {
    pub id: Uuid,
    pub billing_case_id: Uuid,
    pub payer_kind: PayerKind,
    pub insurer_id: Option<Uuid>,
    pub tpa_id: Option<Uuid>,
    pub corporate_id: Option<Uuid>,
    pub policy_number: Option<String>,
    pub member_id: Option<String>,
    pub approved_limit: Decimal,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One pre-authorization ask/response cycle.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BillingPreauthRequest {
    pub id: Uuid,
    pub insurance_case_id: Uuid,
    pub preauth_number: String,
    pub requested_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub status: PreauthStatus,
    pub remarks: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insurer billing document over one or more posted insurer invoices.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BillingClaim {
    pub id: Uuid,
    pub insurance_case_id: Uuid,
    pub claim_number: String,
    pub claim_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub settled_amount: Option<Decimal>,
    pub status: ClaimStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Explicit claim↔invoice linkage (join rows, not a JSON blob).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ClaimInvoiceLink {
    pub claim_id: Uuid,
    pub invoice_id: Uuid,
    pub invoice_number: String,
}

/// Request/approve/reject cycle that reopens an APPROVED invoice.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct InvoiceEditRequest {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub status: EditRequestStatus,
    pub reason: String,
    pub requested_by: Uuid,
    pub requested_at: DateTime<Utc>,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_reason: Option<String>,
    /// End of the edit window once approved.
    pub unlock_until: Option<DateTime<Utc>>,
}

/// Per (doc_type, prefix, reset_period) atomic document counter.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NumberSeries {
    pub id: Uuid,
    pub doc_type: DocType,
    pub prefix: String,
    pub reset_period: ResetPeriod,
    pub last_period_key: String,
    pub next_number: i64,
    pub padding: u32,
}
