//! Request/response payloads for the HTTP API.
//!
//! Requests deserialize here and convert into the store's input structs;
//! responses are mostly the `billing-core` models themselves, plus a few
//! composites assembled per endpoint.

use billing_core::{
    BillingInvoice, BillingPayment, BillingPaymentAllocation, CoverageFlag, InvoiceType,
    PayerBucket, PayerKind, PayerMode, PaymentMode, PreauthStatus, ServiceGroup,
};
use billing_store::cases::OpenCase;
use billing_store::claims::UpsertInsuranceCase;
use billing_store::invoices::{CreateInvoice, NewLine};
use billing_store::payments::{PaymentReceipt, RecordAdvance, RecordPayment};
use billing_store::split::SplitOutcome;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

fn default_coverage() -> CoverageFlag {
    CoverageFlag::NotCovered
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OpenCaseRequest {
    pub patient_id: Uuid,
    pub encounter_type: String,
    pub encounter_id: Uuid,
    pub payer_mode: PayerMode,
    pub default_payer_id: Option<Uuid>,
    pub default_tpa_id: Option<Uuid>,
    pub default_plan_id: Option<Uuid>,
}

impl From<OpenCaseRequest> for OpenCase {
    fn from(r: OpenCaseRequest) -> Self {
        Self {
            patient_id: r.patient_id,
            encounter_type: r.encounter_type,
            encounter_id: r.encounter_id,
            payer_mode: r.payer_mode,
            default_payer_id: r.default_payer_id,
            default_tpa_id: r.default_tpa_id,
            default_plan_id: r.default_plan_id,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CloseCaseRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateInvoiceRequest {
    pub billing_case_id: Uuid,
    pub module: String,
    pub invoice_type: InvoiceType,
    pub payer_kind: Option<PayerKind>,
    pub payer_id: Option<Uuid>,
    pub service_date: DateTime<Utc>,
}

impl From<CreateInvoiceRequest> for CreateInvoice {
    fn from(r: CreateInvoiceRequest) -> Self {
        Self {
            billing_case_id: r.billing_case_id,
            module: r.module,
            invoice_type: r.invoice_type,
            payer_kind: r.payer_kind,
            payer_id: r.payer_id,
            service_date: r.service_date,
        }
    }
}

/// Pricing fields shared by every line-writing endpoint.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LineRequest {
    pub service_group: ServiceGroup,
    pub description: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub gst_rate: Decimal,
    #[serde(default = "default_coverage")]
    pub is_covered: CoverageFlag,
    pub approved_amount: Option<Decimal>,
    #[serde(default)]
    pub requires_preauth: bool,
}

impl From<LineRequest> for NewLine {
    fn from(r: LineRequest) -> Self {
        Self {
            service_group: r.service_group,
            description: r.description,
            qty: r.qty,
            unit_price: r.unit_price,
            discount_percent: r.discount_percent,
            discount_amount: r.discount_amount,
            gst_rate: r.gst_rate,
            is_covered: r.is_covered,
            approved_amount: r.approved_amount,
            requires_preauth: r.requires_preauth,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SourceLineRequest {
    pub source_module: String,
    pub source_ref_id: Uuid,
    pub source_line_key: String,
    pub line: LineRequest,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ManualLineRequest {
    pub line: LineRequest,
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLineRequest {
    pub line: LineRequest,
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecideEditRequest {
    pub approve: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SplitRequest {
    #[serde(default)]
    pub allow_payment_migration: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordPaymentRequest {
    pub billing_case_id: Uuid,
    pub payer_bucket: PayerBucket,
    pub payer_id: Option<Uuid>,
    pub mode: PaymentMode,
    pub amount: Decimal,
    /// Settle only this invoice; omitted means all open invoices of the
    /// case, oldest first.
    pub invoice_id: Option<Uuid>,
}

impl From<RecordPaymentRequest> for RecordPayment {
    fn from(r: RecordPaymentRequest) -> Self {
        Self {
            billing_case_id: r.billing_case_id,
            payer_bucket: r.payer_bucket,
            payer_id: r.payer_id,
            mode: r.mode,
            amount: r.amount,
            invoice_id: r.invoice_id,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordAdvanceRequest {
    pub billing_case_id: Uuid,
    pub mode: PaymentMode,
    pub amount: Decimal,
    pub remarks: Option<String>,
}

impl From<RecordAdvanceRequest> for RecordAdvance {
    fn from(r: RecordAdvanceRequest) -> Self {
        Self {
            billing_case_id: r.billing_case_id,
            mode: r.mode,
            amount: r.amount,
            remarks: r.remarks,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundAdvanceRequest {
    pub amount: Decimal,
    pub mode: PaymentMode,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplyAdvanceRequest {
    /// Invoices the wallet money goes to; every id must be an open
    /// patient-due invoice of the case.
    pub invoice_ids: Vec<Uuid>,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertInsuranceCaseRequest {
    pub billing_case_id: Uuid,
    pub payer_kind: PayerKind,
    pub insurer_id: Option<Uuid>,
    pub tpa_id: Option<Uuid>,
    pub corporate_id: Option<Uuid>,
    pub policy_number: Option<String>,
    pub member_id: Option<String>,
}

impl From<UpsertInsuranceCaseRequest> for UpsertInsuranceCase {
    fn from(r: UpsertInsuranceCaseRequest) -> Self {
        Self {
            billing_case_id: r.billing_case_id,
            payer_kind: r.payer_kind,
            insurer_id: r.insurer_id,
            tpa_id: r.tpa_id,
            corporate_id: r.corporate_id,
            policy_number: r.policy_number,
            member_id: r.member_id,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePreauthRequest {
    pub insurance_case_id: Uuid,
    pub requested_amount: Decimal,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecidePreauthRequest {
    pub decision: PreauthStatus,
    pub approved_amount: Option<Decimal>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RemarksRequest {
    pub remarks: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveClaimRequest {
    pub approved_amount: Decimal,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SettleClaimRequest {
    pub settled_amount: Decimal,
    pub mode: PaymentMode,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentReceiptResponse {
    pub payment: BillingPayment,
    pub allocations: Vec<BillingPaymentAllocation>,
}

impl From<PaymentReceipt> for PaymentReceiptResponse {
    fn from(r: PaymentReceipt) -> Self {
        Self {
            payment: r.payment,
            allocations: r.allocations,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SplitResponse {
    pub source: BillingInvoice,
    pub patient_invoice: Option<BillingInvoice>,
    pub insurer_invoice: BillingInvoice,
}

impl From<SplitOutcome> for SplitResponse {
    fn from(r: SplitOutcome) -> Self {
        Self {
            source: r.source,
            patient_invoice: r.patient_invoice,
            insurer_invoice: r.insurer_invoice,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
}
