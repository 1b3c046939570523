//! Row structs and the string⇄enum persistence boundary.
//!
//! Status columns are TEXT in Postgres; decoding into the closed enums of
//! `billing-core` happens here and nowhere else.

use crate::error::StoreResult;
use billing_core::*;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct CaseRow {
    pub id: Uuid,
    pub case_number: String,
    pub patient_id: Uuid,
    pub encounter_type: String,
    pub encounter_id: Uuid,
    pub status: String,
    pub payer_mode: String,
    pub default_payer_id: Option<Uuid>,
    pub default_tpa_id: Option<Uuid>,
    pub default_plan_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CaseRow {
    pub fn into_model(self) -> StoreResult<BillingCase> {
        Ok(BillingCase {
            id: self.id,
            case_number: self.case_number,
            patient_id: self.patient_id,
            encounter_type: self.encounter_type,
            encounter_id: self.encounter_id,
            status: self.status.parse::<CaseStatus>()?,
            payer_mode: self.payer_mode.parse::<PayerMode>()?,
            default_payer_id: self.default_payer_id,
            default_tpa_id: self.default_tpa_id,
            default_plan_id: self.default_plan_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub billing_case_id: Uuid,
    pub invoice_number: String,
    pub module: String,
    pub invoice_type: String,
    pub payer_kind: Option<String>,
    pub payer_id: Option<Uuid>,
    pub status: String,
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

impl InvoiceRow {
    pub fn into_model(self) -> StoreResult<BillingInvoice> {
        Ok(BillingInvoice {
            id: self.id,
            billing_case_id: self.billing_case_id,
            invoice_number: self.invoice_number,
            module: self.module,
            invoice_type: self.invoice_type.parse::<InvoiceType>()?,
            payer_kind: self
                .payer_kind
                .as_deref()
                .map(str::parse::<PayerKind>)
                .transpose()?,
            payer_id: self.payer_id,
            status: self.status.parse::<DocStatus>()?,
            accepts_patient_advance: self.accepts_patient_advance,
            sub_total: self.sub_total,
            discount_total: self.discount_total,
            tax_total: self.tax_total,
            round_off: self.round_off,
            grand_total: self.grand_total,
            service_date: self.service_date,
            approved_at: self.approved_at,
            approved_by: self.approved_by,
            posted_at: self.posted_at,
            posted_by: self.posted_by,
            voided_at: self.voided_at,
            voided_by: self.voided_by,
            void_reason: self.void_reason,
            meta: self.meta,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct InvoiceLineRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub service_group: String,
    pub description: String,
    pub qty: Decimal,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub gst_rate: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
    pub net_amount: Decimal,
    pub is_covered: String,
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

impl InvoiceLineRow {
    pub fn into_model(self) -> StoreResult<BillingInvoiceLine> {
        Ok(BillingInvoiceLine {
            id: self.id,
            invoice_id: self.invoice_id,
            service_group: self.service_group.parse::<ServiceGroup>()?,
            description: self.description,
            qty: self.qty,
            unit_price: self.unit_price,
            discount_percent: self.discount_percent,
            discount_amount: self.discount_amount,
            gst_rate: self.gst_rate,
            tax_amount: self.tax_amount,
            line_total: self.line_total,
            net_amount: self.net_amount,
            is_covered: self.is_covered.parse::<CoverageFlag>()?,
            approved_amount: self.approved_amount,
            insurer_pay_amount: self.insurer_pay_amount,
            patient_pay_amount: self.patient_pay_amount,
            requires_preauth: self.requires_preauth,
            source_module: self.source_module,
            source_ref_id: self.source_ref_id,
            source_line_key: self.source_line_key,
            is_manual: self.is_manual,
            manual_reason: self.manual_reason,
            is_deleted: self.is_deleted,
            meta: self.meta,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub billing_case_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub payer_bucket: String,
    pub payer_id: Option<Uuid>,
    pub mode: String,
    pub amount: Decimal,
    pub kind: String,
    pub direction: String,
    pub status: String,
    pub receipt_number: String,
    pub received_by: Option<Uuid>,
    pub received_at: DateTime<Utc>,
    pub void_reason: Option<String>,
    pub meta: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl PaymentRow {
    pub fn into_model(self) -> StoreResult<BillingPayment> {
        Ok(BillingPayment {
            id: self.id,
            billing_case_id: self.billing_case_id,
            invoice_id: self.invoice_id,
            payer_bucket: self.payer_bucket.parse::<PayerBucket>()?,
            payer_id: self.payer_id,
            mode: self.mode.parse::<PaymentMode>()?,
            amount: self.amount,
            kind: self.kind.parse::<PaymentKind>()?,
            direction: self.direction.parse::<PaymentDirection>()?,
            status: self.status.parse::<PayStatus>()?,
            receipt_number: self.receipt_number,
            received_by: self.received_by,
            received_at: self.received_at,
            void_reason: self.void_reason,
            meta: self.meta,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AllocationRow {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub payer_bucket: String,
    pub amount: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl AllocationRow {
    pub fn into_model(self) -> StoreResult<BillingPaymentAllocation> {
        Ok(BillingPaymentAllocation {
            id: self.id,
            payment_id: self.payment_id,
            invoice_id: self.invoice_id,
            payer_bucket: self.payer_bucket.parse::<PayerBucket>()?,
            amount: self.amount,
            status: self.status.parse::<PayStatus>()?,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AdvanceRow {
    pub id: Uuid,
    pub billing_case_id: Uuid,
    pub entry_type: String,
    pub mode: String,
    pub amount: Decimal,
    pub remarks: Option<String>,
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AdvanceRow {
    pub fn into_model(self) -> StoreResult<BillingAdvance> {
        Ok(BillingAdvance {
            id: self.id,
            billing_case_id: self.billing_case_id,
            entry_type: self.entry_type.parse::<AdvanceEntryType>()?,
            mode: self.mode.parse::<PaymentMode>()?,
            amount: self.amount,
            remarks: self.remarks,
            recorded_by: self.recorded_by,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AdvanceApplicationRow {
    pub id: Uuid,
    pub advance_id: Uuid,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl AdvanceApplicationRow {
    pub fn into_model(self) -> BillingAdvanceApplication {
        BillingAdvanceApplication {
            id: self.id,
            advance_id: self.advance_id,
            payment_id: self.payment_id,
            amount: self.amount,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct InsuranceCaseRow {
    pub id: Uuid,
    pub billing_case_id: Uuid,
    pub payer_kind: String,
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

impl InsuranceCaseRow {
    pub fn into_model(self) -> StoreResult<BillingInsuranceCase> {
        Ok(BillingInsuranceCase {
            id: self.id,
            billing_case_id: self.billing_case_id,
            payer_kind: self.payer_kind.parse::<PayerKind>()?,
            insurer_id: self.insurer_id,
            tpa_id: self.tpa_id,
            corporate_id: self.corporate_id,
            policy_number: self.policy_number,
            member_id: self.member_id,
            approved_limit: self.approved_limit,
            approved_at: self.approved_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PreauthRow {
    pub id: Uuid,
    pub insurance_case_id: Uuid,
    pub preauth_number: String,
    pub requested_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub status: String,
    pub remarks: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PreauthRow {
    pub fn into_model(self) -> StoreResult<BillingPreauthRequest> {
        Ok(BillingPreauthRequest {
            id: self.id,
            insurance_case_id: self.insurance_case_id,
            preauth_number: self.preauth_number,
            requested_amount: self.requested_amount,
            approved_amount: self.approved_amount,
            status: self.status.parse::<PreauthStatus>()?,
            remarks: self.remarks,
            submitted_at: self.submitted_at,
            decided_at: self.decided_at,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ClaimRow {
    pub id: Uuid,
    pub insurance_case_id: Uuid,
    pub claim_number: String,
    pub claim_amount: Decimal,
    pub approved_amount: Option<Decimal>,
    pub settled_amount: Option<Decimal>,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClaimRow {
    pub fn into_model(self) -> StoreResult<BillingClaim> {
        Ok(BillingClaim {
            id: self.id,
            insurance_case_id: self.insurance_case_id,
            claim_number: self.claim_number,
            claim_amount: self.claim_amount,
            approved_amount: self.approved_amount,
            settled_amount: self.settled_amount,
            status: self.status.parse::<ClaimStatus>()?,
            submitted_at: self.submitted_at,
            acknowledged_at: self.acknowledged_at,
            decided_at: self.decided_at,
            settled_at: self.settled_at,
            remarks: self.remarks,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ClaimInvoiceRow {
    pub claim_id: Uuid,
    pub invoice_id: Uuid,
    pub invoice_number: String,
}

impl ClaimInvoiceRow {
    pub fn into_model(self) -> ClaimInvoiceLink {
        ClaimInvoiceLink {
            claim_id: self.claim_id,
            invoice_id: self.invoice_id,
            invoice_number: self.invoice_number,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct EditRequestRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub status: String,
    pub reason: String,
    pub requested_by: Uuid,
    pub requested_at: DateTime<Utc>,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_reason: Option<String>,
    pub unlock_until: Option<DateTime<Utc>>,
}

impl EditRequestRow {
    pub fn into_model(self) -> StoreResult<InvoiceEditRequest> {
        Ok(InvoiceEditRequest {
            id: self.id,
            invoice_id: self.invoice_id,
            status: self.status.parse::<EditRequestStatus>()?,
            reason: self.reason,
            requested_by: self.requested_by,
            requested_at: self.requested_at,
            decided_by: self.decided_by,
            decided_at: self.decided_at,
            decision_reason: self.decision_reason,
            unlock_until: self.unlock_until,
        })
    }
}
