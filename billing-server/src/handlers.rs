//! HTTP handlers: one thin function per ledger operation.
//!
//! Handlers do no business logic; they convert payloads, call the store
//! and let `ApiError` shape failures.

use crate::dto::*;
use crate::error::ApiResult;
use axum::extract::{Path, State};
use axum::Json;
use crate::auth::AuthActor;
use billing_core::dashboard::CaseFinancials;
use billing_core::{
    BillingAdvance, BillingCase, BillingClaim, BillingInsuranceCase, BillingInvoice,
    BillingInvoiceLine, BillingPayment, BillingPreauthRequest, ClaimInvoiceLink,
    InvoiceEditRequest,
};
use billing_store::LedgerStore;
use uuid::Uuid;

// ---- health ----

#[utoipa::path(get, path = "/health", tag = "ops",
    responses((status = 200, description = "Service and database health", body = HealthResponse)))]
pub async fn health(State(store): State<LedgerStore>) -> Json<HealthResponse> {
    let database = store.pool().is_healthy().await;
    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
    })
}

// ---- cases ----

#[utoipa::path(post, path = "/cases", tag = "cases", request_body = OpenCaseRequest,
    responses((status = 200, description = "The open (possibly pre-existing) case", body = BillingCase)))]
pub async fn open_case(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Json(body): Json<OpenCaseRequest>,
) -> ApiResult<Json<BillingCase>> {
    Ok(Json(store.open_case(&actor, body.into()).await?))
}

#[utoipa::path(get, path = "/cases/{id}", tag = "cases",
    params(("id" = Uuid, Path, description = "Billing case id")),
    responses((status = 200, body = BillingCase)))]
pub async fn get_case(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BillingCase>> {
    Ok(Json(store.get_case(id).await?))
}

#[utoipa::path(post, path = "/cases/{id}/close", tag = "cases",
    params(("id" = Uuid, Path, description = "Billing case id")),
    request_body = CloseCaseRequest,
    responses((status = 200, body = BillingCase)))]
pub async fn close_case(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<CloseCaseRequest>,
) -> ApiResult<Json<BillingCase>> {
    Ok(Json(store.close_case(&actor, id, body.force).await?))
}

#[utoipa::path(get, path = "/cases/{id}/financials", tag = "cases",
    params(("id" = Uuid, Path, description = "Billing case id")),
    responses((status = 200, description = "Case financial dashboard", body = CaseFinancials)))]
pub async fn case_financials(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CaseFinancials>> {
    Ok(Json(store.case_financials(id).await?))
}

// ---- invoices ----

#[utoipa::path(post, path = "/invoices", tag = "invoices", request_body = CreateInvoiceRequest,
    responses((status = 200, body = BillingInvoice)))]
pub async fn create_invoice(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Json(body): Json<CreateInvoiceRequest>,
) -> ApiResult<Json<BillingInvoice>> {
    Ok(Json(store.create_invoice(&actor, body.into()).await?))
}

#[utoipa::path(get, path = "/invoices/{id}", tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses((status = 200, body = BillingInvoice)))]
pub async fn get_invoice(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BillingInvoice>> {
    Ok(Json(store.get_invoice(id).await?))
}

#[utoipa::path(get, path = "/cases/{id}/invoices", tag = "invoices",
    params(("id" = Uuid, Path, description = "Billing case id")),
    responses((status = 200, body = [BillingInvoice])))]
pub async fn list_invoices(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BillingInvoice>>> {
    Ok(Json(store.list_invoices(id).await?))
}

#[utoipa::path(get, path = "/invoices/{id}/lines", tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses((status = 200, body = [BillingInvoiceLine])))]
pub async fn list_lines(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BillingInvoiceLine>>> {
    Ok(Json(store.list_lines(id).await?))
}

#[utoipa::path(post, path = "/invoices/{id}/lines/source", tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = SourceLineRequest,
    responses((status = 200, description = "The captured (or re-priced) line", body = BillingInvoiceLine)))]
pub async fn add_source_line(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<SourceLineRequest>,
) -> ApiResult<Json<BillingInvoiceLine>> {
    let key = billing_core::lines::SourceKey {
        source_module: body.source_module,
        source_ref_id: body.source_ref_id,
        source_line_key: body.source_line_key,
    };
    Ok(Json(
        store
            .add_source_line(&actor, id, key, body.line.into())
            .await?,
    ))
}

#[utoipa::path(post, path = "/invoices/{id}/lines/manual", tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = ManualLineRequest,
    responses((status = 200, body = BillingInvoiceLine)))]
pub async fn add_manual_line(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<ManualLineRequest>,
) -> ApiResult<Json<BillingInvoiceLine>> {
    Ok(Json(
        store
            .add_manual_line(&actor, id, body.line.into(), &body.reason)
            .await?,
    ))
}

#[utoipa::path(put, path = "/lines/{id}", tag = "invoices",
    params(("id" = Uuid, Path, description = "Line id")),
    request_body = UpdateLineRequest,
    responses((status = 200, body = BillingInvoiceLine)))]
pub async fn update_line(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateLineRequest>,
) -> ApiResult<Json<BillingInvoiceLine>> {
    Ok(Json(
        store
            .update_line(&actor, id, body.line.into(), &body.reason)
            .await?,
    ))
}

#[utoipa::path(delete, path = "/lines/{id}", tag = "invoices",
    params(("id" = Uuid, Path, description = "Line id")),
    request_body = ReasonRequest,
    responses((status = 204, description = "Line soft-deleted")))]
pub async fn delete_line(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonRequest>,
) -> ApiResult<axum::http::StatusCode> {
    store.delete_line(&actor, id, &body.reason).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[utoipa::path(post, path = "/invoices/{id}/approve", tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses((status = 200, body = BillingInvoice)))]
pub async fn approve_invoice(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BillingInvoice>> {
    Ok(Json(store.approve_invoice(&actor, id).await?))
}

#[utoipa::path(post, path = "/invoices/{id}/post", tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice posted; draft claim maintained", body = BillingInvoice),
        (status = 422, description = "Posting gate failed")))]
pub async fn post_invoice(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BillingInvoice>> {
    Ok(Json(store.post_invoice(&actor, id).await?))
}

#[utoipa::path(post, path = "/invoices/{id}/void", tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = ReasonRequest,
    responses((status = 200, body = BillingInvoice)))]
pub async fn void_invoice(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonRequest>,
) -> ApiResult<Json<BillingInvoice>> {
    Ok(Json(store.void_invoice(&actor, id, &body.reason).await?))
}

#[utoipa::path(post, path = "/invoices/{id}/split", tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = SplitRequest,
    responses((status = 200, description = "Source voided, share invoices created", body = SplitResponse)))]
pub async fn split_invoice(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<SplitRequest>,
) -> ApiResult<Json<SplitResponse>> {
    Ok(Json(
        store
            .split_invoice(&actor, id, body.allow_payment_migration)
            .await?
            .into(),
    ))
}

#[utoipa::path(post, path = "/invoices/{id}/edit-requests", tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = ReasonRequest,
    responses((status = 200, description = "Pending request (new or existing)", body = InvoiceEditRequest)))]
pub async fn request_edit(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonRequest>,
) -> ApiResult<Json<InvoiceEditRequest>> {
    Ok(Json(store.request_edit(&actor, id, &body.reason).await?))
}

#[utoipa::path(post, path = "/edit-requests/{id}/decide", tag = "invoices",
    params(("id" = Uuid, Path, description = "Edit request id")),
    request_body = DecideEditRequest,
    responses((status = 200, body = InvoiceEditRequest)))]
pub async fn decide_edit(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<DecideEditRequest>,
) -> ApiResult<Json<InvoiceEditRequest>> {
    Ok(Json(
        store
            .decide_edit(&actor, id, body.approve, body.reason.as_deref())
            .await?,
    ))
}

// ---- payments and advances ----

#[utoipa::path(post, path = "/payments", tag = "payments", request_body = RecordPaymentRequest,
    responses(
        (status = 200, description = "Receipt with its allocations", body = PaymentReceiptResponse),
        (status = 422, description = "Amount exceeds outstanding")))]
pub async fn record_payment(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Json(body): Json<RecordPaymentRequest>,
) -> ApiResult<Json<PaymentReceiptResponse>> {
    Ok(Json(store.record_payment(&actor, body.into()).await?.into()))
}

#[utoipa::path(post, path = "/payments/{id}/void", tag = "payments",
    params(("id" = Uuid, Path, description = "Payment id")),
    request_body = ReasonRequest,
    responses((status = 200, body = BillingPayment)))]
pub async fn void_payment(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonRequest>,
) -> ApiResult<Json<BillingPayment>> {
    Ok(Json(store.void_payment(&actor, id, &body.reason).await?))
}

#[utoipa::path(get, path = "/cases/{id}/payments", tag = "payments",
    params(("id" = Uuid, Path, description = "Billing case id")),
    responses((status = 200, body = [BillingPayment])))]
pub async fn list_payments(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BillingPayment>>> {
    Ok(Json(store.list_payments(id).await?))
}

#[utoipa::path(post, path = "/advances", tag = "advances", request_body = RecordAdvanceRequest,
    responses((status = 200, body = BillingAdvance)))]
pub async fn record_advance(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Json(body): Json<RecordAdvanceRequest>,
) -> ApiResult<Json<BillingAdvance>> {
    Ok(Json(store.record_advance(&actor, body.into()).await?))
}

#[utoipa::path(post, path = "/cases/{id}/advances/refund", tag = "advances",
    params(("id" = Uuid, Path, description = "Billing case id")),
    request_body = RefundAdvanceRequest,
    responses(
        (status = 200, body = BillingAdvance),
        (status = 422, description = "Refund exceeds wallet balance")))]
pub async fn refund_advance(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<RefundAdvanceRequest>,
) -> ApiResult<Json<BillingAdvance>> {
    Ok(Json(
        store
            .refund_advance(&actor, id, body.amount, body.mode, body.remarks)
            .await?,
    ))
}

#[utoipa::path(post, path = "/cases/{id}/advances/apply", tag = "advances",
    params(("id" = Uuid, Path, description = "Billing case id")),
    request_body = ApplyAdvanceRequest,
    responses((status = 200, description = "Adjustment payment with allocations", body = PaymentReceiptResponse)))]
pub async fn apply_advances(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<ApplyAdvanceRequest>,
) -> ApiResult<Json<PaymentReceiptResponse>> {
    Ok(Json(
        store
            .apply_advances(&actor, id, &body.invoice_ids, body.amount)
            .await?
            .into(),
    ))
}

#[utoipa::path(get, path = "/cases/{id}/advances", tag = "advances",
    params(("id" = Uuid, Path, description = "Billing case id")),
    responses((status = 200, body = [BillingAdvance])))]
pub async fn list_advances(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BillingAdvance>>> {
    Ok(Json(store.list_advances(id).await?))
}

// ---- insurance, preauth, claims ----

#[utoipa::path(post, path = "/insurance-cases", tag = "insurance",
    request_body = UpsertInsuranceCaseRequest,
    responses((status = 200, body = BillingInsuranceCase)))]
pub async fn upsert_insurance_case(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Json(body): Json<UpsertInsuranceCaseRequest>,
) -> ApiResult<Json<BillingInsuranceCase>> {
    Ok(Json(store.upsert_insurance_case(&actor, body.into()).await?))
}

#[utoipa::path(get, path = "/cases/{id}/insurance", tag = "insurance",
    params(("id" = Uuid, Path, description = "Billing case id")),
    responses((status = 200, description = "The payer record, or null for self-pay cases")))]
pub async fn get_insurance_case(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Option<BillingInsuranceCase>>> {
    Ok(Json(store.get_insurance_case(id).await?))
}

#[utoipa::path(post, path = "/preauths", tag = "insurance", request_body = CreatePreauthRequest,
    responses((status = 200, body = BillingPreauthRequest)))]
pub async fn create_preauth(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Json(body): Json<CreatePreauthRequest>,
) -> ApiResult<Json<BillingPreauthRequest>> {
    Ok(Json(
        store
            .create_preauth(&actor, body.insurance_case_id, body.requested_amount, body.remarks)
            .await?,
    ))
}

#[utoipa::path(post, path = "/preauths/{id}/submit", tag = "insurance",
    params(("id" = Uuid, Path, description = "Preauth id")),
    responses((status = 200, body = BillingPreauthRequest)))]
pub async fn submit_preauth(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BillingPreauthRequest>> {
    Ok(Json(store.submit_preauth(&actor, id).await?))
}

#[utoipa::path(post, path = "/preauths/{id}/decide", tag = "insurance",
    params(("id" = Uuid, Path, description = "Preauth id")),
    request_body = DecidePreauthRequest,
    responses((status = 200, body = BillingPreauthRequest)))]
pub async fn decide_preauth(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<DecidePreauthRequest>,
) -> ApiResult<Json<BillingPreauthRequest>> {
    Ok(Json(
        store
            .decide_preauth(&actor, id, body.decision, body.approved_amount, body.remarks)
            .await?,
    ))
}

#[utoipa::path(get, path = "/insurance-cases/{id}/preauths", tag = "insurance",
    params(("id" = Uuid, Path, description = "Insurance case id")),
    responses((status = 200, body = [BillingPreauthRequest])))]
pub async fn list_preauths(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BillingPreauthRequest>>> {
    Ok(Json(store.list_preauths(id).await?))
}

#[utoipa::path(get, path = "/claims/{id}", tag = "claims",
    params(("id" = Uuid, Path, description = "Claim id")),
    responses((status = 200, body = BillingClaim)))]
pub async fn get_claim(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BillingClaim>> {
    Ok(Json(store.get_claim(id).await?))
}

#[utoipa::path(get, path = "/insurance-cases/{id}/claims", tag = "claims",
    params(("id" = Uuid, Path, description = "Insurance case id")),
    responses((status = 200, body = [BillingClaim])))]
pub async fn list_claims(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BillingClaim>>> {
    Ok(Json(store.list_claims(id).await?))
}

#[utoipa::path(get, path = "/claims/{id}/invoices", tag = "claims",
    params(("id" = Uuid, Path, description = "Claim id")),
    responses((status = 200, body = [ClaimInvoiceLink])))]
pub async fn claim_invoices(
    State(store): State<LedgerStore>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ClaimInvoiceLink>>> {
    Ok(Json(store.claim_invoices(id).await?))
}

#[utoipa::path(post, path = "/claims/{id}/submit", tag = "claims",
    params(("id" = Uuid, Path, description = "Claim id")),
    responses((status = 200, description = "Claim submitted with re-derived amount", body = BillingClaim)))]
pub async fn submit_claim(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BillingClaim>> {
    Ok(Json(store.submit_claim(&actor, id).await?))
}

#[utoipa::path(post, path = "/claims/{id}/acknowledge", tag = "claims",
    params(("id" = Uuid, Path, description = "Claim id")),
    responses((status = 200, body = BillingClaim)))]
pub async fn acknowledge_claim(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BillingClaim>> {
    Ok(Json(store.acknowledge_claim(&actor, id).await?))
}

#[utoipa::path(post, path = "/claims/{id}/query", tag = "claims",
    params(("id" = Uuid, Path, description = "Claim id")),
    request_body = RemarksRequest,
    responses((status = 200, body = BillingClaim)))]
pub async fn query_claim(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<RemarksRequest>,
) -> ApiResult<Json<BillingClaim>> {
    Ok(Json(store.query_claim(&actor, id, &body.remarks).await?))
}

#[utoipa::path(post, path = "/claims/{id}/approve", tag = "claims",
    params(("id" = Uuid, Path, description = "Claim id")),
    request_body = ApproveClaimRequest,
    responses((status = 200, body = BillingClaim)))]
pub async fn approve_claim(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<ApproveClaimRequest>,
) -> ApiResult<Json<BillingClaim>> {
    Ok(Json(
        store.approve_claim(&actor, id, body.approved_amount).await?,
    ))
}

#[utoipa::path(post, path = "/claims/{id}/deny", tag = "claims",
    params(("id" = Uuid, Path, description = "Claim id")),
    request_body = RemarksRequest,
    responses((status = 200, body = BillingClaim)))]
pub async fn deny_claim(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<RemarksRequest>,
) -> ApiResult<Json<BillingClaim>> {
    Ok(Json(store.deny_claim(&actor, id, &body.remarks).await?))
}

#[utoipa::path(post, path = "/claims/{id}/settle", tag = "claims",
    params(("id" = Uuid, Path, description = "Claim id")),
    request_body = SettleClaimRequest,
    responses(
        (status = 200, description = "Claim settled; insurer receipt allocated", body = BillingClaim),
        (status = 422, description = "Settlement exceeds approved amount or open dues")))]
pub async fn settle_claim(
    State(store): State<LedgerStore>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(body): Json<SettleClaimRequest>,
) -> ApiResult<Json<BillingClaim>> {
    Ok(Json(
        store
            .settle_claim(&actor, id, body.settled_amount, body.mode)
            .await?,
    ))
}
