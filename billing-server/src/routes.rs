//! Route table and OpenAPI document.

use crate::handlers;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use billing_store::LedgerStore;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::open_case,
        handlers::get_case,
        handlers::close_case,
        handlers::case_financials,
        handlers::create_invoice,
        handlers::get_invoice,
        handlers::list_invoices,
        handlers::list_lines,
        handlers::add_source_line,
        handlers::add_manual_line,
        handlers::update_line,
        handlers::delete_line,
        handlers::approve_invoice,
        handlers::post_invoice,
        handlers::void_invoice,
        handlers::split_invoice,
        handlers::request_edit,
        handlers::decide_edit,
        handlers::record_payment,
        handlers::void_payment,
        handlers::list_payments,
        handlers::record_advance,
        handlers::refund_advance,
        handlers::apply_advances,
        handlers::list_advances,
        handlers::upsert_insurance_case,
        handlers::get_insurance_case,
        handlers::create_preauth,
        handlers::submit_preauth,
        handlers::decide_preauth,
        handlers::list_preauths,
        handlers::get_claim,
        handlers::list_claims,
        handlers::claim_invoices,
        handlers::submit_claim,
        handlers::acknowledge_claim,
        handlers::query_claim,
        handlers::approve_claim,
        handlers::deny_claim,
        handlers::settle_claim,
    ),
    components(schemas(
        crate::dto::OpenCaseRequest,
        crate::dto::CloseCaseRequest,
        crate::dto::CreateInvoiceRequest,
        crate::dto::LineRequest,
        crate::dto::SourceLineRequest,
        crate::dto::ManualLineRequest,
        crate::dto::UpdateLineRequest,
        crate::dto::ReasonRequest,
        crate::dto::DecideEditRequest,
        crate::dto::SplitRequest,
        crate::dto::RecordPaymentRequest,
        crate::dto::RecordAdvanceRequest,
        crate::dto::RefundAdvanceRequest,
        crate::dto::ApplyAdvanceRequest,
        crate::dto::UpsertInsuranceCaseRequest,
        crate::dto::CreatePreauthRequest,
        crate::dto::DecidePreauthRequest,
        crate::dto::RemarksRequest,
        crate::dto::ApproveClaimRequest,
        crate::dto::SettleClaimRequest,
        crate::dto::PaymentReceiptResponse,
        crate::dto::SplitResponse,
        crate::dto::HealthResponse,
        billing_core::BillingCase,
        billing_core::BillingInvoice,
        billing_core::BillingInvoiceLine,
        billing_core::BillingPayment,
        billing_core::BillingPaymentAllocation,
        billing_core::BillingAdvance,
        billing_core::BillingInsuranceCase,
        billing_core::BillingPreauthRequest,
        billing_core::BillingClaim,
        billing_core::ClaimInvoiceLink,
        billing_core::InvoiceEditRequest,
        billing_core::dashboard::CaseFinancials,
    )),
    tags(
        (name = "ops", description = "Service health"),
        (name = "cases", description = "Billing cases and the financial dashboard"),
        (name = "invoices", description = "Invoices, lines and their lifecycle"),
        (name = "payments", description = "Receipts and allocations"),
        (name = "advances", description = "Advance wallet"),
        (name = "insurance", description = "Insurance cases and preauthorizations"),
        (name = "claims", description = "Claim pipeline and settlement"),
    )
)]
pub struct ApiDoc;

/// Assemble the full application router.
pub fn create_app(store: LedgerStore) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/cases", post(handlers::open_case))
        .route("/cases/:id", get(handlers::get_case))
        .route("/cases/:id/close", post(handlers::close_case))
        .route("/cases/:id/financials", get(handlers::case_financials))
        .route("/cases/:id/invoices", get(handlers::list_invoices))
        .route("/cases/:id/payments", get(handlers::list_payments))
        .route("/cases/:id/advances", get(handlers::list_advances))
        .route("/cases/:id/advances/refund", post(handlers::refund_advance))
        .route("/cases/:id/advances/apply", post(handlers::apply_advances))
        .route("/cases/:id/insurance", get(handlers::get_insurance_case))
        .route("/invoices", post(handlers::create_invoice))
        .route("/invoices/:id", get(handlers::get_invoice))
        .route("/invoices/:id/lines", get(handlers::list_lines))
        .route("/invoices/:id/lines/source", post(handlers::add_source_line))
        .route("/invoices/:id/lines/manual", post(handlers::add_manual_line))
        .route("/invoices/:id/approve", post(handlers::approve_invoice))
        .route("/invoices/:id/post", post(handlers::post_invoice))
        .route("/invoices/:id/void", post(handlers::void_invoice))
        .route("/invoices/:id/split", post(handlers::split_invoice))
        .route("/invoices/:id/edit-requests", post(handlers::request_edit))
        .route("/edit-requests/:id/decide", post(handlers::decide_edit))
        .route("/lines/:id", put(handlers::update_line).delete(handlers::delete_line))
        .route("/payments", post(handlers::record_payment))
        .route("/payments/:id/void", post(handlers::void_payment))
        .route("/advances", post(handlers::record_advance))
        .route("/insurance-cases", post(handlers::upsert_insurance_case))
        .route("/insurance-cases/:id/preauths", get(handlers::list_preauths))
        .route("/insurance-cases/:id/claims", get(handlers::list_claims))
        .route("/preauths", post(handlers::create_preauth))
        .route("/preauths/:id/submit", post(handlers::submit_preauth))
        .route("/preauths/:id/decide", post(handlers::decide_preauth))
        .route("/claims/:id", get(handlers::get_claim))
        .route("/claims/:id/invoices", get(handlers::claim_invoices))
        .route("/claims/:id/submit", post(handlers::submit_claim))
        .route("/claims/:id/acknowledge", post(handlers::acknowledge_claim))
        .route("/claims/:id/query", post(handlers::query_claim))
        .route("/claims/:id/approve", post(handlers::approve_claim))
        .route("/claims/:id/deny", post(handlers::deny_claim))
        .route("/claims/:id/settle", post(handlers::settle_claim))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
