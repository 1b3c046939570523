//! Write-only audit trail for billing document mutations.
//!
//! The ledger records one `AuditRecord` per invoice/claim/insurance-case
//! mutation and hands it to an `AuditSink`. Sinks are fire-and-forget:
//! a failing sink is logged and never fails the business transaction.

pub mod entry;
pub mod sink;

pub use entry::AuditRecord;
pub use sink::{AuditSink, TracingSink};
