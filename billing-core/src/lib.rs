//! Billing ledger domain core for the CareLedger engine
//!
//! Provides the ledger and allocation model shared by the store and server:
//! - Billing cases, invoices and per-line insurer/patient liability splits
//! - Payment allocation (oldest-invoice-first, shared by receipts, advance
//!   application and claim settlement)
//! - Advance (deposit) wallet arithmetic
//! - Invoice, preauthorization and claim state machines
//! - Case financial aggregation
//!
//! This crate is pure domain logic: no I/O, no SQL, no async. Persistence
//! and transaction boundaries live in `billing-store`.

pub mod access;
pub mod advance;
pub mod allocation;
pub mod claim;
pub mod dashboard;
pub mod error;
pub mod invoice;
pub mod lines;
pub mod model;
pub mod money;
pub mod split;
pub mod status;

pub use error::{LedgerError, LedgerResult};
pub use model::*;
pub use status::*;
