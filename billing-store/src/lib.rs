//! Postgres persistence and transactional orchestration for the billing
//! ledger.
//!
//! Every mutating operation of the ledger runs here inside one sqlx
//! transaction with `SELECT … FOR UPDATE` row locks on everything that is
//! read then written: document number series, invoices being settled,
//! the case row serializing advance-wallet math. Domain decisions (state
//! guards, allocation planning, split computation) are delegated to
//! `billing-core`; this crate only loads rows, asks, and writes.

pub mod audit;
pub mod cases;
pub mod claims;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod invoices;
pub mod payments;
pub mod pool;
pub mod rows;
pub mod series;
pub mod split;
pub mod store;

pub use config::{AdvancePolicy, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use pool::DatabasePool;
pub use store::LedgerStore;
