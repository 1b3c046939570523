//! HTTP boundary for the billing ledger.
//!
//! Thin by design: actor extraction, payload conversion, error→status
//! mapping and the route table. All ledger behavior lives in
//! `billing-store` and `billing-core`.

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;

pub use config::ServerConfig;
pub use routes::create_app;
