use billing_core::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Unique-constraint violations surface as concurrency conflicts so
    /// callers can retry the whole operation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }

    /// Stable kind tag for structured API error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.kind(),
            Self::Database(_) | Self::Serialization(_) => "internal_error",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
