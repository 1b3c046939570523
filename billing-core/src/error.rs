use thiserror::Error;

/// Error taxonomy for the billing ledger.
///
/// Every mutating operation surfaces exactly one of these kinds; the HTTP
/// boundary maps them onto status codes. `Invariant` is always a bug in the
/// engine, never an expected operator-facing condition.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid state: {0}")]
    StateConflict(String),

    #[error("business rule violated: {0}")]
    BusinessRule(String),

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("concurrent update conflict: {0}")]
    Concurrency(String),

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable kind tag used in structured API error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::StateConflict(_) => "state_conflict",
            Self::BusinessRule(_) => "business_rule_violation",
            Self::Forbidden(_) => "forbidden",
            Self::Concurrency(_) => "concurrency_conflict",
            Self::Invariant(_) => "internal_error",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
