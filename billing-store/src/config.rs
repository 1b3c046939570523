use billing_core::{LedgerError, LedgerResult};

/// Advance-wallet policy, explicit configuration rather than a hidden
/// module toggle. Automatic application of advances against invoices was
/// removed deliberately: the wallet only moves through the explicit
/// apply operation.
#[derive(Debug, Clone, Copy)]
pub struct AdvancePolicy {
    pub auto_apply: bool,
}

impl Default for AdvancePolicy {
    fn default() -> Self {
        Self { auto_apply: false }
    }
}

impl AdvancePolicy {
    /// The engine has no auto-apply code path; reject configurations that
    /// ask for one instead of silently ignoring the flag.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.auto_apply {
            return Err(LedgerError::Validation(
                "automatic advance application is not supported; advances are applied explicitly"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Store-level configuration threaded in at construction.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// How long an approved edit request keeps the invoice unlocked.
    pub unlock_window_hours: i64,
    pub advance_policy: AdvancePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            unlock_window_hours: 24,
            advance_policy: AdvancePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_apply_is_rejected_up_front() {
        assert!(AdvancePolicy { auto_apply: true }.validate().is_err());
        assert!(AdvancePolicy::default().validate().is_ok());
    }
}
