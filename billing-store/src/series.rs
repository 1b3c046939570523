//! Document number series.
//!
//! Numbers must never repeat, even under concurrent callers; gaps are
//! tolerable. The series row is read under `FOR UPDATE` so two requests
//! can never read the same counter value.

use crate::error::StoreResult;
use crate::store::{LedgerStore, PgTx};
use billing_core::{DocType, ResetPeriod};
use chrono::{DateTime, Datelike, Utc};
use sqlx::FromRow;
use tracing::debug;

/// Period key for counter rollover: "" / "YYYY" / "YYYY-MM".
pub fn period_key(reset: ResetPeriod, at: DateTime<Utc>) -> String {
    match reset {
        ResetPeriod::None => String::new(),
        ResetPeriod::Year => format!("{:04}", at.year()),
        ResetPeriod::Month => format!("{:04}-{:02}", at.year(), at.month()),
    }
}

/// Format a counter value into a document number.
pub fn format_number(prefix: &str, number: i64, padding: u32) -> String {
    format!("{}{:0width$}", prefix, number, width = padding as usize)
}

#[derive(Debug, FromRow)]
struct SeriesRow {
    last_period_key: String,
    next_number: i64,
    padding: i32,
}

impl LedgerStore {
    /// Draw the next number from a series inside the caller's transaction.
    pub(crate) async fn next_document_number(
        &self,
        tx: &mut PgTx<'_>,
        doc_type: DocType,
        prefix: &str,
        reset: ResetPeriod,
        padding: u32,
    ) -> StoreResult<String> {
        // Seed the series on first use; losing the race is fine, the
        // follow-up locked read sees the winner's row.
        sqlx::query(
            "INSERT INTO billing_number_series (doc_type, prefix, reset_period, padding) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (doc_type, prefix, reset_period) DO NOTHING",
        )
        .bind(doc_type.as_str())
        .bind(prefix)
        .bind(reset.as_str())
        .bind(padding as i32)
        .execute(&mut **tx)
        .await?;

        let row = sqlx::query_as::<_, SeriesRow>(
            "SELECT last_period_key, next_number, padding FROM billing_number_series \
             WHERE doc_type = $1 AND prefix = $2 AND reset_period = $3 FOR UPDATE",
        )
        .bind(doc_type.as_str())
        .bind(prefix)
        .bind(reset.as_str())
        .fetch_one(&mut **tx)
        .await?;

        let key = period_key(reset, Utc::now());
        let number = if row.last_period_key != key {
            1
        } else {
            row.next_number
        };

        sqlx::query(
            "UPDATE billing_number_series SET next_number = $4, last_period_key = $5 \
             WHERE doc_type = $1 AND prefix = $2 AND reset_period = $3",
        )
        .bind(doc_type.as_str())
        .bind(prefix)
        .bind(reset.as_str())
        .bind(number + 1)
        .bind(&key)
        .execute(&mut **tx)
        .await?;

        let formatted = format_number(prefix, number, row.padding.max(0) as u32);
        debug!(doc_type = %doc_type, number = %formatted, "issued document number");
        Ok(formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_keys_roll_with_the_calendar() {
        let at = Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap();
        assert_eq!(period_key(ResetPeriod::None, at), "");
        assert_eq!(period_key(ResetPeriod::Year, at), "2026");
        assert_eq!(period_key(ResetPeriod::Month, at), "2026-08");
    }

    #[test]
    fn numbers_are_zero_padded() {
        assert_eq!(format_number("INV-", 123, 6), "INV-000123");
        assert_eq!(format_number("RCP-", 1, 4), "RCP-0001");
        // Overflowing the pad widens rather than truncates.
        assert_eq!(format_number("C", 1234567, 6), "C1234567");
    }
}
