//! Append-only trail of applied mutations.

use sqlx::{Executor, Sqlite, SqliteConnection};
use time::{macros::format_description, OffsetDateTime};

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AuditEntry {
    pub logged_at: String,
    pub substation_id: i64,
    pub line: String,
}

/// `YYYY-MM-DD HH:MM:SS`, UTC.
pub fn human_timestamp(at: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.format(&fmt)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub async fn append(conn: &mut SqliteConnection, substation_id: i64, line: &str) -> Result<(), LedgerError> {
    let logged_at = human_timestamp(OffsetDateTime::now_utc());

    sqlx::query("INSERT INTO audit_log (logged_at, substation_id, line) VALUES (?, ?, ?)")
        .bind(&logged_at)
        .bind(substation_id)
        .bind(line)
        .execute(conn)
        .await?;

    Ok(())
}

/// Append without failing the surrounding write.
pub async fn append_best_effort(conn: &mut SqliteConnection, substation_id: i64, line: &str) {
    if let Err(e) = append(conn, substation_id, line).await {
        tracing::warn!(error = %e, substation_id, "failed to append audit line");
    }
}

pub async fn entries_for<'e, E>(executor: E, substation_id: i64) -> Result<Vec<AuditEntry>, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, AuditEntry>(
        "SELECT logged_at, substation_id, line FROM audit_log WHERE substation_id = ? ORDER BY id",
    )
    .bind(substation_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn timestamp_is_human_readable() {
        assert_eq!(human_timestamp(datetime!(2023-06-01 08:05:09 UTC)), "2023-06-01 08:05:09");
    }
}
