//! Ledger schema bootstrap.

use sqlx::SqlitePool;

use crate::error::LedgerError;

const BALANCE_GROUP_CHECK: &str =
    "balance_group IN ('residential', 'legal_entity_a', 'legal_entity_b', 'general_metering_a', 'general_metering_b')";

/// Create every ledger table and index (idempotent). Safe to call on every
/// startup.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), LedgerError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS substations (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT    NOT NULL UNIQUE CHECK (length(name) BETWEEN 3 AND 15)
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let point_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS meter_points (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            substation_id    INTEGER NOT NULL REFERENCES substations (id) ON DELETE CASCADE,
            balance_group    TEXT    NOT NULL CHECK ({BALANCE_GROUP_CHECK}),
            record_date      TEXT    NOT NULL,
            total_installed  INTEGER NOT NULL CHECK (total_installed >= 0),
            registered_count INTEGER NOT NULL CHECK (registered_count >= 0),
            CHECK (registered_count <= total_installed),
            UNIQUE (substation_id, balance_group, record_date)
        )
        "#
    );
    sqlx::query(&point_table).execute(&mut *tx).await?;

    let month_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS meter_months (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            substation_id    INTEGER NOT NULL REFERENCES substations (id) ON DELETE CASCADE,
            balance_group    TEXT    NOT NULL CHECK ({BALANCE_GROUP_CHECK}),
            year             INTEGER NOT NULL,
            month            INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
            total_installed  INTEGER NOT NULL CHECK (total_installed >= 0),
            registered_count INTEGER NOT NULL CHECK (registered_count >= 0),
            CHECK (registered_count <= total_installed),
            UNIQUE (substation_id, balance_group, year, month)
        )
        "#
    );
    sqlx::query(&month_table).execute(&mut *tx).await?;

    let year_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS meter_years (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            substation_id    INTEGER NOT NULL REFERENCES substations (id) ON DELETE CASCADE,
            balance_group    TEXT    NOT NULL CHECK ({BALANCE_GROUP_CHECK}),
            year             INTEGER NOT NULL,
            total_installed  INTEGER NOT NULL CHECK (total_installed >= 0),
            registered_count INTEGER NOT NULL CHECK (registered_count >= 0),
            CHECK (registered_count <= total_installed),
            UNIQUE (substation_id, balance_group, year)
        )
        "#
    );
    sqlx::query(&year_table).execute(&mut *tx).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS technical_meters (
            substation_id INTEGER PRIMARY KEY REFERENCES substations (id) ON DELETE CASCADE,
            quantity      INTEGER NOT NULL CHECK (quantity >= 0),
            under_voltage INTEGER NOT NULL CHECK (under_voltage >= 0)
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Append-only; survives substation deletion.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            logged_at     TEXT    NOT NULL,
            substation_id INTEGER NOT NULL,
            line          TEXT    NOT NULL
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_audit_log_substation
            ON audit_log (substation_id)
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let pool = db::in_memory().await.unwrap();
        create_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(
            tables,
            vec![
                "audit_log",
                "meter_months",
                "meter_points",
                "meter_years",
                "substations",
                "technical_meters"
            ]
        );
    }
}
