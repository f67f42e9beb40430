use sqlx::{Executor, Sqlite, SqliteConnection};

use crate::{
    domain::{TechnicalMeterReport, TechnicalMeterStats},
    error::LedgerError,
    validation::ValidationError,
};

/// Add the reported quantities to the substation's stats row, creating it on
/// first report. Runs inside the caller's transaction.
pub async fn accumulate(
    conn: &mut SqliteConnection,
    report: &TechnicalMeterReport,
) -> Result<TechnicalMeterStats, LedgerError> {
    let current = get(&mut *conn, report.substation_id).await?;
    let quantity = current
        .quantity
        .checked_add(report.quantity)
        .ok_or(ValidationError::CountOverflow { field: "quantity" })?;
    let under_voltage = current
        .under_voltage
        .checked_add(report.under_voltage)
        .ok_or(ValidationError::CountOverflow { field: "under_voltage" })?;

    let stats = sqlx::query_as::<_, TechnicalMeterStats>(
        r#"
        INSERT INTO technical_meters (substation_id, quantity, under_voltage)
        VALUES (?, ?, ?)
        ON CONFLICT (substation_id) DO UPDATE SET
            quantity      = excluded.quantity,
            under_voltage = excluded.under_voltage
        RETURNING quantity, under_voltage
        "#,
    )
    .bind(report.substation_id)
    .bind(quantity)
    .bind(under_voltage)
    .fetch_one(conn)
    .await?;

    Ok(stats)
}

/// Stats of a substation; zero when nothing has been reported yet.
pub async fn get<'e, E>(executor: E, substation_id: i64) -> Result<TechnicalMeterStats, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let stats = sqlx::query_as::<_, TechnicalMeterStats>(
        "SELECT quantity, under_voltage FROM technical_meters WHERE substation_id = ?",
    )
    .bind(substation_id)
    .fetch_optional(executor)
    .await?;

    Ok(stats.unwrap_or_default())
}
