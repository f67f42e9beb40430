//! Read side: point-in-time lookups, history listings and the substation
//! summary. Nothing here writes.

use sqlx::SqlitePool;
use time::Date;

use crate::{
    db::{
        stores::{CumulativeStore, MonthKey, MonthStore, PointStore, Scope, YearStore},
        substations, technical,
    },
    domain::{
        BalanceGroup, GroupSnapshot, MeterCounts, MonthlyAggregate, PointRecord, SubstationSummary,
        SummaryDates, YearlyAggregate,
    },
    error::LedgerError,
};

/// Cumulative counts of the most recent record at or before `key`; zero if
/// the series has none.
pub async fn as_of<S>(pool: &SqlitePool, store: &S, scope: Scope, key: S::Key) -> Result<MeterCounts, LedgerError>
where
    S: CumulativeStore,
{
    let mut conn = pool.acquire().await?;
    let record = store.latest_at_or_before(&mut *conn, scope, key).await?;
    Ok(record.map(|r| r.counts()).unwrap_or_default())
}

pub async fn point_as_of(pool: &SqlitePool, scope: Scope, date: Date) -> Result<MeterCounts, LedgerError> {
    as_of(pool, &PointStore, scope, date).await
}

pub async fn month_as_of(pool: &SqlitePool, scope: Scope, key: MonthKey) -> Result<MeterCounts, LedgerError> {
    as_of(pool, &MonthStore, scope, key).await
}

pub async fn year_as_of(pool: &SqlitePool, scope: Scope, year: i32) -> Result<MeterCounts, LedgerError> {
    as_of(pool, &YearStore, scope, year).await
}

#[derive(sqlx::FromRow)]
struct PointRow {
    record_date: Date,
    total_installed: i64,
    registered_count: i64,
}

#[derive(sqlx::FromRow)]
struct MonthRow {
    year: i64,
    month: i64,
    total_installed: i64,
    registered_count: i64,
}

#[derive(sqlx::FromRow)]
struct YearRow {
    year: i64,
    total_installed: i64,
    registered_count: i64,
}

/// Point records of a series within `[from, to]`, oldest first.
pub async fn point_history(
    pool: &SqlitePool,
    scope: Scope,
    from: Date,
    to: Date,
) -> Result<Vec<PointRecord>, LedgerError> {
    let rows = sqlx::query_as::<_, PointRow>(
        r#"
        SELECT record_date, total_installed, registered_count
        FROM meter_points
        WHERE substation_id = ? AND balance_group = ?
          AND record_date >= ? AND record_date <= ?
        ORDER BY record_date
        "#,
    )
    .bind(scope.substation_id)
    .bind(scope.balance_group.as_str())
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| PointRecord {
            substation_id: scope.substation_id,
            balance_group: scope.balance_group,
            date: r.record_date,
            counts: MeterCounts::new(r.total_installed, r.registered_count),
        })
        .collect())
}

/// Monthly aggregates stored for one year, in month order. Months without
/// events have no record.
pub async fn monthly_history(pool: &SqlitePool, scope: Scope, year: i32) -> Result<Vec<MonthlyAggregate>, LedgerError> {
    let rows = sqlx::query_as::<_, MonthRow>(
        r#"
        SELECT year, month, total_installed, registered_count
        FROM meter_months
        WHERE substation_id = ? AND balance_group = ? AND year = ?
        ORDER BY month
        "#,
    )
    .bind(scope.substation_id)
    .bind(scope.balance_group.as_str())
    .bind(i64::from(year))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| MonthlyAggregate {
            substation_id: scope.substation_id,
            balance_group: scope.balance_group,
            year: r.year as i32,
            month: r.month as u8,
            counts: MeterCounts::new(r.total_installed, r.registered_count),
        })
        .collect())
}

pub async fn yearly_history(pool: &SqlitePool, scope: Scope) -> Result<Vec<YearlyAggregate>, LedgerError> {
    let rows = sqlx::query_as::<_, YearRow>(
        r#"
        SELECT year, total_installed, registered_count
        FROM meter_years
        WHERE substation_id = ? AND balance_group = ?
        ORDER BY year
        "#,
    )
    .bind(scope.substation_id)
    .bind(scope.balance_group.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| YearlyAggregate {
            substation_id: scope.substation_id,
            balance_group: scope.balance_group,
            year: r.year as i32,
            counts: MeterCounts::new(r.total_installed, r.registered_count),
        })
        .collect())
}

/// Dashboard snapshot of a substation. The five group lookups and the
/// technical stats read run concurrently; each may observe a slightly
/// different committed state if writers are active.
pub async fn substation_summary(
    pool: &SqlitePool,
    substation_id: i64,
    dates: SummaryDates,
) -> Result<SubstationSummary, LedgerError> {
    let substation = substations::get(pool, substation_id).await?;

    let snapshot = move |group: BalanceGroup| async move {
        point_as_of(pool, Scope::new(substation_id, group), dates.for_group(group))
            .await
            .map(GroupSnapshot::from)
    };

    let (residential, legal_entity_a, legal_entity_b, general_metering_a, general_metering_b, technical) = tokio::try_join!(
        snapshot(BalanceGroup::Residential),
        snapshot(BalanceGroup::LegalEntityA),
        snapshot(BalanceGroup::LegalEntityB),
        snapshot(BalanceGroup::GeneralMeteringA),
        snapshot(BalanceGroup::GeneralMeteringB),
        technical::get(pool, substation_id),
    )?;

    Ok(SubstationSummary {
        substation,
        dates,
        residential,
        legal_entity_a,
        legal_entity_b,
        general_metering_a,
        general_metering_b,
        technical,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, domain::InstallationEvent, engine};
    use time::macros::date;

    async fn install(pool: &SqlitePool, event: InstallationEvent) {
        let mut tx = pool.begin().await.unwrap();
        engine::record_installation(&mut tx, event).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn summary_reads_each_family_at_its_own_date() {
        let pool = db::in_memory().await.unwrap();
        let sub = substations::create(&pool, "East-3").await.unwrap();

        for (group, date, total, registered) in [
            (BalanceGroup::Residential, date!(2023 - 06 - 01), 15, 12),
            (BalanceGroup::LegalEntityA, date!(2023 - 03 - 01), 4, 4),
            (BalanceGroup::LegalEntityB, date!(2023 - 09 - 01), 6, 1),
            (BalanceGroup::GeneralMeteringB, date!(2023 - 01 - 10), 2, 0),
        ] {
            install(
                &pool,
                InstallationEvent {
                    substation_id: sub.id,
                    balance_group: group,
                    date,
                    total_installed: total,
                    registered_count: registered,
                },
            )
            .await;
        }

        let dates = SummaryDates {
            residential: date!(2023 - 06 - 30),
            legal: date!(2023 - 06 - 30),
            general_metering: date!(2023 - 01 - 01),
        };
        let summary = substation_summary(&pool, sub.id, dates).await.unwrap();

        assert_eq!(summary.substation, sub);
        assert_eq!(
            summary.residential,
            GroupSnapshot {
                registered: 12,
                unregistered: 3,
                total_installed: 15
            }
        );
        assert_eq!(summary.legal_entity_a.registered, 4);
        assert_eq!(summary.legal_entity_b, GroupSnapshot::default());
        assert_eq!(summary.general_metering_a, GroupSnapshot::default());
        assert_eq!(summary.general_metering_b, GroupSnapshot::default());
        assert_eq!(summary.technical.quantity, 0);
    }

    #[tokio::test]
    async fn summary_of_unknown_substation_is_not_found() {
        let pool = db::in_memory().await.unwrap();

        let res = substation_summary(&pool, 7, SummaryDates::all_at(date!(2023 - 06 - 01))).await;
        assert!(matches!(res, Err(LedgerError::NotFound(7))));
    }

    #[tokio::test]
    async fn histories_list_stored_records_in_key_order() {
        let pool = db::in_memory().await.unwrap();
        let sub = substations::create(&pool, "East-3").await.unwrap();
        let scope = Scope::new(sub.id, BalanceGroup::Residential);

        for (date, total) in [
            (date!(2023 - 09 - 01), 2),
            (date!(2022 - 12 - 01), 5),
            (date!(2023 - 02 - 01), 3),
        ] {
            install(
                &pool,
                InstallationEvent {
                    substation_id: sub.id,
                    balance_group: BalanceGroup::Residential,
                    date,
                    total_installed: total,
                    registered_count: 0,
                },
            )
            .await;
        }

        let months = monthly_history(&pool, scope, 2023).await.unwrap();
        let got: Vec<(u8, i64)> = months.iter().map(|m| (m.month, m.counts.total_installed)).collect();
        assert_eq!(got, vec![(2, 8), (9, 10)]);

        let years = yearly_history(&pool, scope).await.unwrap();
        let got: Vec<(i32, i64)> = years.iter().map(|y| (y.year, y.counts.total_installed)).collect();
        assert_eq!(got, vec![(2022, 5), (2023, 10)]);

        let points = point_history(&pool, scope, date!(2023 - 01 - 01), date!(2023 - 12 - 31))
            .await
            .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, date!(2023 - 02 - 01));
    }
}
