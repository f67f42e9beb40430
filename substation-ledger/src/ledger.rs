use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    cache::SummaryCache,
    db::{
        audit,
        stores::{MonthKey, Scope},
        substations,
    },
    domain::{
        BalanceGroup, InstallationEvent, MeterCounts, MonthlyAggregate, PointRecord, RegistrationEvent, Substation,
        SubstationSummary, SummaryDates, TechnicalMeterReport, TechnicalMeterStats, YearlyAggregate,
    },
    engine::{self, AccumulationOutcome},
    error::LedgerError,
    query,
};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Entry point for callers: owns the pool and the summary cache and runs every
/// write in its own transaction.
pub struct Ledger {
    pool: SqlitePool,
    cache: SummaryCache,
    retry: RetryPolicy,
}

impl Ledger {
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self {
            pool,
            cache: SummaryCache::new(),
            retry,
        }
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    /// Run `op` inside a transaction, committing on success and rolling back
    /// on any error. Busy/locked failures are replayed with linear backoff.
    /// The substation's cached summaries are dropped after a commit.
    async fn write<T, F>(&self, what: &'static str, substation_id: Option<i64>, op: F) -> Result<T, LedgerError>
    where
        T: Send,
        F: for<'c> Fn(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, LedgerError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let mut tx = self.pool.begin().await?;
            let outcome = op(&mut *tx).await;
            let res = match outcome {
                Ok(value) => tx.commit().await.map(|_| value).map_err(LedgerError::from),
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(error = %rollback, operation = what, "rollback failed");
                    }
                    Err(e)
                }
            };

            match res {
                Ok(value) => {
                    if let Some(id) = substation_id {
                        self.cache.invalidate(id).await;
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, operation = what, "ledger write failed, retrying with backoff");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                }
                Err(e) => {
                    if e.is_rejection() {
                        tracing::debug!(error = %e, operation = what, "ledger write rejected");
                    } else {
                        tracing::error!(error = %e, operation = what, "ledger write failed");
                    }
                    return Err(e);
                }
            }
        }
    }

    pub async fn create_substation(&self, name: &str) -> Result<Substation, LedgerError> {
        let name = name.to_string();
        self.write("create_substation", None, move |conn| {
            let name = name.clone();
            Box::pin(async move {
                let substation = substations::create(&mut *conn, &name).await?;
                let line = format!("substation created name={}", substation.name);
                audit::append_best_effort(conn, substation.id, &line).await;
                Ok(substation)
            })
        })
        .await
    }

    pub async fn rename_substation(&self, id: i64, name: &str) -> Result<Substation, LedgerError> {
        let name = name.to_string();
        self.write("rename_substation", Some(id), move |conn| {
            let name = name.clone();
            Box::pin(async move {
                let substation = substations::rename(&mut *conn, id, &name).await?;
                let line = format!("substation renamed name={}", substation.name);
                audit::append_best_effort(conn, id, &line).await;
                Ok(substation)
            })
        })
        .await
    }

    pub async fn delete_substation(&self, id: i64) -> Result<(), LedgerError> {
        self.write("delete_substation", Some(id), move |conn| {
            Box::pin(async move {
                substations::delete(&mut *conn, id).await?;
                audit::append_best_effort(conn, id, "substation deleted").await;
                Ok(())
            })
        })
        .await
    }

    pub async fn get_substation(&self, id: i64) -> Result<Substation, LedgerError> {
        substations::get(&self.pool, id).await
    }

    pub async fn list_substations(&self) -> Result<Vec<Substation>, LedgerError> {
        substations::list(&self.pool).await
    }

    pub async fn record_installation(&self, event: InstallationEvent) -> Result<AccumulationOutcome, LedgerError> {
        self.write("record_installation", Some(event.substation_id), move |conn| {
            Box::pin(engine::record_installation(conn, event))
        })
        .await
    }

    pub async fn record_registration(
        &self,
        event: RegistrationEvent,
    ) -> Result<Option<AccumulationOutcome>, LedgerError> {
        self.write("record_registration", Some(event.substation_id), move |conn| {
            Box::pin(engine::record_registration(conn, event))
        })
        .await
    }

    pub async fn record_technical_meters(&self, report: TechnicalMeterReport) -> Result<TechnicalMeterStats, LedgerError> {
        self.write("record_technical_meters", Some(report.substation_id), move |conn| {
            Box::pin(engine::record_technical_meters(conn, report))
        })
        .await
    }

    /// Summary of a substation, served from the cache when possible.
    pub async fn summary(&self, substation_id: i64, dates: SummaryDates) -> Result<SubstationSummary, LedgerError> {
        if let Some(hit) = self.cache.get(substation_id, &dates).await {
            return Ok(hit);
        }

        let generation = self.cache.generation(substation_id).await;
        let summary = query::substation_summary(&self.pool, substation_id, dates).await?;
        self.cache.put(summary.clone(), generation).await;
        Ok(summary)
    }

    pub async fn point_as_of(
        &self,
        substation_id: i64,
        group: BalanceGroup,
        date: time::Date,
    ) -> Result<MeterCounts, LedgerError> {
        query::point_as_of(&self.pool, Scope::new(substation_id, group), date).await
    }

    pub async fn month_as_of(
        &self,
        substation_id: i64,
        group: BalanceGroup,
        key: MonthKey,
    ) -> Result<MeterCounts, LedgerError> {
        query::month_as_of(&self.pool, Scope::new(substation_id, group), key).await
    }

    pub async fn year_as_of(&self, substation_id: i64, group: BalanceGroup, year: i32) -> Result<MeterCounts, LedgerError> {
        query::year_as_of(&self.pool, Scope::new(substation_id, group), year).await
    }

    /// Point records of a series within `[from, to]`, oldest first.
    pub async fn point_history(
        &self,
        substation_id: i64,
        group: BalanceGroup,
        from: time::Date,
        to: time::Date,
    ) -> Result<Vec<PointRecord>, LedgerError> {
        substations::ensure_exists(&self.pool, substation_id).await?;
        query::point_history(&self.pool, Scope::new(substation_id, group), from, to).await
    }

    pub async fn monthly_history(
        &self,
        substation_id: i64,
        group: BalanceGroup,
        year: i32,
    ) -> Result<Vec<MonthlyAggregate>, LedgerError> {
        substations::ensure_exists(&self.pool, substation_id).await?;
        query::monthly_history(&self.pool, Scope::new(substation_id, group), year).await
    }

    pub async fn yearly_history(&self, substation_id: i64, group: BalanceGroup) -> Result<Vec<YearlyAggregate>, LedgerError> {
        substations::ensure_exists(&self.pool, substation_id).await?;
        query::yearly_history(&self.pool, Scope::new(substation_id, group)).await
    }

    pub async fn audit_trail(&self, substation_id: i64) -> Result<Vec<audit::AuditEntry>, LedgerError> {
        audit::entries_for(&self.pool, substation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, validation::ValidationError};
    use time::macros::date;

    async fn ledger() -> Ledger {
        Ledger::new(db::in_memory().await.unwrap(), RetryPolicy::default())
    }

    fn residential(substation_id: i64, date: time::Date, total: i64, registered: i64) -> InstallationEvent {
        InstallationEvent {
            substation_id,
            balance_group: BalanceGroup::Residential,
            date,
            total_installed: total,
            registered_count: registered,
        }
    }

    #[tokio::test]
    async fn writes_invalidate_cached_summaries() {
        let ledger = ledger().await;
        let sub = ledger.create_substation("West-2").await.unwrap();
        let dates = SummaryDates::all_at(date!(2023 - 12 - 31));

        let before = ledger.summary(sub.id, dates).await.unwrap();
        assert_eq!(before.residential.total_installed, 0);
        assert_eq!(ledger.cache().len().await, 1);

        ledger
            .record_installation(residential(sub.id, date!(2023 - 06 - 01), 15, 12))
            .await
            .unwrap();
        assert_eq!(ledger.cache().len().await, 0);

        let after = ledger.summary(sub.id, dates).await.unwrap();
        assert_eq!(after.residential.registered, 12);
        assert_eq!(after.residential.unregistered, 3);
    }

    #[tokio::test]
    async fn rejected_write_leaves_cache_and_stores_untouched() {
        let ledger = ledger().await;
        let sub = ledger.create_substation("West-2").await.unwrap();
        let dates = SummaryDates::all_at(date!(2023 - 12 - 31));
        ledger.summary(sub.id, dates).await.unwrap();

        let err = ledger
            .record_installation(residential(sub.id, date!(2023 - 06 - 01), 10, 20))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::RegisteredExceedsTotal { .. })
        ));
        assert_eq!(ledger.cache().len().await, 1);
        assert_eq!(ledger.audit_trail(sub.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rename_and_delete_go_through_transactions() {
        let ledger = ledger().await;
        let sub = ledger.create_substation("West-2").await.unwrap();
        ledger
            .record_installation(residential(sub.id, date!(2023 - 06 - 01), 15, 12))
            .await
            .unwrap();

        let renamed = ledger.rename_substation(sub.id, "West-20").await.unwrap();
        assert_eq!(renamed.name, "West-20");
        assert!(matches!(
            ledger.create_substation("West-20").await,
            Err(LedgerError::DuplicateName(_))
        ));

        ledger.delete_substation(sub.id).await.unwrap();
        assert!(matches!(ledger.get_substation(sub.id).await, Err(LedgerError::NotFound(_))));
        assert_eq!(
            ledger.year_as_of(sub.id, BalanceGroup::Residential, 2023).await.unwrap(),
            MeterCounts::ZERO
        );

        let trail: Vec<String> = ledger.audit_trail(sub.id).await.unwrap().into_iter().map(|e| e.line).collect();
        assert_eq!(trail.len(), 4);
        assert_eq!(trail[0], "substation created name=West-2");
        assert_eq!(trail[3], "substation deleted");
        assert!(matches!(
            ledger.yearly_history(sub.id, BalanceGroup::Residential).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger
                .point_history(sub.id, BalanceGroup::Residential, date!(2023 - 01 - 01), date!(2023 - 12 - 31))
                .await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn technical_meters_show_up_in_summary() {
        let ledger = ledger().await;
        let sub = ledger.create_substation("West-2").await.unwrap();

        ledger
            .record_technical_meters(TechnicalMeterReport {
                substation_id: sub.id,
                quantity: 9,
                under_voltage: 2,
            })
            .await
            .unwrap();

        let summary = ledger
            .summary(sub.id, SummaryDates::all_at(date!(2024 - 01 - 01)))
            .await
            .unwrap();
        assert_eq!(summary.technical.quantity, 9);
        assert_eq!(summary.technical.under_voltage, 2);
    }
}
