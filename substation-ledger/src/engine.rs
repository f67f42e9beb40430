//! Accumulation engine.
//!
//! Every store keeps running totals, so an event dated D changes the record at
//! D (creating it from the nearest earlier record if needed) and every record
//! later than D. All functions here take the connection of an open
//! transaction; the caller commits or rolls back as a whole.

use sqlx::SqliteConnection;
use time::Date;

use crate::{
    db::{
        audit,
        stores::{CumulativeStore, MonthStore, PointStore, Scope, YearStore},
        substations, technical,
    },
    domain::{InstallationEvent, MeterCounts, RegistrationEvent, TechnicalMeterReport, TechnicalMeterStats},
    error::LedgerError,
    validation,
};

/// Result of applying one delta to one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Accumulated {
    pub store: &'static str,
    /// Cumulative counts stored at the event's key after the update.
    pub counts: MeterCounts,
    pub created: bool,
    /// Number of later records the delta was carried into.
    pub propagated: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AccumulationOutcome {
    pub point: Accumulated,
    pub month: Accumulated,
    pub year: Accumulated,
}

/// Apply `delta` at `date` to a single cumulative store.
///
/// The record at the derived key is incremented if present, otherwise created
/// from the baseline before it. Every later record then receives the same
/// delta; if fewer rows are updated than exist, the call fails with
/// `PropagationIncomplete` and nothing it wrote may be committed.
pub async fn accumulate<S>(
    conn: &mut SqliteConnection,
    store: &S,
    scope: Scope,
    date: Date,
    delta: MeterCounts,
) -> Result<Accumulated, LedgerError>
where
    S: CumulativeStore,
{
    let key = store.derive_key(date);

    let (counts, created) = match store.find_by_key(&mut *conn, scope, key).await? {
        Some(existing) => {
            let updated = validation::add_counts(existing.counts(), delta)?;
            validation::ensure_registered_within_total(updated)?;

            let rows = store.add_to(&mut *conn, existing.id, delta).await?;
            if rows != 1 {
                return Err(LedgerError::PropagationIncomplete {
                    store: store.name(),
                    expected: 1,
                    updated: rows,
                });
            }
            (updated, false)
        }
        None => {
            let baseline = store.baseline_before(&mut *conn, scope, key).await?;
            let fresh = validation::add_counts(baseline, delta)?;
            validation::ensure_registered_within_total(fresh)?;

            store.create_from(&mut *conn, scope, key, fresh).await?;
            (fresh, true)
        }
    };

    let expected = store.count_after(&mut *conn, scope, key).await?;
    let propagated = if expected == 0 {
        0
    } else {
        store.increment_future_after(&mut *conn, scope, key, delta).await?
    };

    if propagated != expected {
        tracing::warn!(
            store = store.name(),
            substation_id = scope.substation_id,
            balance_group = %scope.balance_group,
            key = %key,
            expected,
            updated = propagated,
            "propagation to later records incomplete"
        );
        return Err(LedgerError::PropagationIncomplete {
            store: store.name(),
            expected,
            updated: propagated,
        });
    }

    tracing::debug!(
        store = store.name(),
        substation_id = scope.substation_id,
        balance_group = %scope.balance_group,
        key = %key,
        created,
        propagated,
        "cumulative record updated"
    );

    Ok(Accumulated {
        store: store.name(),
        counts,
        created,
        propagated,
    })
}

/// Apply `delta` to the point, month and year stores in turn.
pub async fn accumulate_all(
    conn: &mut SqliteConnection,
    scope: Scope,
    date: Date,
    delta: MeterCounts,
) -> Result<AccumulationOutcome, LedgerError> {
    let point = accumulate(&mut *conn, &PointStore, scope, date, delta).await?;
    let month = accumulate(&mut *conn, &MonthStore, scope, date, delta).await?;
    let year = accumulate(&mut *conn, &YearStore, scope, date, delta).await?;

    Ok(AccumulationOutcome { point, month, year })
}

/// Record newly installed meters. Validation runs before anything is read or
/// written.
pub async fn record_installation(
    conn: &mut SqliteConnection,
    event: InstallationEvent,
) -> Result<AccumulationOutcome, LedgerError> {
    validation::validate_installation(event.total_installed, event.registered_count)?;
    substations::ensure_exists(&mut *conn, event.substation_id).await?;

    let scope = Scope::new(event.substation_id, event.balance_group);
    let outcome = accumulate_all(&mut *conn, scope, event.date, event.delta()).await?;

    let line = format!(
        "installation group={} date={} total_installed={} registered={}",
        event.balance_group, event.date, event.total_installed, event.registered_count
    );
    audit::append_best_effort(&mut *conn, event.substation_id, &line).await;

    tracing::info!(
        substation_id = event.substation_id,
        balance_group = %event.balance_group,
        date = %event.date,
        total_installed = event.total_installed,
        registered = event.registered_count,
        "installation recorded"
    );

    Ok(outcome)
}

/// Record registration of already installed meters. A zero count is a no-op
/// and returns `None` without touching the stores.
pub async fn record_registration(
    conn: &mut SqliteConnection,
    event: RegistrationEvent,
) -> Result<Option<AccumulationOutcome>, LedgerError> {
    validation::validate_registration(event.registered_count)?;
    if event.registered_count == 0 {
        return Ok(None);
    }
    substations::ensure_exists(&mut *conn, event.substation_id).await?;

    let scope = Scope::new(event.substation_id, event.balance_group);
    let outcome = accumulate_all(&mut *conn, scope, event.date, event.delta()).await?;

    let line = format!(
        "registration group={} date={} registered={}",
        event.balance_group, event.date, event.registered_count
    );
    audit::append_best_effort(&mut *conn, event.substation_id, &line).await;

    tracing::info!(
        substation_id = event.substation_id,
        balance_group = %event.balance_group,
        date = %event.date,
        registered = event.registered_count,
        "registration recorded"
    );

    Ok(Some(outcome))
}

pub async fn record_technical_meters(
    conn: &mut SqliteConnection,
    report: TechnicalMeterReport,
) -> Result<TechnicalMeterStats, LedgerError> {
    validation::validate_technical_meters(report.quantity, report.under_voltage)?;
    substations::ensure_exists(&mut *conn, report.substation_id).await?;

    let stats = technical::accumulate(&mut *conn, &report).await?;

    let line = format!(
        "technical meters quantity={} under_voltage={}",
        report.quantity, report.under_voltage
    );
    audit::append_best_effort(&mut *conn, report.substation_id, &line).await;

    Ok(stats)
}
