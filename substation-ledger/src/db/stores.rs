//! The three cumulative stores (per date, per month, per year).
//!
//! Every record holds the running totals for one (substation, balance group)
//! as of its key. All three stores expose the same capability set through
//! [`CumulativeStore`]; only key derivation and record creation differ, the
//! lookups and forward propagation are shared.

use std::fmt;

use async_trait::async_trait;
use sqlx::SqliteConnection;
use time::Date;

use crate::{
    domain::{BalanceGroup, MeterCounts},
    error::LedgerError,
};

/// The (substation, balance group) series a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    pub substation_id: i64,
    pub balance_group: BalanceGroup,
}

impl Scope {
    pub fn new(substation_id: i64, balance_group: BalanceGroup) -> Self {
        Self {
            substation_id,
            balance_group,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredCounts {
    pub id: i64,
    pub total_installed: i64,
    pub registered_count: i64,
}

impl StoredCounts {
    pub fn counts(&self) -> MeterCounts {
        MeterCounts::new(self.total_installed, self.registered_count)
    }
}

/// Scalar a store key is compared by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyValue {
    Date(Date),
    Ordinal(i64),
}

/// Physical location of a store: its table and the SQL expression whose
/// ordering matches the ordering of its keys.
#[derive(Debug, Clone, Copy)]
pub struct Table {
    pub name: &'static str,
    pub key_expr: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u8,
}

impl MonthKey {
    pub fn ordinal(self) -> i64 {
        i64::from(self.year) * 100 + i64::from(self.month)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[async_trait]
pub trait CumulativeStore: Send + Sync {
    type Key: Copy + fmt::Debug + fmt::Display + Send + Sync;

    fn name(&self) -> &'static str;

    fn table(&self) -> Table;

    fn derive_key(&self, date: Date) -> Self::Key;

    fn key_value(&self, key: Self::Key) -> KeyValue;

    /// Insert a record holding `counts` at `key`, returning its id.
    async fn create_from(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
        key: Self::Key,
        counts: MeterCounts,
    ) -> Result<i64, LedgerError>;

    async fn find_by_key(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
        key: Self::Key,
    ) -> Result<Option<StoredCounts>, LedgerError> {
        select_nearest(conn, self.table(), scope, "=", self.key_value(key)).await
    }

    /// Most recent record strictly before `key`.
    async fn latest_before(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
        key: Self::Key,
    ) -> Result<Option<StoredCounts>, LedgerError> {
        select_nearest(conn, self.table(), scope, "<", self.key_value(key)).await
    }

    async fn latest_at_or_before(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
        key: Self::Key,
    ) -> Result<Option<StoredCounts>, LedgerError> {
        select_nearest(conn, self.table(), scope, "<=", self.key_value(key)).await
    }

    /// Cumulative totals inherited by a new record at `key`; zero when the
    /// series has no earlier record.
    async fn baseline_before(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
        key: Self::Key,
    ) -> Result<MeterCounts, LedgerError> {
        Ok(self
            .latest_before(conn, scope, key)
            .await?
            .map(|r| r.counts())
            .unwrap_or_default())
    }

    /// Add `delta` to the record with the given id. Returns the rows updated,
    /// which is zero when the result would break registered <= total or
    /// overflow a count.
    async fn add_to(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        delta: MeterCounts,
    ) -> Result<u64, LedgerError> {
        let sql = format!(
            "UPDATE {} \
             SET total_installed = total_installed + ?, registered_count = registered_count + ? \
             WHERE id = ? AND registered_count + ? <= total_installed + ? \
               AND total_installed <= ? AND registered_count <= ?",
            self.table().name
        );
        let (max_total, max_registered) = headroom(delta);

        let res = sqlx::query(&sql)
            .bind(delta.total_installed)
            .bind(delta.registered)
            .bind(id)
            .bind(delta.registered)
            .bind(delta.total_installed)
            .bind(max_total)
            .bind(max_registered)
            .execute(conn)
            .await?;

        Ok(res.rows_affected())
    }

    async fn count_after(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
        key: Self::Key,
    ) -> Result<u64, LedgerError> {
        let table = self.table();
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE substation_id = ? AND balance_group = ? AND {} > ?",
            table.name, table.key_expr
        );

        let query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(scope.substation_id)
            .bind(scope.balance_group.as_str());
        let query = match self.key_value(key) {
            KeyValue::Date(d) => query.bind(d),
            KeyValue::Ordinal(n) => query.bind(n),
        };

        let count = query.fetch_one(conn).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Add `delta` to every record of the series later than `key`. Records
    /// that would end up with more registered than installed meters, or
    /// whose counts would overflow, are left untouched and therefore missing
    /// from the returned row count.
    async fn increment_future_after(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
        key: Self::Key,
        delta: MeterCounts,
    ) -> Result<u64, LedgerError> {
        let table = self.table();
        let sql = format!(
            "UPDATE {} \
             SET total_installed = total_installed + ?, registered_count = registered_count + ? \
             WHERE substation_id = ? AND balance_group = ? AND {} > ? \
               AND registered_count + ? <= total_installed + ? \
               AND total_installed <= ? AND registered_count <= ?",
            table.name, table.key_expr
        );
        let (max_total, max_registered) = headroom(delta);

        let query = sqlx::query(&sql)
            .bind(delta.total_installed)
            .bind(delta.registered)
            .bind(scope.substation_id)
            .bind(scope.balance_group.as_str());
        let query = match self.key_value(key) {
            KeyValue::Date(d) => query.bind(d),
            KeyValue::Ordinal(n) => query.bind(n),
        };

        let res = query
            .bind(delta.registered)
            .bind(delta.total_installed)
            .bind(max_total)
            .bind(max_registered)
            .execute(conn)
            .await?;

        Ok(res.rows_affected())
    }
}

/// Largest stored (total, registered) that can still take `delta`.
fn headroom(delta: MeterCounts) -> (i64, i64) {
    (
        i64::MAX.saturating_sub(delta.total_installed.max(0)),
        i64::MAX.saturating_sub(delta.registered.max(0)),
    )
}

async fn select_nearest(
    conn: &mut SqliteConnection,
    table: Table,
    scope: Scope,
    op: &'static str,
    key: KeyValue,
) -> Result<Option<StoredCounts>, LedgerError> {
    let sql = format!(
        "SELECT id, total_installed, registered_count FROM {name} \
         WHERE substation_id = ? AND balance_group = ? AND {key} {op} ? \
         ORDER BY {key} DESC LIMIT 1",
        name = table.name,
        key = table.key_expr,
        op = op,
    );

    let query = sqlx::query_as::<_, StoredCounts>(&sql)
        .bind(scope.substation_id)
        .bind(scope.balance_group.as_str());
    let query = match key {
        KeyValue::Date(d) => query.bind(d),
        KeyValue::Ordinal(n) => query.bind(n),
    };

    Ok(query.fetch_optional(conn).await?)
}

/// Cumulative counts per exact date.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointStore;

#[async_trait]
impl CumulativeStore for PointStore {
    type Key = Date;

    fn name(&self) -> &'static str {
        "point"
    }

    fn table(&self) -> Table {
        Table {
            name: "meter_points",
            key_expr: "record_date",
        }
    }

    fn derive_key(&self, date: Date) -> Date {
        date
    }

    fn key_value(&self, key: Date) -> KeyValue {
        KeyValue::Date(key)
    }

    async fn create_from(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
        key: Date,
        counts: MeterCounts,
    ) -> Result<i64, LedgerError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO meter_points
                (substation_id, balance_group, record_date, total_installed, registered_count)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(scope.substation_id)
        .bind(scope.balance_group.as_str())
        .bind(key)
        .bind(counts.total_installed)
        .bind(counts.registered)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }
}

/// Cumulative counts per calendar month.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthStore;

#[async_trait]
impl CumulativeStore for MonthStore {
    type Key = MonthKey;

    fn name(&self) -> &'static str {
        "month"
    }

    fn table(&self) -> Table {
        Table {
            name: "meter_months",
            key_expr: "(year * 100 + month)",
        }
    }

    fn derive_key(&self, date: Date) -> MonthKey {
        MonthKey {
            year: date.year(),
            month: u8::from(date.month()),
        }
    }

    fn key_value(&self, key: MonthKey) -> KeyValue {
        KeyValue::Ordinal(key.ordinal())
    }

    async fn create_from(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
        key: MonthKey,
        counts: MeterCounts,
    ) -> Result<i64, LedgerError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO meter_months
                (substation_id, balance_group, year, month, total_installed, registered_count)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(scope.substation_id)
        .bind(scope.balance_group.as_str())
        .bind(i64::from(key.year))
        .bind(i64::from(key.month))
        .bind(counts.total_installed)
        .bind(counts.registered)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }
}

/// Cumulative counts per calendar year.
#[derive(Debug, Clone, Copy, Default)]
pub struct YearStore;

#[async_trait]
impl CumulativeStore for YearStore {
    type Key = i32;

    fn name(&self) -> &'static str {
        "year"
    }

    fn table(&self) -> Table {
        Table {
            name: "meter_years",
            key_expr: "year",
        }
    }

    fn derive_key(&self, date: Date) -> i32 {
        date.year()
    }

    fn key_value(&self, key: i32) -> KeyValue {
        KeyValue::Ordinal(i64::from(key))
    }

    async fn create_from(
        &self,
        conn: &mut SqliteConnection,
        scope: Scope,
        key: i32,
        counts: MeterCounts,
    ) -> Result<i64, LedgerError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO meter_years
                (substation_id, balance_group, year, total_installed, registered_count)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(scope.substation_id)
        .bind(scope.balance_group.as_str())
        .bind(i64::from(key))
        .bind(counts.total_installed)
        .bind(counts.registered)
        .fetch_one(conn)
        .await?;

        Ok(id)
    }
}
