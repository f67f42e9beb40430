use sqlx::{Executor, Sqlite};

use crate::{domain::Substation, error::LedgerError};

const NAME_CHARS: std::ops::RangeInclusive<usize> = 3..=15;

/// Trimmed name, or `InvalidName` when it falls outside 3..=15 characters.
pub fn normalize_name(name: &str) -> Result<String, LedgerError> {
    let trimmed = name.trim();
    if !NAME_CHARS.contains(&trimmed.chars().count()) {
        return Err(LedgerError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn map_unique_violation(err: sqlx::Error, name: &str) -> LedgerError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => LedgerError::DuplicateName(name.to_string()),
        other => LedgerError::Database(other),
    }
}

pub async fn create<'e, E>(executor: E, name: &str) -> Result<Substation, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let name = normalize_name(name)?;

    let id = sqlx::query_scalar::<_, i64>("INSERT INTO substations (name) VALUES (?) RETURNING id")
        .bind(name.as_str())
        .fetch_one(executor)
        .await
        .map_err(|e| map_unique_violation(e, &name))?;

    Ok(Substation { id, name })
}

pub async fn rename<'e, E>(executor: E, id: i64, name: &str) -> Result<Substation, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let name = normalize_name(name)?;

    let res = sqlx::query("UPDATE substations SET name = ? WHERE id = ?")
        .bind(name.as_str())
        .bind(id)
        .execute(executor)
        .await
        .map_err(|e| map_unique_violation(e, &name))?;

    if res.rows_affected() == 0 {
        return Err(LedgerError::NotFound(id));
    }
    Ok(Substation { id, name })
}

/// Delete a substation together with every record that references it.
pub async fn delete<'e, E>(executor: E, id: i64) -> Result<(), LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query("DELETE FROM substations WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;

    if res.rows_affected() == 0 {
        return Err(LedgerError::NotFound(id));
    }
    Ok(())
}

pub async fn get<'e, E>(executor: E, id: i64) -> Result<Substation, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Substation>("SELECT id, name FROM substations WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or(LedgerError::NotFound(id))
}

pub async fn list<'e, E>(executor: E) -> Result<Vec<Substation>, LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, Substation>("SELECT id, name FROM substations ORDER BY name")
        .fetch_all(executor)
        .await?;
    Ok(rows)
}

pub async fn ensure_exists<'e, E>(executor: E, id: i64) -> Result<(), LedgerError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found = sqlx::query_scalar::<_, i64>("SELECT id FROM substations WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    found.map(|_| ()).ok_or(LedgerError::NotFound(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn names_are_trimmed_and_length_checked() {
        assert_eq!(normalize_name("  Sub-7 ").unwrap(), "Sub-7");
        assert!(matches!(normalize_name("ab"), Err(LedgerError::InvalidName(_))));
        assert!(matches!(
            normalize_name("a-very-long-substation"),
            Err(LedgerError::InvalidName(_))
        ));
        assert!(normalize_name("Подстанция-12").is_ok());
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let pool = db::in_memory().await.unwrap();
        create(&pool, "Central").await.unwrap();

        let err = create(&pool, "Central").await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateName(ref n) if n == "Central"));
    }

    #[tokio::test]
    async fn rename_and_delete_unknown_substation_is_not_found() {
        let pool = db::in_memory().await.unwrap();
        let sub = create(&pool, "Central").await.unwrap();

        let renamed = rename(&pool, sub.id, "Central-2").await.unwrap();
        assert_eq!(get(&pool, sub.id).await.unwrap(), renamed);

        assert!(matches!(rename(&pool, 99, "Other").await, Err(LedgerError::NotFound(99))));
        assert!(matches!(delete(&pool, 99).await, Err(LedgerError::NotFound(99))));

        delete(&pool, sub.id).await.unwrap();
        assert!(list(&pool).await.unwrap().is_empty());
    }
}
