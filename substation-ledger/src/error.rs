use crate::validation::ValidationError;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A batch update of later cumulative records touched fewer rows than
    /// were found. The enclosing transaction must be rolled back.
    #[error("{store} propagation updated {updated} of {expected} later records")]
    PropagationIncomplete {
        store: &'static str,
        expected: u64,
        updated: u64,
    },
    #[error("substation {0} not found")]
    NotFound(i64),
    #[error("invalid substation name {0:?}: expected 3 to 15 characters")]
    InvalidName(String),
    #[error("substation name {0:?} is already in use")]
    DuplicateName(String),
    #[error("unknown balance group {0:?}")]
    UnknownBalanceGroup(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT
const RETRYABLE_SQLITE_CODES: [&str; 3] = ["5", "6", "517"];

impl LedgerError {
    /// Whether the failed write may succeed if the transaction is replayed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Database(sqlx::Error::PoolTimedOut) => true,
            LedgerError::Database(sqlx::Error::Database(db)) => db
                .code()
                .map(|code| RETRYABLE_SQLITE_CODES.iter().any(|c| code == *c))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Domain rejections are caused by the submitted data, not by the store.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation(_)
                | LedgerError::NotFound(_)
                | LedgerError::InvalidName(_)
                | LedgerError::DuplicateName(_)
                | LedgerError::UnknownBalanceGroup(_)
        )
    }
}
