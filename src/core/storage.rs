//! Transaction scoping helpers shared by every mutating operation.
//!
//! Each logical operation runs inside exactly one serializable database
//! transaction. There are no application-level locks; conflicting writers are
//! resolved by the store, which may abort one side with a serialization
//! failure. [`with_retry`] re-runs an operation a bounded number of times when
//! that happens.

use crate::errors::{Error, Result};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, DbErr,
    IsolationLevel, TransactionTrait,
};
use std::future::Future;
use tracing::warn;

/// Attempts used for benign contention on hot paths such as bulk item creation.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Opens a transaction with serializable isolation.
///
/// `SQLite` transactions are serializable already and reject an explicit
/// isolation level, so a plain `BEGIN` is issued there.
pub async fn begin_serializable(db: &DatabaseConnection) -> Result<DatabaseTransaction> {
    let txn = if db.get_database_backend() == DatabaseBackend::Sqlite {
        db.begin().await?
    } else {
        db.begin_with_config(Some(IsolationLevel::Serializable), None)
            .await?
    };
    Ok(txn)
}

/// Whether an error is the store aborting a transaction because of a
/// concurrent conflicting one.
#[must_use]
pub fn is_serialization_failure(err: &Error) -> bool {
    let Error::Database(db_err) = err else {
        return false;
    };
    let message = match db_err {
        DbErr::Exec(e) | DbErr::Query(e) | DbErr::Conn(e) => e.to_string(),
        DbErr::Custom(message) => message.clone(),
        other => other.to_string(),
    }
    .to_lowercase();

    message.contains("40001")
        || message.contains("could not serialize")
        || message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
}

/// Runs `operation`, re-running it while it fails with a serialization
/// failure, up to `attempts` times in total.
///
/// Every other error is returned immediately. The operation must open its own
/// transaction so that each attempt starts from a clean slate.
pub async fn with_retry<T, F, Fut>(attempts: u32, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(err) if attempt < attempts && is_serialization_failure(&err) => {
                warn!(attempt, error = %err, "Serialization conflict, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}
