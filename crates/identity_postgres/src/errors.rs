//! Mapping of sqlx failures onto the core error taxonomy.

use anyhow::anyhow;
use identity_core::IdentityError;

/// Transient failures (the database was unreachable, shut down, or aborted
/// the transaction for concurrency reasons) become `StorageUnavailable` so
/// the caller can retry the whole unit of work. Everything else is internal.
pub fn classify(err: sqlx::Error) -> IdentityError {
    let transient = match &err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    };

    if transient {
        IdentityError::StorageUnavailable(err.to_string())
    } else {
        IdentityError::Internal(anyhow!(err))
    }
}

/// Connection exceptions (class 08), operator intervention (57P01..57P03),
/// too many connections, serialization failure and deadlock.
pub fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03" | "53300" | "40001" | "40P01")
}
