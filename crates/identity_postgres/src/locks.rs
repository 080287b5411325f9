//! Transaction-scoped advisory locks on identity values and clusters.
//!
//! Each `LockKey` (`email:<v>` / `phone:<v>` / `cluster:<id>`) hashes to a
//! stable 64-bit key. Identity value locks are taken first, in one batch,
//! in ascending order. Cluster locks come later and may arrive over several
//! batches, so [`ClusterLocks`] keeps them under a savepoint: a unit of work
//! only ever blocks on a key above every cluster key it holds, and otherwise
//! drops its cluster locks and re-takes the whole set in order. Locks
//! release automatically on commit or rollback.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use sqlx::PgConnection;
use tracing::debug;

use identity_core::LockKey;

/// Stable advisory lock id: first eight bytes of SHA-256 over the key text.
pub fn lock_key(key: &LockKey) -> i64 {
    let digest = Sha256::digest(key.to_string().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Block until the lock is held.
pub async fn advisory_xact_lock(conn: &mut PgConnection, key: i64) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(key)
        .execute(conn)
        .await
        .map(|_| ())
}

/// Non-blocking variant; `false` when another transaction holds the lock.
pub async fn try_advisory_xact_lock(conn: &mut PgConnection, key: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_xact_lock($1)")
        .bind(key)
        .fetch_one(conn)
        .await
}

/// Lock every key, sorted and de-duplicated. Returns the number of
/// distinct locks taken.
pub async fn acquire_locks(conn: &mut PgConnection, keys: &[LockKey]) -> Result<usize, sqlx::Error> {
    let ids: BTreeSet<i64> = keys.iter().map(lock_key).collect();

    for id in &ids {
        advisory_xact_lock(&mut *conn, *id).await?;
    }

    debug!(locks = ids.len(), "acquired identity advisory locks");
    Ok(ids.len())
}

const SAVEPOINT: &str = "SAVEPOINT cluster_locks";
const ROLLBACK_TO_SAVEPOINT: &str = "ROLLBACK TO SAVEPOINT cluster_locks";

/// Cluster locks held by one transaction.
///
/// Must be extended before the transaction writes: re-taking the set rolls
/// back to the savepoint, which would discard any write made after it.
#[derive(Debug, Default)]
pub struct ClusterLocks {
    held: BTreeSet<i64>,
}

impl ClusterLocks {
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Add `keys` to the held set. Returns `true` when the set had to be
    /// dropped and re-taken.
    pub async fn extend(
        &mut self,
        conn: &mut PgConnection,
        keys: &[LockKey],
    ) -> Result<bool, sqlx::Error> {
        let wanted: BTreeSet<i64> = keys
            .iter()
            .map(lock_key)
            .filter(|id| !self.held.contains(id))
            .collect();
        let Some(&lowest) = wanted.first() else {
            return Ok(false);
        };

        match self.held.last() {
            None => {
                sqlx::query(SAVEPOINT).execute(&mut *conn).await?;
            }
            Some(&highest) if lowest < highest => {
                return self.extend_out_of_order(conn, wanted).await;
            }
            Some(_) => {}
        }

        for id in wanted {
            advisory_xact_lock(&mut *conn, id).await?;
            self.held.insert(id);
        }
        Ok(false)
    }

    /// Some wanted key sorts below a held one: waiting on it could close a
    /// cycle, so only try it. If any is busy, release everything and wait
    /// for the full set in ascending order.
    async fn extend_out_of_order(
        &mut self,
        conn: &mut PgConnection,
        wanted: BTreeSet<i64>,
    ) -> Result<bool, sqlx::Error> {
        for &id in &wanted {
            if try_advisory_xact_lock(&mut *conn, id).await? {
                self.held.insert(id);
                continue;
            }

            let all: BTreeSet<i64> = self.held.union(&wanted).copied().collect();
            debug!(locks = all.len(), "cluster lock busy out of order, re-taking in order");

            sqlx::query(ROLLBACK_TO_SAVEPOINT).execute(&mut *conn).await?;
            self.held.clear();
            for id in all {
                advisory_xact_lock(&mut *conn, id).await?;
                self.held.insert(id);
            }
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_core::LockKind;

    #[test]
    fn lock_key_is_stable() {
        let a = LockKey::new(LockKind::Email, "doc@hv.io");
        assert_eq!(lock_key(&a), lock_key(&a.clone()));
    }

    #[test]
    fn kind_separates_equal_values() {
        let email = LockKey::new(LockKind::Email, "123456");
        let phone = LockKey::new(LockKind::PhoneNumber, "123456");
        assert_ne!(lock_key(&email), lock_key(&phone));
    }
}
