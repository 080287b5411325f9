//! Postgres implementation of the contact store ports.
//!
//! `PgContactStore` is a newtype wrapping PgPool; each `begin` opens a
//! READ COMMITTED transaction. Reads are plain; units of work are kept
//! apart by the advisory locks from [`crate::locks`], taken on identity
//! values and then on cluster primaries.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::debug;

use identity_core::ports::{ContactStore, ContactTx, Result};
use identity_core::{
    ContactFilter, ContactPatch, ContactPredicate, ContactRecord, IdentityError, LockKey,
    NewContact,
};

use crate::errors::classify;
use crate::locks::{self, ClusterLocks};
use crate::sqlx_types::{PgContactRow, CONTACT_COLUMNS};

// ── PgContactStore ────────────────────────────────────────────

pub struct PgContactStore {
    pool: PgPool,
}

impl PgContactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactStore for PgContactStore {
    async fn begin(&self) -> Result<Box<dyn ContactTx>> {
        let tx = self.pool.begin().await.map_err(classify)?;
        Ok(Box::new(PgContactTx {
            tx,
            cluster_locks: ClusterLocks::default(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

// ── PgContactTx ───────────────────────────────────────────────

pub struct PgContactTx {
    tx: Transaction<'static, Postgres>,
    cluster_locks: ClusterLocks,
}

#[async_trait]
impl ContactTx for PgContactTx {
    async fn acquire_locks(&mut self, keys: &[LockKey]) -> Result<()> {
        locks::acquire_locks(&mut *self.tx, keys)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn acquire_cluster_locks(&mut self, keys: &[LockKey]) -> Result<()> {
        let retaken = self
            .cluster_locks
            .extend(&mut *self.tx, keys)
            .await
            .map_err(classify)?;
        debug!(
            held = self.cluster_locks.held(),
            retaken, "acquired cluster locks"
        );
        Ok(())
    }

    async fn find_many(&mut self, filter: &ContactFilter) -> Result<Vec<ContactRecord>> {
        if filter.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE deleted_at IS NULL AND "
        ));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at, id");

        let rows = qb
            .build_query_as::<PgContactRow>()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(classify)?;

        rows.into_iter().map(into_record).collect()
    }

    async fn create(&mut self, contact: NewContact) -> Result<ContactRecord> {
        let row = sqlx::query_as::<_, PgContactRow>(&format!(
            r#"
            INSERT INTO contacts (email, phone_number, linked_id, link_precedence)
            VALUES ($1, $2, $3, $4)
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(contact.email)
        .bind(contact.phone_number)
        .bind(contact.linked_id)
        .bind(contact.link_precedence.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;

        into_record(row)
    }

    async fn update_many(&mut self, filter: &ContactFilter, patch: ContactPatch) -> Result<u64> {
        if filter.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE contacts SET ");
        match patch {
            ContactPatch::Demote { primary_id } => {
                qb.push("link_precedence = 'secondary', linked_id = ");
                qb.push_bind(primary_id);
                qb.push(", updated_at = clock_timestamp() WHERE link_precedence = 'primary' AND ");
            }
            ContactPatch::Relink { primary_id } => {
                qb.push("linked_id = ");
                qb.push_bind(primary_id);
                qb.push(", updated_at = clock_timestamp() WHERE ");
            }
        }
        push_filter(&mut qb, filter);

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;

        debug!(?patch, rows = result.rows_affected(), "updated contacts");
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(classify)
    }
}

/// Append `( p1 OR p2 ... )` for the filter's predicates.
fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &ContactFilter) {
    qb.push("(");
    let mut any_of = qb.separated(" OR ");
    for predicate in &filter.any_of {
        match predicate {
            ContactPredicate::Email(email) => {
                any_of.push("email = ");
                any_of.push_bind_unseparated(email.clone());
            }
            ContactPredicate::PhoneNumber(phone) => {
                any_of.push("phone_number = ");
                any_of.push_bind_unseparated(phone.clone());
            }
            ContactPredicate::IdIn(ids) => {
                any_of.push("id = ANY(");
                any_of.push_bind_unseparated(ids.clone());
                any_of.push_unseparated(")");
            }
            ContactPredicate::LinkedIdIn(ids) => {
                any_of.push("linked_id = ANY(");
                any_of.push_bind_unseparated(ids.clone());
                any_of.push_unseparated(")");
            }
        }
    }
    qb.push(")");
}

fn into_record(row: PgContactRow) -> Result<ContactRecord> {
    ContactRecord::try_from(row).map_err(|e| IdentityError::Internal(anyhow::anyhow!(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql(filter: &ContactFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM contacts WHERE ");
        push_filter(&mut qb, filter);
        qb.sql().to_string()
    }

    #[test]
    fn identity_filter_renders_or() {
        let req = identity_core::IdentifyRequest::new(
            Some("doc@hv.io".into()),
            Some("123456".into()),
        );
        assert_eq!(
            sql(&ContactFilter::by_identity(&req)),
            "SELECT 1 FROM contacts WHERE (email = $1 OR phone_number = $2)"
        );
    }

    #[test]
    fn id_filters_render_any() {
        assert_eq!(
            sql(&ContactFilter::ids([1, 2])),
            "SELECT 1 FROM contacts WHERE (id = ANY($1))"
        );
        assert_eq!(
            sql(&ContactFilter::linked_to([3])),
            "SELECT 1 FROM contacts WHERE (linked_id = ANY($1))"
        );
    }
}
