//! In-memory contact store.
//!
//! Each unit of work holds the table mutex for its whole lifetime and edits
//! a private copy, published only on `commit`. That makes every unit of work
//! serializable and all-or-nothing. Used for tests and for running the
//! service without a database.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::ports::{ContactStore, ContactTx, Result};
use crate::types::{ContactFilter, ContactId, ContactPatch, ContactRecord, LockKey, NewContact};

#[derive(Debug, Clone, Default)]
struct ContactTable {
    rows: Vec<ContactRecord>,
    last_id: ContactId,
    last_timestamp: Option<DateTime<Utc>>,
    writes: u64,
}

impl ContactTable {
    /// Strictly increasing creation clock so "oldest wins" never ties.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryContactStore {
    table: Arc<Mutex<ContactTable>>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table with fixture rows, bypassing every invariant.
    /// Ids keep increasing from the largest seeded id.
    pub async fn seed(&self, rows: Vec<ContactRecord>) {
        let mut table = self.table.lock().await;
        table.last_id = rows.iter().map(|r| r.id).max().unwrap_or(0);
        table.last_timestamp = rows.iter().map(|r| r.created_at).max();
        table.rows = rows;
    }

    /// Committed rows, in insertion order.
    pub async fn snapshot(&self) -> Vec<ContactRecord> {
        self.table.lock().await.rows.clone()
    }

    /// Number of committed row writes (inserts plus updated rows).
    pub async fn write_count(&self) -> u64 {
        self.table.lock().await.writes
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn begin(&self) -> Result<Box<dyn ContactTx>> {
        let guard = Arc::clone(&self.table).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryContactTx { guard, working }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MemoryContactTx {
    guard: OwnedMutexGuard<ContactTable>,
    working: ContactTable,
}

#[async_trait]
impl ContactTx for MemoryContactTx {
    async fn acquire_locks(&mut self, _keys: &[LockKey]) -> Result<()> {
        // The table mutex already serializes whole units of work.
        Ok(())
    }

    async fn acquire_cluster_locks(&mut self, _keys: &[LockKey]) -> Result<()> {
        Ok(())
    }

    async fn find_many(&mut self, filter: &ContactFilter) -> Result<Vec<ContactRecord>> {
        let mut found: Vec<ContactRecord> = self
            .working
            .rows
            .iter()
            .filter(|r| !r.is_excluded() && filter.matches(r))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.creation_key());
        Ok(found)
    }

    async fn create(&mut self, contact: NewContact) -> Result<ContactRecord> {
        let now = self.working.tick();
        self.working.last_id += 1;

        let record = ContactRecord {
            id: self.working.last_id,
            email: contact.email,
            phone_number: contact.phone_number,
            linked_id: contact.linked_id,
            link_precedence: contact.link_precedence,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.working.rows.push(record.clone());
        self.working.writes += 1;
        Ok(record)
    }

    async fn update_many(&mut self, filter: &ContactFilter, patch: ContactPatch) -> Result<u64> {
        let now = self.working.tick();
        let mut changed = 0;

        for row in self.working.rows.iter_mut().filter(|r| filter.matches(r)) {
            match patch {
                ContactPatch::Demote { primary_id } => {
                    // Same guard as the SQL store: only primaries can be demoted.
                    if !row.is_primary() {
                        continue;
                    }
                    row.link_precedence = row.link_precedence.demote()?;
                    row.linked_id = Some(primary_id);
                }
                ContactPatch::Relink { primary_id } => {
                    row.linked_id = Some(primary_id);
                }
            }
            row.updated_at = now;
            changed += 1;
        }

        self.working.writes += changed;
        Ok(changed)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryContactTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
