//! Cluster Locator
//!
//! Finds every record reachable from the input pair in one primary hop,
//! using only set-oriented lookups:
//!
//! 1. direct matches on email OR phone
//! 2. those ids plus their `linked_id`s, re-read (captures referenced primaries)
//! 3. every record linked to a primary found in step 2 (captures siblings)
//!
//! Clusters are at most two levels deep at rest, so no recursive expansion
//! is needed. A transient multi-primary state is still returned whole; the
//! resolver collapses it.
//!
//! [`lock_cluster`] wraps the lookup with a lock per primary, so a located
//! cluster stays stable for the rest of the unit of work.

use std::collections::BTreeSet;

use tracing::debug;

use crate::ports::{ContactTx, Result};
use crate::types::{ContactFilter, ContactId, ContactRecord, IdentifyRequest, LockKey};

/// Transient view of one cluster: de-duplicated by id, ordered by
/// `(created_at, id)`. Never persisted in this shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cluster {
    records: Vec<ContactRecord>,
}

impl Cluster {
    pub fn from_records(records: impl IntoIterator<Item = ContactRecord>) -> Self {
        let mut records: Vec<ContactRecord> = records.into_iter().collect();
        records.sort_by_key(|r| r.creation_key());
        records.dedup_by_key(|r| r.id);
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[ContactRecord] {
        &self.records
    }

    pub fn ids(&self) -> Vec<ContactId> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Primaries, oldest first.
    pub fn primaries(&self) -> impl Iterator<Item = &ContactRecord> {
        self.records.iter().filter(|r| r.is_primary())
    }

    pub fn secondaries(&self) -> impl Iterator<Item = &ContactRecord> {
        self.records.iter().filter(|r| !r.is_primary())
    }
}

/// Locate the cluster touched by `request`. Empty when nothing matches.
pub async fn locate(tx: &mut dyn ContactTx, request: &IdentifyRequest) -> Result<Cluster> {
    let direct = tx.find_many(&ContactFilter::by_identity(request)).await?;
    if direct.is_empty() {
        return Ok(Cluster::default());
    }

    let mut network_ids = BTreeSet::new();
    for contact in &direct {
        network_ids.insert(contact.id);
        if let Some(linked_id) = contact.linked_id {
            network_ids.insert(linked_id);
        }
    }

    let network = tx.find_many(&ContactFilter::ids(network_ids)).await?;

    let primary_ids: Vec<ContactId> = network
        .iter()
        .filter(|c| c.is_primary())
        .map(|c| c.id)
        .collect();

    let siblings = if primary_ids.is_empty() {
        Vec::new()
    } else {
        tx.find_many(&ContactFilter::linked_to(primary_ids.iter().copied()))
            .await?
    };

    let cluster = Cluster::from_records(network.into_iter().chain(siblings));
    debug!(
        direct = direct.len(),
        primaries = ?primary_ids,
        size = cluster.len(),
        "located contact cluster"
    );
    Ok(cluster)
}

/// Locate the cluster and lock every primary in it.
///
/// Each round locks the primaries not yet held and then locates again: a
/// merge that committed between the lookup and the lock shows up as a new
/// primary. Returns once a lookup finds no unheld primary. Every writer
/// touching a cluster holds its primaries' locks, so the returned view
/// cannot change before commit.
pub async fn lock_cluster(tx: &mut dyn ContactTx, request: &IdentifyRequest) -> Result<Cluster> {
    let mut held = BTreeSet::new();
    let mut rounds = 0u32;

    loop {
        let cluster = locate(tx, request).await?;

        let pending: Vec<ContactId> = cluster
            .primaries()
            .map(|r| r.id)
            .filter(|id| !held.contains(id))
            .collect();
        if pending.is_empty() {
            if rounds > 1 {
                debug!(rounds, primaries = ?held, "cluster changed while locking");
            }
            return Ok(cluster);
        }

        let keys: Vec<LockKey> = pending.iter().copied().map(LockKey::cluster).collect();
        tx.acquire_cluster_locks(&keys).await?;
        held.extend(pending);
        rounds += 1;
    }
}
