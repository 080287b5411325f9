//! Storage port traits for reconciliation.
//! Implemented by identity_postgres and `crate::memory`; core logic depends only on these traits.

use async_trait::async_trait;

use crate::error::IdentityError;
use crate::types::{ContactFilter, ContactPatch, ContactRecord, LockKey, NewContact};

pub type Result<T> = std::result::Result<T, IdentityError>;

/// Entry point into the contact table.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Open one atomic unit of work. Everything a request reads or writes
    /// goes through the returned transaction; dropping it without `commit`
    /// discards every write.
    async fn begin(&self) -> Result<Box<dyn ContactTx>>;

    /// Cheap connectivity check behind `/health`.
    async fn ping(&self) -> Result<()>;
}

/// Operations available inside a unit of work.
///
/// Reads observe the transaction's own writes and never block. Writers are
/// kept apart by `acquire_locks`: identity values first, then the primaries
/// of the located cluster.
#[async_trait]
pub trait ContactTx: Send {
    /// Serialize against other units of work holding any of `keys`.
    /// Held until commit or rollback.
    async fn acquire_locks(&mut self, keys: &[LockKey]) -> Result<()>;

    /// Lock cluster primaries on top of the cluster locks already held.
    ///
    /// To keep one global lock order a store may drop and re-take cluster
    /// locks from earlier calls (never the `acquire_locks` ones), so
    /// anything read before this call must be read again after it. Must be
    /// called before the unit of work writes anything.
    async fn acquire_cluster_locks(&mut self, keys: &[LockKey]) -> Result<()>;

    /// Non-excluded records matching the filter, ordered by
    /// `(created_at, id)` ascending.
    async fn find_many(&mut self, filter: &ContactFilter) -> Result<Vec<ContactRecord>>;

    /// Insert and return the persisted record with its assigned id and timestamps.
    async fn create(&mut self, contact: NewContact) -> Result<ContactRecord>;

    /// Apply a state transition to every matching record, excluded or not.
    /// Returns the number of records changed.
    async fn update_many(&mut self, filter: &ContactFilter, patch: ContactPatch) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
