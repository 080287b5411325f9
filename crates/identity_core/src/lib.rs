//! Identity reconciliation core.
//!
//! Resolves partial contact records (email and/or phone) into clusters with
//! exactly one primary, using only the set-oriented storage operations in
//! [`ports`]. Storage engines live in sibling crates; this crate has no
//! database dependency.

pub mod error;
pub mod insertion;
pub mod locator;
pub mod memory;
pub mod ports;
pub mod resolver;
pub mod response;
pub mod service;
pub mod types;

pub use error::IdentityError;
pub use locator::{locate, lock_cluster, Cluster};
pub use memory::MemoryContactStore;
pub use ports::{ContactStore, ContactTx};
pub use resolver::{resolve, Resolution};
pub use response::IdentifyResponse;
pub use service::IdentityService;
pub use types::{
    ContactFilter, ContactId, ContactPatch, ContactPredicate, ContactRecord, IdentifyRequest,
    LinkPrecedence, LockKey, LockKind, NewContact,
};
