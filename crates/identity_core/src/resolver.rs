//! Primary Resolver
//!
//! Collapses a cluster onto its oldest primary. Competing primaries are
//! demoted (never deleted) and everything that pointed at them is re-linked
//! to the survivor. A cluster that already has one primary costs no writes.

use tracing::info;

use crate::error::IdentityError;
use crate::locator::Cluster;
use crate::ports::{ContactTx, Result};
use crate::types::{ContactFilter, ContactId, ContactPatch, ContactRecord};

/// Outcome of resolving one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub true_primary: ContactRecord,
    /// Former primaries now secondary, oldest first
    pub demoted: Vec<ContactId>,
    /// Number of secondaries re-parented from a demoted primary
    pub relinked: u64,
}

impl Resolution {
    pub fn wrote_anything(&self) -> bool {
        !self.demoted.is_empty() || self.relinked > 0
    }
}

pub async fn resolve(tx: &mut dyn ContactTx, cluster: &Cluster) -> Result<Resolution> {
    let mut primaries = cluster.primaries();

    let true_primary = primaries.next().cloned().ok_or_else(|| {
        IdentityError::IntegrityFault(format!(
            "no primary contact found in cluster {:?}",
            cluster.ids()
        ))
    })?;

    let other_primaries: Vec<&ContactRecord> = primaries.collect();
    if other_primaries.is_empty() {
        return Ok(Resolution {
            true_primary,
            demoted: Vec::new(),
            relinked: 0,
        });
    }

    let mut demoted = Vec::with_capacity(other_primaries.len());
    for other in &other_primaries {
        other.link_precedence.demote()?;
        demoted.push(other.id);
    }

    let primary_id = true_primary.id;
    tx.update_many(
        &ContactFilter::ids(demoted.iter().copied()),
        ContactPatch::Demote { primary_id },
    )
    .await?;

    let relinked = tx
        .update_many(
            &ContactFilter::linked_to(demoted.iter().copied()),
            ContactPatch::Relink { primary_id },
        )
        .await?;

    info!(
        primary_id,
        demoted = ?demoted,
        relinked,
        "merged competing primaries"
    );

    Ok(Resolution {
        true_primary,
        demoted,
        relinked,
    })
}
