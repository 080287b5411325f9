//! IdentityService: one reconciliation per unit of work.
//!
//! locate → resolve → insert → build, all inside a single transaction
//! obtained from the `ContactStore` port. Any error rolls the unit back;
//! the service itself never retries.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::IdentityError;
use crate::insertion::needs_new_record;
use crate::locator::lock_cluster;
use crate::ports::{ContactStore, ContactTx, Result};
use crate::resolver::resolve;
use crate::response::{build, IdentifyResponse};
use crate::types::{ContactFilter, IdentifyRequest, NewContact};

pub struct IdentityService {
    store: Arc<dyn ContactStore>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn ContactStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ContactStore> {
        &self.store
    }

    /// Reconcile one normalized pair and return the merged cluster view.
    pub async fn identify(&self, request: &IdentifyRequest) -> Result<IdentifyResponse> {
        if request.is_empty() {
            return Err(IdentityError::InvalidInput(
                "Either email or phoneNumber must be provided.".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;

        match reconcile(tx.as_mut(), request).await {
            Ok(response) => {
                tx.commit().await?;
                Ok(response)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback after failed reconciliation also failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }
}

async fn reconcile(tx: &mut dyn ContactTx, request: &IdentifyRequest) -> Result<IdentifyResponse> {
    tx.acquire_locks(&request.lock_keys()).await?;

    let cluster = lock_cluster(tx, request).await?;

    if cluster.is_empty() {
        let primary = tx.create(NewContact::primary(request)).await?;
        info!(primary_id = primary.id, "created new primary contact");
        return Ok(build(&primary, &[]));
    }

    let resolution = resolve(tx, &cluster).await?;
    let primary_id = resolution.true_primary.id;

    if needs_new_record(request, cluster.records()) {
        let secondary = tx
            .create(NewContact::secondary(request, primary_id))
            .await?;
        info!(
            primary_id,
            secondary_id = secondary.id,
            "linked new secondary contact"
        );
    } else {
        debug!(primary_id, "request carries no new information");
    }

    let secondaries = tx.find_many(&ContactFilter::linked_to([primary_id])).await?;

    Ok(build(&resolution.true_primary, &secondaries))
}
