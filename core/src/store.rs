//! The process-wide policy store.
//!
//! A single writer (the sync dispatcher) applies control-plane updates; many
//! concurrent authorization calls read. Readers clone an `Arc` to the
//! current [`Snapshot`] under a short read lock, so a call observes one
//! internally-consistent snapshot for its whole duration and no partial
//! update is ever visible.

use crate::Labels;
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use policy_agent_proto::sync::{
    to_dataplane::Payload, NamespaceId, Policy, PolicyId, Profile, ProfileId, ServiceAccountId,
    WorkloadEndpoint,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// An immutable view of everything needed to evaluate a request.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// The local workload endpoint this agent protects.
    pub endpoint: Option<Arc<WorkloadEndpoint>>,

    pub policy_by_id: HashMap<PolicyId, Arc<Policy>>,
    pub profile_by_id: HashMap<ProfileId, Arc<Profile>>,
    pub service_account_by_id: HashMap<ServiceAccountId, Arc<Labels>>,
    pub namespace_by_id: HashMap<NamespaceId, Arc<Labels>>,

    /// Whether the control plane has finished its initial replay. Decisions
    /// taken before this is set deny by default.
    pub in_sync: bool,
}

impl Snapshot {
    pub fn service_account_labels(&self, id: &ServiceAccountId) -> Option<&Arc<Labels>> {
        self.service_account_by_id.get(id)
    }

    pub fn namespace_labels(&self, name: &str) -> Option<&Arc<Labels>> {
        self.namespace_by_id.get(&NamespaceId {
            name: name.to_string(),
        })
    }
}

/// Shared handle to the store. Cheap to clone via `Arc`.
#[derive(Debug)]
pub struct PolicyStore {
    snapshot: RwLock<Arc<Snapshot>>,
    in_sync_tx: watch::Sender<bool>,
}

impl Default for PolicyStore {
    fn default() -> Self {
        let (in_sync_tx, _) = watch::channel(false);
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            in_sync_tx,
        }
    }
}

// === impl PolicyStore ===

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot. Hold it for at most one authorization call.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Whether the control plane has finished its initial replay.
    pub fn is_in_sync(&self) -> bool {
        self.snapshot.read().in_sync
    }

    /// Observes in-sync transitions, e.g. to gate a readiness probe on the
    /// first complete replay.
    pub fn in_sync_rx(&self) -> watch::Receiver<bool> {
        self.in_sync_tx.subscribe()
    }

    /// Applies one control-plane update.
    ///
    /// Single-writer: only the sync dispatcher calls this. An update that
    /// references an object the store has not seen is stored as-is; readers
    /// tolerate lookup misses by treating the dependent entity as having
    /// empty metadata.
    pub fn apply(&self, update: Payload) {
        let mut guard = self.snapshot.write();
        let snap = Arc::make_mut(&mut *guard);
        match update {
            Payload::InSync(_) => {
                info!("policy store in sync");
                snap.in_sync = true;
            }
            Payload::IpsetUpdate(update) => {
                // Addressed to L3/L4 dataplanes; nothing to do here.
                trace!(id = %update.id, "ignoring IP set update");
            }
            Payload::ActiveProfileUpdate(update) => match (update.id, update.profile) {
                (Some(id), Some(profile)) => {
                    debug!(profile = %id.name, "updating profile");
                    snap.profile_by_id.insert(id, Arc::new(profile));
                }
                _ => warn!("dropping profile update without id or body"),
            },
            Payload::ActiveProfileRemove(update) => match update.id {
                Some(id) => {
                    debug!(profile = %id.name, "removing profile");
                    snap.profile_by_id.remove(&id);
                }
                None => warn!("dropping profile remove without id"),
            },
            Payload::ActivePolicyUpdate(update) => match (update.id, update.policy) {
                (Some(id), Some(policy)) => {
                    debug!(tier = %id.tier, policy = %id.name, "updating policy");
                    snap.policy_by_id.insert(id, Arc::new(policy));
                }
                _ => warn!("dropping policy update without id or body"),
            },
            Payload::ActivePolicyRemove(update) => match update.id {
                Some(id) => {
                    debug!(tier = %id.tier, policy = %id.name, "removing policy");
                    snap.policy_by_id.remove(&id);
                }
                None => warn!("dropping policy remove without id"),
            },
            Payload::WorkloadEndpointUpdate(update) => match update.endpoint {
                Some(endpoint) => {
                    debug!(endpoint = %endpoint.name, "updating workload endpoint");
                    snap.endpoint = Some(Arc::new(endpoint));
                }
                None => warn!("dropping workload endpoint update without body"),
            },
            Payload::WorkloadEndpointRemove(_) => {
                debug!("removing workload endpoint");
                snap.endpoint = None;
            }
            Payload::ServiceAccountUpdate(update) => match update.id {
                Some(id) => {
                    debug!(ns = %id.namespace, sa = %id.name, "updating service account");
                    // Replace the label map wholesale; readers may still
                    // hold the previous one.
                    let labels: Labels = update.labels.into_iter().collect();
                    snap.service_account_by_id.insert(id, Arc::new(labels));
                }
                None => warn!("dropping service account update without id"),
            },
            Payload::ServiceAccountRemove(update) => match update.id {
                Some(id) => {
                    debug!(ns = %id.namespace, sa = %id.name, "removing service account");
                    snap.service_account_by_id.remove(&id);
                }
                None => warn!("dropping service account remove without id"),
            },
            Payload::NamespaceUpdate(update) => match update.id {
                Some(id) => {
                    debug!(ns = %id.name, "updating namespace");
                    let labels: Labels = update.labels.into_iter().collect();
                    snap.namespace_by_id.insert(id, Arc::new(labels));
                }
                None => warn!("dropping namespace update without id"),
            },
            Payload::NamespaceRemove(update) => match update.id {
                Some(id) => {
                    debug!(ns = %id.name, "removing namespace");
                    snap.namespace_by_id.remove(&id);
                }
                None => warn!("dropping namespace remove without id"),
            },
        }
        let in_sync = snap.in_sync;
        drop(guard);
        self.in_sync_tx.send_if_modified(|value| {
            let changed = *value != in_sync;
            *value = in_sync;
            changed
        });
    }

    /// Discards all state, e.g. when the sync stream drops. The store is
    /// rebuilt from the control plane's replay on the next connection;
    /// in-sync falls back to false so decisions deny until then.
    pub fn reset(&self) {
        *self.snapshot.write() = Arc::new(Snapshot::default());
        self.in_sync_tx.send_replace(false);
        debug!("policy store reset");
    }
}
