use std::sync::Arc;

use common::{AttributeSet, PersistentVolumeClaim, PodTask};
use log::{debug, error, info, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::attributes::AttributeLookup;
use crate::config::InitializerConfig;
use crate::markers::{self, MarkerOutcome};
use crate::pending::{ClaimKey, PendingAssociations};
use crate::propagate;
use crate::store::{ClaimReader, PodPatcher, StoreError, VolumeStore};

#[derive(Debug, thiserror::Error)]
pub enum InitializerError {
    #[error("{stream} stream initial sync timed out")]
    SyncTimeout { stream: &'static str },
}

/// A watch-backed event stream feeding the controller. `start` begins
/// delivery on a background task; `has_synced` reports whether the
/// initial listing has been fully delivered.
pub trait EventSource: Send + Sync {
    fn start(&self, cancel: CancellationToken);

    fn has_synced(&self) -> bool;
}

/// The pv initializer: strips its own pending-initializer marker from
/// new pods and propagates label-selected attributes to the volumes
/// backing the pods' claims, deferring propagation for claims that
/// are not bound yet.
pub struct Controller<S> {
    config: InitializerConfig,
    store: Arc<S>,
    attributes: AttributeLookup,
    pending: PendingAssociations,
}

impl<S> Controller<S>
where
    S: ClaimReader + VolumeStore + PodPatcher,
{
    pub fn new(config: InitializerConfig, store: Arc<S>, attributes: AttributeLookup) -> Self {
        Controller {
            config,
            store,
            attributes,
            pending: PendingAssociations::new(),
        }
    }

    pub fn config(&self) -> &InitializerConfig {
        &self.config
    }

    /// The deferred-association table. Shared between the pod and
    /// claim event paths; exposed read-mostly for inspection.
    pub fn pending(&self) -> &PendingAssociations {
        &self.pending
    }

    /// Pod add handler. Acts only when our own marker is at the front
    /// of the pod's pending initializer queue; resolves every claim
    /// the pod references, then removes the marker via a patch. Claim
    /// failures never block the patch, a patch failure leaves the
    /// marker intact for the next resync to retry.
    pub async fn handle_pod_add(&self, pod: &PodTask) -> Result<(), StoreError> {
        let remaining = match markers::remove_self_from_pending(
            pod.metadata.initializers.as_ref(),
            &self.config.initializer_name,
        ) {
            MarkerOutcome::NotOurs => return Ok(()),
            MarkerOutcome::Claimed(remaining) => remaining,
        };
        let namespace = &pod.metadata.namespace;
        let name = &pod.metadata.name;
        debug!("initializing pod {namespace}/{name}");

        let attributes = self.attributes_for_pod(pod);
        for volume in &pod.spec.volumes {
            let Some(source) = &volume.persistent_volume_claim else {
                continue;
            };
            let key = ClaimKey::new(namespace, &source.claim_name);
            match self.store.get_claim(&key.namespace, &key.name).await {
                Ok(Some(claim)) => match claim.bound_volume() {
                    Some(volume_name) => {
                        debug!("claim {key} already bound to {volume_name}");
                        if let Err(e) = propagate::apply_attributes(
                            self.store.as_ref(),
                            &self.config.annotation,
                            Some(volume_name),
                            &attributes,
                        )
                        .await
                        {
                            warn!("failed to propagate attributes to volume {volume_name}: {e}");
                        }
                    }
                    None => {
                        debug!("claim {key} not bound yet, deferring propagation");
                        self.pending.insert(key, attributes.clone()).await;
                    }
                },
                Ok(None) => warn!("claim {key} not found, skipping"),
                Err(e) => warn!("failed to read claim {key}: {e}"),
            }
        }

        let mut initialized = pod.clone();
        initialized.metadata.initializers = remaining;
        let patch = self.store.compute_patch(pod, &initialized)?;
        self.store.apply_patch(namespace, name, patch).await?;
        info!("initialized pod {namespace}/{name}");
        Ok(())
    }

    /// Claim update handler. Every delivered update for a claim with a
    /// deferred entry consumes that entry: propagation runs with the
    /// claim's bound volume if it has one, and the entry is removed
    /// either way so redeliveries cannot retry endlessly. Updates for
    /// claims without an entry are ignored.
    pub async fn handle_claim_update(
        &self,
        _old: Option<&PersistentVolumeClaim>,
        new: &PersistentVolumeClaim,
    ) {
        let key = ClaimKey::new(&new.metadata.namespace, &new.metadata.name);
        let Some(attributes) = self.pending.lookup(&key).await else {
            return;
        };
        debug!("claim {key} update consumes a deferred propagation");
        if let Err(e) = propagate::apply_attributes(
            self.store.as_ref(),
            &self.config.annotation,
            new.bound_volume(),
            &attributes,
        )
        .await
        {
            warn!("failed to propagate deferred attributes for claim {key}: {e}");
        }
        self.pending.remove(&key).await;
    }

    /// Periodic-relist delivery for the claim stream. A relist hands
    /// back every claim regardless of state; an unbound claim carries
    /// no bind to act on and must not consume a deferred entry that is
    /// still waiting for one, so only bound claims are passed through.
    pub async fn handle_claim_resync(&self, claim: &PersistentVolumeClaim) {
        if claim.bound_volume().is_none() {
            return;
        }
        self.handle_claim_update(Some(claim), claim).await;
    }

    /// Starts both event streams, pods strictly before claims, gating
    /// each on its initial sync, then parks until cancellation. A
    /// stream that cannot finish its initial sync within the deadline
    /// is fatal: a controller that never syncs would silently leave
    /// every new pod stuck pending initialization.
    pub async fn run(
        &self,
        pods: &dyn EventSource,
        claims: &dyn EventSource,
        cancel: CancellationToken,
    ) -> Result<(), InitializerError> {
        info!("pod stream starting");
        pods.start(cancel.child_token());
        info!("waiting for pod stream initial sync");
        self.wait_for_sync("pod", pods).await?;

        info!("claim stream starting");
        claims.start(cancel.child_token());
        info!("waiting for claim stream initial sync");
        self.wait_for_sync("claim", claims).await?;

        info!("initial sync complete, controller running");
        cancel.cancelled().await;
        info!("stop requested, controller shutting down");
        Ok(())
    }

    async fn wait_for_sync(
        &self,
        stream: &'static str,
        source: &dyn EventSource,
    ) -> Result<(), InitializerError> {
        let deadline = Instant::now() + self.config.sync_timeout;
        let mut tick = tokio::time::interval(self.config.sync_poll_interval);
        tick.tick().await;
        while !source.has_synced() {
            if Instant::now() >= deadline {
                error!("{stream} stream initial sync timed out");
                return Err(InitializerError::SyncTimeout { stream });
            }
            tick.tick().await;
        }
        Ok(())
    }

    fn attributes_for_pod(&self, pod: &PodTask) -> AttributeSet {
        pod.metadata
            .labels
            .get(&self.config.label_key)
            .map(|value| self.attributes.attributes_for_label(value))
            .unwrap_or_default()
    }
}
