pub mod patch;
pub mod store;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{PersistentVolumeClaim, PodTask};
use etcd_client::EventType;
use log::{debug, error, info, warn};
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::attributes::AttributeLookup;
use crate::config::InitializerConfig;
use crate::controller::{Controller, EventSource};
use crate::store::StoreError;
use crate::with_xline::store::XlineStore;

/// ConfigMap data key holding the label -> attribute-set records.
pub const ATTRIBUTES_KEY: &str = "attributes";

/// Period after which each stream re-lists its snapshot and redelivers
/// it. Redelivery is what retries pods whose patch failed.
const RESYNC_PERIOD: Duration = Duration::from_secs(30);

/// Pause before re-establishing a watch stream that closed or errored.
const REWATCH_BACKOFF: Duration = Duration::from_secs(5);

/// Connects to xline, loads the attribute configmap, and runs the
/// initializer controller until `cancel` fires.
pub async fn run_initializer_with_xline(
    endpoints: &[&str],
    config: InitializerConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let store = Arc::new(XlineStore::new(endpoints).await?);
    let attributes = load_attribute_lookup(&store, &config).await;
    let controller = Arc::new(Controller::new(config, store.clone(), attributes));
    let pods = PodEventSource::new(store.clone(), controller.clone());
    let claims = ClaimEventSource::new(store, controller.clone());
    controller.run(&pods, &claims, cancel).await?;
    Ok(())
}

/// Reads the attribute configmap. A missing or malformed configmap is
/// not fatal: the controller still strips markers, it just has nothing
/// to propagate.
pub async fn load_attribute_lookup(
    store: &XlineStore,
    config: &InitializerConfig,
) -> AttributeLookup {
    let namespace = &config.configmap_namespace;
    let name = &config.configmap_name;
    match store.get_configmap(namespace, name).await {
        Ok(Some(cm)) => match cm.data.get(ATTRIBUTES_KEY) {
            Some(yaml) => match AttributeLookup::from_yaml(yaml) {
                Ok(lookup) => lookup,
                Err(e) => {
                    warn!("configmap {namespace}/{name} has malformed attributes: {e}");
                    AttributeLookup::empty()
                }
            },
            None => {
                warn!("configmap {namespace}/{name} has no '{ATTRIBUTES_KEY}' key");
                AttributeLookup::empty()
            }
        },
        Ok(None) => {
            warn!("configmap {namespace}/{name} not found, nothing will be propagated");
            AttributeLookup::empty()
        }
        Err(e) => {
            warn!("failed to read configmap {namespace}/{name}: {e}");
            AttributeLookup::empty()
        }
    }
}

/// Runs stream cycles back to back until one ends with cancellation.
/// A cycle that fails (listing error, watch closed, watch error) is
/// retried after a pause, so a lost backend connection degrades into
/// missed-then-redelivered events instead of a controller that sits
/// parked forever with dead streams.
async fn supervise_stream<F, Fut>(
    name: &'static str,
    cancel: CancellationToken,
    backoff: Duration,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    loop {
        match cycle().await {
            Ok(()) => break,
            Err(e) => error!("{name} stream lost: {e}, re-establishing"),
        }
        select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
    info!("{name} stream stopping");
}

/// Pod watch stream. Delivers the initial listing as adds, then every
/// newly created pod, sequentially on one task.
pub struct PodEventSource {
    store: Arc<XlineStore>,
    controller: Arc<Controller<XlineStore>>,
    synced: Arc<AtomicBool>,
}

impl PodEventSource {
    pub fn new(store: Arc<XlineStore>, controller: Arc<Controller<XlineStore>>) -> Self {
        PodEventSource {
            store,
            controller,
            synced: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl EventSource for PodEventSource {
    fn start(&self, cancel: CancellationToken) {
        let store = self.store.clone();
        let controller = self.controller.clone();
        let synced = self.synced.clone();
        tokio::spawn(async move {
            let cycle_cancel = cancel.clone();
            supervise_stream("pod", cancel, REWATCH_BACKOFF, move || {
                pod_stream_cycle(
                    store.clone(),
                    controller.clone(),
                    synced.clone(),
                    cycle_cancel.clone(),
                )
            })
            .await;
        });
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

/// One pod stream lifetime: list, deliver the snapshot as adds, then
/// consume the watch until cancellation (`Ok`) or stream loss (`Err`).
async fn pod_stream_cycle(
    store: Arc<XlineStore>,
    controller: Arc<Controller<XlineStore>>,
    synced: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> Result<(), StoreError> {
    let (items, rev) = store.pods_snapshot_with_rev().await?;
    for (key, yaml) in items {
        deliver_pod(&controller, &key, &yaml).await;
    }
    synced.store(true, Ordering::SeqCst);

    let (_watcher, mut stream) = store.watch_pods(rev + 1).await?;
    let mut resync = tokio::time::interval(RESYNC_PERIOD);
    resync.tick().await;

    loop {
        select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = resync.tick() => {
                match store.pods_snapshot_with_rev().await {
                    Ok((items, _)) => {
                        for (key, yaml) in items {
                            deliver_pod(&controller, &key, &yaml).await;
                        }
                    }
                    Err(e) => warn!("pod resync listing failed: {e}"),
                }
            }
            msg = stream.message() => match msg {
                Ok(Some(resp)) => {
                    for event in resp.events() {
                        if event.event_type() != EventType::Put {
                            continue;
                        }
                        let Some(kv) = event.kv() else { continue };
                        // version 1 is the key's creation; later puts
                        // (our own patches included) are not adds.
                        if kv.version() != 1 {
                            continue;
                        }
                        let key = String::from_utf8_lossy(kv.key()).to_string();
                        let yaml = String::from_utf8_lossy(kv.value()).to_string();
                        deliver_pod(&controller, &key, &yaml).await;
                    }
                }
                Ok(None) => {
                    return Err(StoreError::Other(anyhow::anyhow!("watch stream closed")));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

async fn deliver_pod(controller: &Controller<XlineStore>, key: &str, yaml: &str) {
    match serde_yaml::from_str::<PodTask>(yaml) {
        Ok(pod) => {
            if let Err(e) = controller.handle_pod_add(&pod).await {
                warn!("failed to initialize {key}: {e}");
            }
        }
        Err(e) => debug!("skipping unparsable pod at {key}: {e}"),
    }
}

/// Claim watch stream. Delivers every claim put as an update with the
/// previous state when the store has one.
pub struct ClaimEventSource {
    store: Arc<XlineStore>,
    controller: Arc<Controller<XlineStore>>,
    synced: Arc<AtomicBool>,
}

impl ClaimEventSource {
    pub fn new(store: Arc<XlineStore>, controller: Arc<Controller<XlineStore>>) -> Self {
        ClaimEventSource {
            store,
            controller,
            synced: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl EventSource for ClaimEventSource {
    fn start(&self, cancel: CancellationToken) {
        let store = self.store.clone();
        let controller = self.controller.clone();
        let synced = self.synced.clone();
        tokio::spawn(async move {
            let cycle_cancel = cancel.clone();
            supervise_stream("claim", cancel, REWATCH_BACKOFF, move || {
                claim_stream_cycle(
                    store.clone(),
                    controller.clone(),
                    synced.clone(),
                    cycle_cancel.clone(),
                )
            })
            .await;
        });
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

/// One claim stream lifetime, same shape as the pod cycle. Relist
/// redelivery goes through the resync handler, which ignores unbound
/// claims: a relist is not a bind, and delivering still-unbound claims
/// as updates would consume deferred entries with nothing to act on.
async fn claim_stream_cycle(
    store: Arc<XlineStore>,
    controller: Arc<Controller<XlineStore>>,
    synced: Arc<AtomicBool>,
    cancel: CancellationToken,
) -> Result<(), StoreError> {
    let (_, rev) = store.claims_snapshot_with_rev().await?;
    synced.store(true, Ordering::SeqCst);

    let (_watcher, mut stream) = store.watch_claims(rev + 1).await?;
    let mut resync = tokio::time::interval(RESYNC_PERIOD);
    resync.tick().await;

    loop {
        select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = resync.tick() => {
                match store.claims_snapshot_with_rev().await {
                    Ok((items, _)) => {
                        for (key, yaml) in items {
                            match serde_yaml::from_str::<PersistentVolumeClaim>(&yaml) {
                                Ok(claim) => controller.handle_claim_resync(&claim).await,
                                Err(e) => debug!("skipping unparsable claim at {key}: {e}"),
                            }
                        }
                    }
                    Err(e) => warn!("claim resync listing failed: {e}"),
                }
            }
            msg = stream.message() => match msg {
                Ok(Some(resp)) => {
                    for event in resp.events() {
                        if event.event_type() != EventType::Put {
                            continue;
                        }
                        let Some(kv) = event.kv() else { continue };
                        let key = String::from_utf8_lossy(kv.key()).to_string();
                        let new = match serde_yaml::from_str::<PersistentVolumeClaim>(
                            &String::from_utf8_lossy(kv.value()),
                        ) {
                            Ok(claim) => claim,
                            Err(e) => {
                                debug!("skipping unparsable claim at {key}: {e}");
                                continue;
                            }
                        };
                        let old = event.prev_kv().and_then(|prev| {
                            serde_yaml::from_str::<PersistentVolumeClaim>(
                                &String::from_utf8_lossy(prev.value()),
                            )
                            .ok()
                        });
                        controller.handle_claim_update(old.as_ref(), &new).await;
                    }
                }
                Ok(None) => {
                    return Err(StoreError::Other(anyhow::anyhow!("watch stream closed")));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    #[tokio::test]
    async fn lost_stream_cycles_are_retried_until_cancelled() {
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let cycle_cancel = cancel.clone();
        let cycle_attempts = attempts.clone();
        let supervisor = supervise_stream(
            "pod",
            cancel.clone(),
            Duration::from_millis(5),
            move || {
                let attempts = cycle_attempts.clone();
                let cancel = cycle_cancel.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) >= 2 {
                        cancel.cancel();
                    }
                    Err(StoreError::Other(anyhow::anyhow!("watch stream closed")))
                }
            },
        );
        timeout(Duration::from_secs(1), supervisor).await.unwrap();

        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn cancelled_cycle_ends_supervision_without_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));

        let cycle_attempts = attempts.clone();
        let supervisor = supervise_stream(
            "claim",
            CancellationToken::new(),
            Duration::from_millis(5),
            move || {
                let attempts = cycle_attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );
        timeout(Duration::from_secs(1), supervisor).await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
