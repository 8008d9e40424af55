use async_trait::async_trait;
use common::{ConfigMap, PersistentVolume, PersistentVolumeClaim, PodTask};
use etcd_client::{Client, GetOptions, PutOptions, WatchOptions, WatchStream, Watcher};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::store::{ClaimReader, PodPatcher, StoreError, VolumeStore};
use crate::with_xline::patch;

const PODS_PREFIX: &str = "/registry/pods/";
const CLAIMS_PREFIX: &str = "/registry/persistentvolumeclaims/";
const VOLUMES_PREFIX: &str = "/registry/persistentvolumes/";
const CONFIGMAPS_PREFIX: &str = "/registry/configmaps/";

/// Cluster state store backed by xline/etcd. Objects live as yaml
/// under `/registry/<kind>/<namespace>/<name>` (volumes are not
/// namespaced).
#[derive(Clone)]
pub struct XlineStore {
    client: Arc<RwLock<Client>>,
}

impl XlineStore {
    pub async fn new(endpoints: &[&str]) -> Result<Self, StoreError> {
        let client = Client::connect(endpoints, None).await?;
        Ok(Self {
            client: Arc::new(RwLock::new(client)),
        })
    }

    async fn get_yaml(&self, key: String) -> Result<Option<String>, StoreError> {
        let mut client = self.client.write().await;
        let resp = client.get(key, None).await?;
        Ok(resp
            .kvs()
            .first()
            .map(|kv| String::from_utf8_lossy(kv.value()).to_string()))
    }

    async fn put_yaml(&self, key: String, yaml: &str) -> Result<(), StoreError> {
        let mut client = self.client.write().await;
        client.put(key, yaml, Some(PutOptions::new())).await?;
        Ok(())
    }

    /// Snapshot of every object under a prefix, plus the revision the
    /// read happened at. Watches start from `revision + 1` so no event
    /// falls between the listing and the watch.
    async fn snapshot_with_rev(
        &self,
        prefix: &str,
    ) -> Result<(Vec<(String, String)>, i64), StoreError> {
        let mut client = self.client.write().await;
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        let rev = resp.header().map(|h| h.revision()).unwrap_or(0);
        let items = resp
            .kvs()
            .iter()
            .map(|kv| {
                (
                    String::from_utf8_lossy(kv.key()).replace(prefix, ""),
                    String::from_utf8_lossy(kv.value()).to_string(),
                )
            })
            .collect();
        Ok((items, rev))
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        start_rev: i64,
    ) -> Result<(Watcher, WatchStream), StoreError> {
        let opts = WatchOptions::new()
            .with_prefix()
            .with_prev_key()
            .with_start_revision(start_rev);
        let mut client = self.client.write().await;
        let (watcher, stream) = client.watch(prefix, Some(opts)).await?;
        Ok((watcher, stream))
    }

    pub async fn pods_snapshot_with_rev(
        &self,
    ) -> Result<(Vec<(String, String)>, i64), StoreError> {
        self.snapshot_with_rev(PODS_PREFIX).await
    }

    pub async fn claims_snapshot_with_rev(
        &self,
    ) -> Result<(Vec<(String, String)>, i64), StoreError> {
        self.snapshot_with_rev(CLAIMS_PREFIX).await
    }

    pub async fn watch_pods(&self, start_rev: i64) -> Result<(Watcher, WatchStream), StoreError> {
        self.watch_prefix(PODS_PREFIX, start_rev).await
    }

    pub async fn watch_claims(&self, start_rev: i64) -> Result<(Watcher, WatchStream), StoreError> {
        self.watch_prefix(CLAIMS_PREFIX, start_rev).await
    }

    pub async fn get_pod_yaml(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>, StoreError> {
        self.get_yaml(format!("{PODS_PREFIX}{namespace}/{name}")).await
    }

    pub async fn insert_pod_yaml(
        &self,
        namespace: &str,
        name: &str,
        yaml: &str,
    ) -> Result<(), StoreError> {
        self.put_yaml(format!("{PODS_PREFIX}{namespace}/{name}"), yaml)
            .await
    }

    pub async fn insert_claim_yaml(
        &self,
        namespace: &str,
        name: &str,
        yaml: &str,
    ) -> Result<(), StoreError> {
        self.put_yaml(format!("{CLAIMS_PREFIX}{namespace}/{name}"), yaml)
            .await
    }

    pub async fn insert_volume_yaml(&self, name: &str, yaml: &str) -> Result<(), StoreError> {
        self.put_yaml(format!("{VOLUMES_PREFIX}{name}"), yaml).await
    }

    pub async fn get_configmap(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, StoreError> {
        let yaml = self
            .get_yaml(format!("{CONFIGMAPS_PREFIX}{namespace}/{name}"))
            .await?;
        match yaml {
            Some(yaml) => Ok(Some(serde_yaml::from_str(&yaml)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ClaimReader for XlineStore {
    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, StoreError> {
        let yaml = self
            .get_yaml(format!("{CLAIMS_PREFIX}{namespace}/{name}"))
            .await?;
        match yaml {
            Some(yaml) => Ok(Some(serde_yaml::from_str(&yaml)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl VolumeStore for XlineStore {
    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>, StoreError> {
        let yaml = self.get_yaml(format!("{VOLUMES_PREFIX}{name}")).await?;
        match yaml {
            Some(yaml) => Ok(Some(serde_yaml::from_str(&yaml)?)),
            None => Ok(None),
        }
    }

    async fn update_volume(&self, volume: &PersistentVolume) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(volume)?;
        self.insert_volume_yaml(&volume.metadata.name, &yaml).await
    }
}

#[async_trait]
impl PodPatcher for XlineStore {
    fn compute_patch(&self, old: &PodTask, new: &PodTask) -> Result<Vec<u8>, StoreError> {
        let old_value = serde_json::to_value(old)?;
        let new_value = serde_json::to_value(new)?;
        let patch = patch::diff(&old_value, &new_value);
        Ok(serde_json::to_vec(&patch)?)
    }

    async fn apply_patch(
        &self,
        namespace: &str,
        name: &str,
        patch_bytes: Vec<u8>,
    ) -> Result<(), StoreError> {
        let current = self
            .get_pod_yaml(namespace, name)
            .await?
            .ok_or_else(|| StoreError::not_found("pod", format!("{namespace}/{name}")))?;
        let mut document: serde_json::Value = serde_yaml::from_str(&current)?;
        let patch_value: serde_json::Value = serde_json::from_slice(&patch_bytes)?;
        patch::apply(&mut document, &patch_value);
        let yaml = serde_yaml::to_string(&document)?;
        self.insert_pod_yaml(namespace, name, &yaml).await
    }
}
