use async_trait::async_trait;
use common::{PersistentVolume, PersistentVolumeClaim, PodTask};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },
    #[error(transparent)]
    Xline(#[from] Box<etcd_client::Error>),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<etcd_client::Error> for StoreError {
    fn from(e: etcd_client::Error) -> Self {
        StoreError::Xline(Box::new(e))
    }
}

impl StoreError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            key: key.into(),
        }
    }
}

/// Read access to storage claims.
#[async_trait]
pub trait ClaimReader: Send + Sync {
    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, StoreError>;
}

/// Read and write access to volumes, the target of attribute
/// propagation.
#[async_trait]
pub trait VolumeStore: Send + Sync {
    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>, StoreError>;

    async fn update_volume(&self, volume: &PersistentVolume) -> Result<(), StoreError>;
}

/// Partial-update submission for pods: the caller computes a patch
/// from the observed and the desired object and applies it by
/// coordinates, never overwriting fields it did not touch.
#[async_trait]
pub trait PodPatcher: Send + Sync {
    fn compute_patch(&self, old: &PodTask, new: &PodTask) -> Result<Vec<u8>, StoreError>;

    async fn apply_patch(
        &self,
        namespace: &str,
        name: &str,
        patch: Vec<u8>,
    ) -> Result<(), StoreError>;
}
