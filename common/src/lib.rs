use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metadata attributes propagated from a pod's label to the volume
/// backing one of its claims. An ordered list of key/value maps; the
/// controller carries it through unchanged.
pub type AttributeSet = Vec<BTreeMap<String, String>>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// Pending initializers, front of the list acts first. Absent once
    /// all initializers have run; an absent list and an empty list are
    /// different states on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializers: Option<Initializers>,
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Initializers {
    #[serde(default)]
    pub pending: Vec<Initializer>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Initializer {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PodTask {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(rename = "kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PodSpec {
    #[serde(rename = "nodeName", default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Volume {
    pub name: String,
    #[serde(rename = "persistentVolumeClaim", default)]
    pub persistent_volume_claim: Option<PersistentVolumeClaimSource>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersistentVolumeClaimSource {
    #[serde(rename = "claimName")]
    pub claim_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersistentVolumeClaim {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(rename = "kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ClaimSpec,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ClaimSpec {
    /// Name of the bound volume. Empty until the storage system binds
    /// the claim; a claim never un-binds.
    #[serde(rename = "volumeName", default)]
    pub volume_name: Option<String>,
    #[serde(rename = "storageClassName", default)]
    pub storage_class_name: Option<String>,
}

impl PersistentVolumeClaim {
    /// The bound volume name, if the claim has one and it is non-empty.
    pub fn bound_volume(&self) -> Option<&str> {
        self.spec.volume_name.as_deref().filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersistentVolume {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(rename = "kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConfigMap {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    #[serde(rename = "kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: HashMap<String, String>,
}
