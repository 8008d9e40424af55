use common::AttributeSet;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;

/// Identity of a storage claim within the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimKey {
    pub namespace: String,
    pub name: String,
}

impl ClaimKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        ClaimKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Deferred attribute propagations, keyed by the claim whose binding
/// they wait for. The only state shared between the pod and claim
/// event paths; every operation runs inside one critical section.
///
/// Unbounded: entries for claims that are deleted before they ever
/// bind stay here until process restart.
#[derive(Default)]
pub struct PendingAssociations {
    inner: Mutex<HashMap<ClaimKey, AttributeSet>>,
}

impl PendingAssociations {
    pub fn new() -> Self {
        PendingAssociations {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Stores or overwrites the deferred attribute set for a claim.
    pub async fn insert(&self, key: ClaimKey, attributes: AttributeSet) {
        self.inner.lock().await.insert(key, attributes);
    }

    /// Drops the entry for a claim. Absent entries are a no-op.
    pub async fn remove(&self, key: &ClaimKey) {
        self.inner.lock().await.remove(key);
    }

    pub async fn lookup(&self, key: &ClaimKey) -> Option<AttributeSet> {
        self.inner.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
