use serde::Deserialize;
use std::time::Duration;

/// Controller configuration, built once at startup and passed into the
/// controller by the caller. Defaults match the original flag defaults
/// of the pv initializer.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializerConfig {
    /// Name this controller answers to in a pod's pending initializer
    /// list.
    #[serde(default = "default_initializer_name")]
    pub initializer_name: String,
    /// Annotation stamped on a volume once attributes were applied.
    #[serde(default = "default_annotation")]
    pub annotation: String,
    /// Pod label whose value selects the attribute set.
    #[serde(default = "default_label_key")]
    pub label_key: String,
    /// ConfigMap holding the label -> attribute mapping.
    #[serde(default = "default_configmap_name")]
    pub configmap_name: String,
    #[serde(default = "default_configmap_namespace")]
    pub configmap_namespace: String,
    /// Poll interval of the initial-sync gate.
    #[serde(default = "default_sync_poll_interval", with = "secs")]
    pub sync_poll_interval: Duration,
    /// Overall deadline of the initial-sync gate; exceeding it is fatal.
    #[serde(default = "default_sync_timeout", with = "secs")]
    pub sync_timeout: Duration,
}

fn default_initializer_name() -> String {
    "pv.initializer.kubernetes.io".to_string()
}

fn default_annotation() -> String {
    "initializer.kubernetes.io/pv".to_string()
}

fn default_label_key() -> String {
    "app".to_string()
}

fn default_configmap_name() -> String {
    "pv-initializer".to_string()
}

fn default_configmap_namespace() -> String {
    "default".to_string()
}

fn default_sync_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_sync_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for InitializerConfig {
    fn default() -> Self {
        InitializerConfig {
            initializer_name: default_initializer_name(),
            annotation: default_annotation(),
            label_key: default_label_key(),
            configmap_name: default_configmap_name(),
            configmap_namespace: default_configmap_namespace(),
            sync_poll_interval: default_sync_poll_interval(),
            sync_timeout: default_sync_timeout(),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_flag_defaults() {
        let cfg = InitializerConfig::default();
        assert_eq!(cfg.initializer_name, "pv.initializer.kubernetes.io");
        assert_eq!(cfg.annotation, "initializer.kubernetes.io/pv");
        assert_eq!(cfg.configmap_name, "pv-initializer");
        assert_eq!(cfg.configmap_namespace, "default");
        assert_eq!(cfg.sync_timeout, Duration::from_secs(300));
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let cfg: InitializerConfig =
            serde_yaml::from_str("initializer_name: custom.initializer\nsync_timeout: 10\n")
                .unwrap();
        assert_eq!(cfg.initializer_name, "custom.initializer");
        assert_eq!(cfg.sync_timeout, Duration::from_secs(10));
        assert_eq!(cfg.label_key, "app");
    }
}
