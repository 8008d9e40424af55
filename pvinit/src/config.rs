use anyhow::{Context, Result};
use libinitializer::config::InitializerConfig;
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    // Xline endpoints
    pub xline_config: XlineConfig,
    // Controller settings, optional with flag-compatible defaults
    #[serde(default)]
    pub initializer: InitializerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XlineConfig {
    pub endpoints: Vec<String>,
}

pub fn load_config(path: &str) -> Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read config from {path}"))?;
    let cfg: Config = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_uses_initializer_defaults() {
        let yaml = "xline_config:\n  endpoints:\n    - http://127.0.0.1:2379\n";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        let cfg = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.xline_config.endpoints.len(), 1);
        assert_eq!(
            cfg.initializer.initializer_name,
            "pv.initializer.kubernetes.io"
        );
    }

    #[test]
    fn initializer_section_overrides_defaults() {
        let yaml = concat!(
            "xline_config:\n  endpoints:\n    - http://127.0.0.1:2379\n",
            "initializer:\n  initializer_name: custom.initializer\n  configmap_namespace: kube-system\n",
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        let cfg = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.initializer.initializer_name, "custom.initializer");
        assert_eq!(cfg.initializer.configmap_namespace, "kube-system");
        assert_eq!(cfg.initializer.configmap_name, "pv-initializer");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config("/does/not/exist.yaml").is_err());
    }
}
