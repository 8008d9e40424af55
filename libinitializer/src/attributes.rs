use common::AttributeSet;
use serde::Deserialize;

/// One record of the operator-supplied mapping: pods whose configured
/// label carries `label` get `attributes` propagated to their volumes.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeRecord {
    pub label: String,
    #[serde(default)]
    pub attributes: AttributeSet,
}

/// Read-only label -> attribute-set lookup, loaded once at startup
/// from the initializer ConfigMap.
#[derive(Debug, Clone, Default)]
pub struct AttributeLookup {
    records: Vec<AttributeRecord>,
}

impl AttributeLookup {
    /// A lookup that never matches; pods still get their marker
    /// removed, nothing is propagated.
    pub fn empty() -> Self {
        AttributeLookup::default()
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let records: Vec<AttributeRecord> = serde_yaml::from_str(yaml)?;
        Ok(AttributeLookup { records })
    }

    /// First record whose label matches wins; label uniqueness is not
    /// enforced in the config source. Unknown labels map to the empty
    /// set.
    pub fn attributes_for_label(&self, value: &str) -> AttributeSet {
        self.records
            .iter()
            .find(|r| r.label == value)
            .map(|r| r.attributes.clone())
            .unwrap_or_default()
    }
}
