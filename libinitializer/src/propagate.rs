use crate::store::{StoreError, VolumeStore};
use common::AttributeSet;
use log::{debug, info};

/// Applies an attribute set to the named volume as annotations.
///
/// Idempotent: the volume is re-read, the attribute maps are merged
/// into its annotations together with the provenance annotation, and
/// the write is skipped when nothing would change. Redelivered events
/// therefore cost one read, not one write.
pub async fn apply_attributes<S: VolumeStore + ?Sized>(
    store: &S,
    annotation: &str,
    volume_name: Option<&str>,
    attributes: &AttributeSet,
) -> Result<(), StoreError> {
    let name = match volume_name {
        Some(n) if !n.is_empty() => n,
        _ => {
            debug!("no bound volume to propagate to, skipping");
            return Ok(());
        }
    };
    if attributes.is_empty() {
        debug!("empty attribute set, leaving volume {name} alone");
        return Ok(());
    }

    let mut volume = store
        .get_volume(name)
        .await?
        .ok_or_else(|| StoreError::not_found("persistentvolume", name))?;

    let mut changed = false;
    for map in attributes {
        for (k, v) in map {
            if volume.metadata.annotations.get(k) != Some(v) {
                volume
                    .metadata
                    .annotations
                    .insert(k.clone(), v.clone());
                changed = true;
            }
        }
    }
    if volume.metadata.annotations.get(annotation).map(String::as_str) != Some("initialized") {
        volume
            .metadata
            .annotations
            .insert(annotation.to_string(), "initialized".to_string());
        changed = true;
    }

    if !changed {
        debug!("volume {name} already carries the desired attributes");
        return Ok(());
    }

    store.update_volume(&volume).await?;
    info!("updated volume {name} with {} attribute map(s)", attributes.len());
    Ok(())
}
