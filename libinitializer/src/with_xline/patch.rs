use serde_json::{Map, Value};

/// Two-way merge patch between two JSON documents: keys that changed
/// carry their new value, keys that disappeared carry `null`, arrays
/// are replaced wholesale. Applying the result to `old` yields `new`.
pub fn diff(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();
            for (key, new_value) in new_map {
                match old_map.get(key) {
                    Some(old_value) if old_value == new_value => {}
                    Some(old_value) => {
                        patch.insert(key.clone(), diff(old_value, new_value));
                    }
                    None => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }
            for key in old_map.keys() {
                if !new_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => new.clone(),
    }
}

/// Applies a merge patch in place: `null` removes a key, objects merge
/// recursively, everything else replaces the target value.
pub fn apply(target: &mut Value, patch: &Value) {
    let Value::Object(entries) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, patch_value) in entries {
            if patch_value.is_null() {
                target_map.remove(key);
            } else {
                apply(
                    target_map.entry(key.clone()).or_insert(Value::Null),
                    patch_value,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_then_apply_reproduces_the_new_document() {
        let old = json!({
            "metadata": {
                "name": "pod-b",
                "initializers": {"pending": [{"name": "pv.initializer.kubernetes.io"}]}
            },
            "spec": {"volumes": [{"name": "data"}]}
        });
        let new = json!({
            "metadata": {"name": "pod-b"},
            "spec": {"volumes": [{"name": "data"}]}
        });
        let patch = diff(&old, &new);
        let mut patched = old.clone();
        apply(&mut patched, &patch);
        assert_eq!(patched, new);
    }

    #[test]
    fn removed_field_becomes_a_null_tombstone() {
        let old = json!({"metadata": {"initializers": {"pending": []}, "name": "p"}});
        let new = json!({"metadata": {"name": "p"}});
        let patch = diff(&old, &new);
        assert_eq!(patch, json!({"metadata": {"initializers": null}}));
    }

    #[test]
    fn untouched_fields_do_not_appear_in_the_patch() {
        let old = json!({"a": 1, "b": {"c": 2, "d": 3}});
        let new = json!({"a": 1, "b": {"c": 2, "d": 4}});
        assert_eq!(diff(&old, &new), json!({"b": {"d": 4}}));
    }

    #[test]
    fn arrays_are_replaced_wholesale() {
        let old = json!({"pending": [{"name": "a"}, {"name": "b"}]});
        let new = json!({"pending": [{"name": "b"}]});
        assert_eq!(diff(&old, &new), json!({"pending": [{"name": "b"}]}));
    }

    #[test]
    fn apply_to_non_object_replaces_it() {
        let mut target = json!("scalar");
        apply(&mut target, &json!({"k": 1}));
        assert_eq!(target, json!({"k": 1}));
    }
}
