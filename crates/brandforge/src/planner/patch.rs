//! Deep merge of sparse patches into a base structured description.

use serde_json::Value;

/// Merges `patch` into `base` recursively.
///
/// For each key: when both sides hold objects the merge recurses, otherwise
/// the patch value replaces the base value. The asymmetry lets a patch both
/// override a scalar and extend a nested structure, while a scalar patch
/// value flattens a nested base value without descending into it. Arrays
/// are replaced wholesale.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) if existing.is_object() && patch_value.is_object() => {
                        deep_merge(existing, patch_value);
                    }
                    _ => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}
