//! Deep merge of rendered mappings.

use crate::value::{Rendered, RenderedMap};

/// Conflict policy for [`deep_merge`].
///
/// Mappings present on both sides are always merged recursively; the policy
/// decides the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    /// Union sequences present on both sides instead of replacing them.
    pub union_arrays: bool,
    /// An incoming `null` keeps the existing value.
    pub keep_on_null: bool,
}

impl MergePolicy {
    /// Classic deep merge: arrays unioned by equality, `null` never overwrites.
    pub const UNION: Self = Self {
        union_arrays: true,
        keep_on_null: true,
    };

    /// Used between sibling calls: sequences are replaced, never merged
    /// element-wise.
    pub const REPLACE_ARRAYS: Self = Self {
        union_arrays: false,
        keep_on_null: true,
    };
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::UNION
    }
}

/// Merge `incoming` into `base`.
pub fn deep_merge(base: &mut RenderedMap, incoming: RenderedMap, policy: MergePolicy) {
    for (key, value) in incoming {
        match base.get_mut(&key) {
            Some(existing) => merge_value(existing, value, policy),
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// Store `value` under `key`, deep-merging when the key already holds a
/// mapping and replacing otherwise.
pub fn merge_entry(map: &mut RenderedMap, key: String, value: Rendered, policy: MergePolicy) {
    match map.get_mut(&key) {
        Some(existing @ Rendered::Object(_)) => merge_value(existing, value, policy),
        _ => {
            map.insert(key, value);
        }
    }
}

fn merge_value(existing: &mut Rendered, incoming: Rendered, policy: MergePolicy) {
    match (existing, incoming) {
        (Rendered::Object(base), Rendered::Object(other)) => deep_merge(base, other, policy),
        (Rendered::Array(base), Rendered::Array(other)) if policy.union_arrays => {
            let mut union: Vec<Rendered> = Vec::with_capacity(base.len() + other.len());
            for item in base.drain(..).chain(other) {
                if !union.contains(&item) {
                    union.push(item);
                }
            }
            *base = union;
        }
        (_, Rendered::Null) if policy.keep_on_null => {}
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn map(value: Rendered) -> RenderedMap {
        match value {
            Rendered::Object(m) => m,
            other => panic!("not a map: {other}"),
        }
    }

    #[test]
    fn test_nested_maps_union() {
        let mut base = map(json!({"user": {"id": 1, "profile": {"bio": "x"}}}));
        deep_merge(
            &mut base,
            map(json!({"user": {"name": "Ada", "profile": {"avatar": "a.png"}}})),
            MergePolicy::UNION,
        );
        assert_eq!(
            Rendered::Object(base),
            json!({"user": {"id": 1, "profile": {"bio": "x", "avatar": "a.png"}, "name": "Ada"}})
        );
    }

    #[test]
    fn test_arrays_by_policy() {
        let mut base = map(json!({"tags": ["a", "b"]}));
        deep_merge(&mut base, map(json!({"tags": ["b", "c"]})), MergePolicy::UNION);
        assert_eq!(base["tags"], json!(["a", "b", "c"]));

        let mut base = map(json!({"tags": ["a", "b"]}));
        deep_merge(&mut base, map(json!({"tags": ["c"]})), MergePolicy::REPLACE_ARRAYS);
        assert_eq!(base["tags"], json!(["c"]));
    }

    #[test]
    fn test_null_keeps_existing() {
        let mut base = map(json!({"name": "Ada"}));
        deep_merge(&mut base, map(json!({"name": null, "id": null})), MergePolicy::UNION);
        assert_eq!(Rendered::Object(base), json!({"name": "Ada", "id": null}));

        let mut base = map(json!({"name": "Ada"}));
        let overwrite = MergePolicy {
            keep_on_null: false,
            ..MergePolicy::UNION
        };
        deep_merge(&mut base, map(json!({"name": null})), overwrite);
        assert_eq!(base["name"], json!(null));
    }

    #[test]
    fn test_scalars_last_write_wins() {
        let mut base = map(json!({"n": 1, "s": {"a": 1}}));
        deep_merge(&mut base, map(json!({"n": 2, "s": 3})), MergePolicy::UNION);
        assert_eq!(Rendered::Object(base), json!({"n": 2, "s": 3}));
    }

    #[test]
    fn test_merge_entry_replaces_non_maps() {
        let mut result = RenderedMap::new();
        merge_entry(&mut result, "a".into(), json!([1]), MergePolicy::REPLACE_ARRAYS);
        merge_entry(&mut result, "a".into(), json!([2]), MergePolicy::REPLACE_ARRAYS);
        assert_eq!(result["a"], json!([2]));

        merge_entry(&mut result, "u".into(), json!({"id": 1}), MergePolicy::REPLACE_ARRAYS);
        merge_entry(&mut result, "u".into(), json!({"name": "Ada"}), MergePolicy::REPLACE_ARRAYS);
        assert_eq!(result["u"], json!({"id": 1, "name": "Ada"}));
    }
}
