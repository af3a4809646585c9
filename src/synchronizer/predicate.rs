//! Relevance predicate for the main watch stream
//!
//! The controller is triggered for every change to the owned kind,
//! including the status writes the synchronizer itself performs. Filtering
//! the main stream down to changes of generation, labels or annotations
//! keeps those self-inflicted events out of the work queue. Secondary
//! kinds are watched unfiltered so dependent drift is always seen.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use kube::Resource;

/// Hash of the object's spec-relevant metadata
///
/// Shaped for [`kube::runtime::WatchStreamExt::predicate_filter`]: an event
/// is delivered only when the returned hash differs from the previous one
/// for the same object. Generation covers spec changes; labels and
/// annotations cover administrator-driven re-reconciles.
pub fn relevant_changes<K: Resource>(obj: &K) -> Option<u64> {
    let meta = obj.meta();
    let mut hasher = DefaultHasher::new();
    meta.generation.hash(&mut hasher);
    meta.labels.hash(&mut hasher);
    meta.annotations.hash(&mut hasher);
    Some(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::core::ObjectMeta;
    use std::collections::BTreeMap;

    fn object(generation: i64, labels: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("test".to_string()),
                generation: Some(generation),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn unchanged_metadata_hashes_equal() {
        let a = object(1, &[("team", "a")]);
        let b = object(1, &[("team", "a")]);
        assert_eq!(relevant_changes(&a), relevant_changes(&b));
    }

    #[test]
    fn generation_change_hashes_differently() {
        let a = object(1, &[]);
        let b = object(2, &[]);
        assert_ne!(relevant_changes(&a), relevant_changes(&b));
    }

    #[test]
    fn label_change_hashes_differently() {
        let a = object(1, &[("team", "a")]);
        let b = object(1, &[("team", "b")]);
        assert_ne!(relevant_changes(&a), relevant_changes(&b));
    }

    #[test]
    fn annotation_change_hashes_differently() {
        let mut a = object(1, &[]);
        let mut b = object(1, &[]);
        a.metadata.annotations = Some(BTreeMap::from([("k".to_string(), "v1".to_string())]));
        b.metadata.annotations = Some(BTreeMap::from([("k".to_string(), "v2".to_string())]));
        assert_ne!(relevant_changes(&a), relevant_changes(&b));
    }
}
