//! Shared object metadata for dependent resources

use std::collections::BTreeMap;

use kube::core::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{Postgres, CORRELATION_ID_ANNOTATION};

/// Label identifying which Postgres a dependent belongs to
pub const NAME_LABEL: &str = "postgres.data.nais.io/name";

/// Base metadata for every dependent resource
///
/// Carries the owner's labels, the name label and the correlation id.
/// Callers override name and namespace for resources living elsewhere.
pub fn object_meta(owner: &Postgres) -> ObjectMeta {
    let mut labels = owner.propagated_labels();
    labels.insert(NAME_LABEL.to_string(), owner.name_any());

    ObjectMeta {
        name: Some(owner.name_any()),
        namespace: owner.namespace(),
        labels: Some(labels),
        annotations: Some(BTreeMap::from([(
            CORRELATION_ID_ANNOTATION.to_string(),
            owner.correlation_id(),
        )])),
        ..Default::default()
    }
}

/// Set an annotation, creating the map when absent
pub fn set_annotation(meta: &mut ObjectMeta, key: &str, value: &str) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
}

/// Set a label, creating the map when absent
pub fn set_label(meta: &mut ObjectMeta, key: &str, value: &str) {
    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
}
