//! core/v1 objects the inventory touches, with a few helpers on top
//!
//! The objects are the complete `k8s-openapi` types, so a read-modify-write
//! keeps every field another owner put on an object.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use kube::core::TypeMeta;

pub use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, Pod, Secret};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta};
pub use k8s_openapi::apimachinery::pkg::version::Info as ServerVersion;
pub use kube::core::ObjectList;

/// Metadata for an object the inventory creates
pub fn named_meta(
    name: impl Into<String>,
    namespace: impl Into<String>,
    labels: BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some(namespace.into()),
        labels: (!labels.is_empty()).then_some(labels),
        ..Default::default()
    }
}

/// Name of an object, empty when unset
pub fn object_name(metadata: &ObjectMeta) -> &str {
    metadata.name.as_deref().unwrap_or_default()
}

pub trait SecretExt {
    /// Opaque secret holding a single UTF-8 value under `key`
    fn opaque(metadata: ObjectMeta, key: &str, value: &str) -> Self;

    /// Value stored under `key`. `None` when missing or not UTF-8.
    fn decoded(&self, key: &str) -> Option<String>;
}

impl SecretExt for Secret {
    fn opaque(metadata: ObjectMeta, key: &str, value: &str) -> Self {
        Secret {
            metadata,
            type_: Some("Opaque".to_string()),
            data: Some(BTreeMap::from([(
                key.to_string(),
                ByteString(value.as_bytes().to_vec()),
            )])),
            ..Default::default()
        }
    }

    fn decoded(&self, key: &str) -> Option<String> {
        let raw = self.data.as_ref()?.get(key)?;
        String::from_utf8(raw.0.clone()).ok()
    }
}

/// Build a list response from items, as the API server would
pub fn object_list<T: Clone>(items: Vec<T>) -> ObjectList<T> {
    ObjectList {
        types: TypeMeta {
            api_version: "v1".to_string(),
            kind: "List".to_string(),
        },
        metadata: ListMeta::default(),
        items,
    }
}

/// Items returned plus `remainingItemCount`: the collection size even
/// when the list was truncated by `limit`
pub fn total_count<T: Clone>(list: &ObjectList<T>) -> usize {
    let remaining = list
        .metadata
        .remaining_item_count
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    list.items.len() + remaining
}
