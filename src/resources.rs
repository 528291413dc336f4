//! Minimal models of the Kubernetes objects consumed by the migration
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The namespace of all control plane static pods
pub const NAMESPACE_SYSTEM: &str = "kube-system";

/// Annotation prefix used by the machine-controller for kubelet flags
pub const KUBELET_FLAGS_ANNOTATION_PREFIX: &str = "v1.kubelet-flags.machine-controller.kubermatic.io/";

/// The kubelet flag marking a machine as running with an external CCM
pub const EXTERNAL_CLOUD_PROVIDER_KUBELET_FLAG: &str = "ExternalCloudProvider";

/// The annotation of a volume pointing to its provisioner
pub const PROVISIONED_BY_ANNOTATION: &str = "pv.kubernetes.io/provisioned-by";

/// Object metadata, only the fields we care about
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// The object name
    #[serde(default)]
    pub name: String,

    /// The namespace, empty for cluster scoped objects
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// The observed version of the object
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,

    /// All annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Pod {
    /// Metadata of the pod
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// The desired state
    #[serde(default)]
    pub spec: PodSpec,

    /// The observed state
    #[serde(default)]
    pub status: PodStatus,
}

/// The relevant parts of a pod specification
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PodSpec {
    /// All containers of the pod
    #[serde(default)]
    pub containers: Vec<Container>,
}

/// A single container
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Container {
    /// The container name
    #[serde(default)]
    pub name: String,

    /// The entrypoint array
    #[serde(default)]
    pub command: Vec<String>,

    /// Arguments to the entrypoint
    #[serde(default)]
    pub args: Vec<String>,
}

/// The relevant parts of a pod status
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PodStatus {
    /// The pod phase, for example `Running`
    #[serde(default)]
    pub phase: String,

    /// All reported conditions
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
}

/// A pod condition
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PodCondition {
    /// The condition type, for example `Ready`
    #[serde(rename = "type")]
    pub type_: String,

    /// `True`, `False` or `Unknown`
    pub status: String,
}

/// A persistent volume
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PersistentVolume {
    /// Metadata of the volume
    #[serde(default)]
    pub metadata: ObjectMeta,
}

/// A machine-controller machine backing a dynamic worker node
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Machine {
    /// Metadata of the machine
    #[serde(default)]
    pub metadata: ObjectMeta,
}

impl Machine {
    /// All kubelet flags declared via annotations
    pub fn kubelet_flags(&self) -> BTreeMap<&str, &str> {
        self.metadata
            .annotations
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(KUBELET_FLAGS_ANNOTATION_PREFIX)
                    .map(|flag| (flag, v.as_str()))
            })
            .collect()
    }
}

/// A list wrapper as returned by the API server
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct List<T> {
    /// All list items
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// Parse a boolean the way the kubelet flag annotations are written
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Compute a JSON merge patch (RFC 7386) turning `base` into `modified`.
pub fn merge_patch(base: &Value, modified: &Value) -> Value {
    match (base, modified) {
        (Value::Object(b), Value::Object(m)) => {
            let mut patch = Map::new();
            for (k, mv) in m {
                match b.get(k) {
                    Some(bv) if bv == mv => {}
                    Some(bv) => {
                        patch.insert(k.clone(), merge_patch(bv, mv));
                    }
                    None => {
                        patch.insert(k.clone(), mv.clone());
                    }
                }
            }
            for k in b.keys().filter(|k| !m.contains_key(*k)) {
                patch.insert(k.clone(), Value::Null);
            }
            Value::Object(patch)
        }
        _ => modified.clone(),
    }
}

/// Compute the merge patch for an object and pin it to the observed
/// resource version of `base`. The API server rejects the patch with a
/// conflict if the object changed in the meantime.
pub fn conditional_merge_patch(
    base: &ObjectMeta,
    base_value: &Value,
    modified_value: &Value,
) -> Value {
    let mut patch = merge_patch(base_value, modified_value);
    if !base.resource_version.is_empty() {
        if let Value::Object(p) = &mut patch {
            let metadata = p
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(m) = metadata {
                m.insert(
                    "resourceVersion".into(),
                    Value::String(base.resource_version.clone()),
                );
            }
        }
    }
    patch
}
