//! Application spec hashing
//!
//! The hash identifies one revision of a `FlinkApplication`'s deployable
//! spec. It is written into resource names and the `flink-app-hash` label, so
//! it must be stable across processes and toolchain versions.

use std::collections::BTreeMap;

use kube::ResourceExt;
use serde_json::Value;
use tracing::warn;

use crate::crd::FlinkApplication;

/// Spec field excluded from the hash: it changes during the savepoint
/// handoff without requiring a new cluster
const SAVEPOINT_INFO_FIELD: &str = "savepointInfo";

/// Compute a short deterministic hash of a string.
///
/// SHA-256 truncated to its first 4 bytes, as 8 lowercase hex chars. Unlike
/// `DefaultHasher`, the output never changes between Rust releases.
pub fn deterministic_hash(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()[..4]
        .iter()
        .fold(String::with_capacity(8), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Hash of an application's deployable spec.
///
/// Covers the normalized spec minus savepoint info, rendered as compact JSON
/// with object keys sorted at every level. Metadata and status never
/// contribute. Any change to the rendered form redeploys every running
/// application.
pub fn hash_for_application(app: &FlinkApplication) -> String {
    deterministic_hash(&canonical_spec(app))
}

/// Compact JSON of the hashed part of the spec
fn canonical_spec(app: &FlinkApplication) -> String {
    let spec = app.spec.normalized();
    let mut value = match serde_json::to_value(&spec) {
        Ok(value) => value,
        Err(e) => {
            // Unreachable for string-keyed structs; keep the hash app-specific
            warn!(app = %app.name_any(), error = %e, "spec did not serialize, hashing debug form");
            return format!("{:?}", spec);
        }
    };
    if let Some(fields) = value.as_object_mut() {
        fields.remove(SAVEPOINT_INFO_FIELD);
    }
    sort_keys(value).to_string()
}

/// Rebuild objects in key order, independent of serde_json's map backing
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sort_keys(v)))
                .collect::<BTreeMap<_, _>>()
                .into_iter()
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
