use std::collections::BTreeMap;

use serde_json::Value;

/// Opaque per-job metadata, owned by whoever holds it.
///
/// Runners and failure records each keep their own copy; nothing hands out
/// shared references into a caller's map.
pub type Metadata = BTreeMap<String, Value>;

/// Build a metadata map from `(key, value)` pairs.
pub fn metadata_from<K, V, I>(pairs: I) -> Metadata
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
