use std::collections::BTreeMap;

use serde_json::Value;

/// Backend-defined key/value parameters for codecs, formats and caps.
pub type Params = BTreeMap<String, Value>;

/// Returns `base` with every key of `overrides` written over it.
pub fn merge(base: &Params, overrides: &Params) -> Params {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

pub fn get_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub fn get_u64(params: &Params, key: &str) -> Option<u64> {
    params.get(key).and_then(Value::as_u64)
}

pub fn get_bool(params: &Params, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}

/// Builds a `Params` map from literal pairs.
pub fn params<const N: usize>(pairs: [(&str, Value); N]) -> Params {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
