//! Layer merge for engine configuration
//!
//! - Tables: merged key by key, recursively
//! - Arrays: replaced wholesale by the later layer
//! - Scalars: later layer wins

use serde_json::Value;

/// Merge `layer` onto `base`
pub fn deep_merge(base: Value, layer: Value) -> Value {
    match (base, layer) {
        (Value::Object(mut merged), Value::Object(layer)) => {
            for (key, value) in layer {
                let slot = merged.entry(key).or_insert(Value::Null);
                *slot = deep_merge(slot.take(), value);
            }
            Value::Object(merged)
        }
        (_, layer) => layer,
    }
}

/// Fold layers lowest precedence first
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
