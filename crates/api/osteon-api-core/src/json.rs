//! Shorthand JSON for values.
//!
//! Canonical form is the serde representation of [`Value`]:
//! `{ "type": "Vec3", "data": [1, 2, 3] }`. Hand-written clips and rigs may
//! instead use shorthand, which [`normalize_value_json`] rewrites:
//! - a bare number is a `Float`
//! - numeric arrays of length 2/3/4/16 are `Vec2`/`Vec3`/`Quat`/`Matrix`
//! - single-key objects name the kind: `{ "color3": [1, 0, 0] }`,
//!   `{ "size": { "width": 4, "height": 2 } }`

use serde_json::{json, Map, Value as JsonValue};

use crate::{Value, ValueError};

fn kind_alias(key: &str) -> Option<&'static str> {
    Some(match key.to_ascii_lowercase().as_str() {
        "float" | "scalar" => "Float",
        "vec2" | "vector2" => "Vec2",
        "vec3" | "vector3" => "Vec3",
        "quat" | "quaternion" => "Quat",
        "matrix" | "mat4" => "Matrix",
        "color3" | "color" => "Color3",
        "size" => "Size",
        _ => return None,
    })
}

fn numeric_array_kind(items: &[JsonValue]) -> Option<&'static str> {
    if !items.iter().all(JsonValue::is_number) {
        return None;
    }
    match items.len() {
        2 => Some("Vec2"),
        3 => Some("Vec3"),
        4 => Some("Quat"),
        16 => Some("Matrix"),
        _ => None,
    }
}

fn normalize_payload(kind: &str, data: JsonValue) -> JsonValue {
    match (kind, data) {
        ("Size", JsonValue::Object(map)) => {
            let w = map.get("width").cloned().unwrap_or(json!(0.0));
            let h = map.get("height").cloned().unwrap_or(json!(0.0));
            json!([w, h])
        }
        ("Color3", JsonValue::Object(map)) => {
            let r = map.get("r").cloned().unwrap_or(json!(0.0));
            let g = map.get("g").cloned().unwrap_or(json!(0.0));
            let b = map.get("b").cloned().unwrap_or(json!(0.0));
            json!([r, g, b])
        }
        (_, data) => data,
    }
}

fn canonical(kind: &str, data: JsonValue) -> JsonValue {
    let mut map = Map::new();
    map.insert("type".into(), JsonValue::String(kind.to_string()));
    map.insert("data".into(), normalize_payload(kind, data));
    JsonValue::Object(map)
}

/// Rewrite shorthand value JSON into the canonical tagged form. Input that is
/// already canonical, or not recognizable, is returned unchanged.
pub fn normalize_value_json(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Number(_) => canonical("Float", value),
        JsonValue::Array(ref items) => match numeric_array_kind(items) {
            Some(kind) => canonical(kind, value),
            None => value,
        },
        JsonValue::Object(mut map) => {
            if map.contains_key("type") {
                return JsonValue::Object(map);
            }
            if map.len() == 1 {
                let key = map.keys().next().cloned().unwrap_or_default();
                if let Some(kind) = kind_alias(&key) {
                    let data = map.remove(&key).unwrap_or(JsonValue::Null);
                    return canonical(kind, data);
                }
            }
            JsonValue::Object(map)
        }
        other => other,
    }
}

/// Parse canonical or shorthand JSON into a [`Value`].
pub fn parse_value(value: JsonValue) -> Result<Value, ValueError> {
    serde_json::from_value(normalize_value_json(value)).map_err(|e| ValueError::InvalidJson {
        reason: e.to_string(),
    })
}
