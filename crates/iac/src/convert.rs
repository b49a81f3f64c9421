use serde_json::{Map as JsonMap, Number, Value as Json};

/// Integral floats become integers; everything else is left alone.
pub fn normalize_number(n: &Number) -> Json {
    if n.is_i64() || n.is_u64() {
        return Json::Number(n.clone());
    }
    match n.as_f64() {
        Some(f) => float_to_json(f),
        None => Json::Number(n.clone()),
    }
}

pub fn float_to_json(f: f64) -> Json {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Json::from(f as i64)
    } else {
        Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null)
    }
}

/// Applies [`normalize_number`] through a whole JSON tree.
pub fn normalize(value: Json) -> Json {
    match value {
        Json::Number(n) => normalize_number(&n),
        Json::Array(items) => Json::Array(items.into_iter().map(normalize).collect()),
        Json::Object(map) => Json::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect::<JsonMap<_, _>>()),
        other => other,
    }
}

pub fn hcl_to_json(value: hcl::Value) -> Json {
    match value {
        hcl::Value::Null => Json::Null,
        hcl::Value::Bool(b) => Json::Bool(b),
        hcl::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Json::from(i)
            } else if let Some(u) = n.as_u64() {
                Json::from(u)
            } else {
                n.as_f64().map(float_to_json).unwrap_or(Json::Null)
            }
        }
        hcl::Value::String(s) => Json::String(s),
        hcl::Value::Array(items) => Json::Array(items.into_iter().map(hcl_to_json).collect()),
        hcl::Value::Object(map) => Json::Object(map.into_iter().map(|(k, v)| (k, hcl_to_json(v))).collect()),
    }
}
