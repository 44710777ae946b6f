use serde::Serialize;
use serde_json::Value;

use crate::error::EngineResult;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::types::Request;

pub fn no_workspace(req: &Request) -> Value {
    err(&req.id, "no_workspace", "select a workspace first", None)
}

/// Required non-empty string param; the error variant is a ready `bad_params` response.
pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        )),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn optional_bool(req: &Request, key: &str) -> bool {
    req.params.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Wraps a serialized result under `key`, or maps the engine error to its IPC code.
pub fn reply<T: Serialize>(req: &Request, key: &str, result: EngineResult<T>) -> Value {
    match result {
        Ok(v) => match serde_json::to_value(v) {
            Ok(v) => {
                let mut out = serde_json::Map::new();
                out.insert(key.to_string(), v);
                ok(&req.id, Value::Object(out))
            }
            Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
        },
        Err(e) => engine_err(&req.id, &e),
    }
}

/// Like [`reply`] but returns the serialized value as the whole result.
pub fn reply_flat<T: Serialize>(req: &Request, result: EngineResult<T>) -> Value {
    match result {
        Ok(v) => match serde_json::to_value(v) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
        },
        Err(e) => engine_err(&req.id, &e),
    }
}
