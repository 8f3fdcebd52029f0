use crate::error::EngineError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let message = message.into();
    tracing::warn!(request_id = id, code, %message, "request failed");
    let mut error = json!({
        "code": code,
        "message": message,
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn respond(id: &str, result: Result<serde_json::Value, EngineError>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => err(id, e.code(), e.to_string(), None),
    }
}
