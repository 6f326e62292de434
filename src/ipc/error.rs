use crate::error::{RemoteError, SessionError};
use crate::messages::UserMessage;
use crate::model::Language;
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
    let mut error = json!({
        "code": code,
        "message": message.into(),
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

/// Session failures carry the user-facing text in the actor's language.
pub fn session_err(id: &str, e: &SessionError, lang: Language) -> serde_json::Value {
    err(
        id,
        e.code(),
        UserMessage::for_session(e).render(lang),
        Some(json!({ "cause": e.to_string() })),
    )
}

pub fn remote_err(id: &str, e: &RemoteError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), None)
}
