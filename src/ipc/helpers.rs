use crate::config::EngineConfig;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::CellKey;
use crate::session::Session;
use chrono::NaiveDate;
use rusqlite::Connection;

/// Borrowed pieces of state a logged-in request works with.
pub struct Ctx<'a> {
    pub conn: &'a Connection,
    pub config: &'a EngineConfig,
    pub session: &'a mut Session,
}

pub fn require_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn require_session<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<Ctx<'a>, serde_json::Value> {
    let Some(conn) = state.db.as_ref() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let Some(session) = state.session.as_mut() else {
        return Err(err(&req.id, "not_logged_in", "log in first", None));
    };
    Ok(Ctx {
        conn,
        config: &state.config,
        session,
    })
}

pub fn get_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim()),
        _ => Err(err(&req.id, "bad_params", format!("missing {key}"), None)),
    }
}

pub fn opt_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn parse_date(req: &Request, raw: &str) -> Result<NaiveDate, serde_json::Value> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        err(
            &req.id,
            "bad_params",
            format!("invalid date: {raw}"),
            Some(serde_json::json!({ "expected": "YYYY-MM-DD" })),
        )
    })
}

pub fn get_date(req: &Request, key: &str) -> Result<NaiveDate, serde_json::Value> {
    let raw = get_str(req, key)?;
    parse_date(req, raw)
}

/// Cell addressed by `userId` (defaults to the actor) and `date`.
pub fn cell_key(req: &Request, session: &Session) -> Result<CellKey, serde_json::Value> {
    let date = get_date(req, "date")?;
    let user_id = opt_str(req, "userId").unwrap_or(session.actor().id.as_str());
    Ok(CellKey::new(user_id, date))
}
