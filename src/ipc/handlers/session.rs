use crate::db;
use crate::ipc::error::{err, ok, remote_err};
use crate::ipc::helpers::{get_str, opt_str, require_session};
use crate::ipc::types::{AppState, Request};
use crate::model::Language;
use crate::session::{decode_carrier, encode_carrier, Session};
use crate::sqlite_store::SqliteStore;
use crate::store::Credentials;
use serde_json::json;

/// Settings key remembering who logged in last on this workspace.
pub const LAST_USER_KEY: &str = "client.lastUserId";

fn start_session(state: &mut AppState, req: &Request, creds: Credentials) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn, state.config.clone());
    let user = match store.verify_credential(&creds.actor_id, &creds.pin) {
        Ok(u) => u,
        Err(e) => {
            tracing::info!(user = %creds.actor_id, "login refused");
            return remote_err(&req.id, &e);
        }
    };

    if let Err(e) = db::settings_set_json(conn, LAST_USER_KEY, &json!(user.id)) {
        tracing::warn!(error = %e, "could not remember last user");
    }

    let carrier = match encode_carrier(&creds) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "encode_failed", e.to_string(), None),
    };
    let mut session = Session::new(user, Some(creds), state.config.clone());
    if let Some(lang) = opt_str(req, "language").and_then(Language::parse) {
        session.set_language(lang);
    }
    let result = json!({
        "user": session.actor(),
        "language": session.language(),
        "carrier": carrier,
    });
    tracing::info!(user = %session.actor().id, "logged in");
    state.session = Some(session);
    ok(&req.id, result)
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user_id = match get_str(req, "userId") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let pin = match get_str(req, "pin") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    start_session(
        state,
        req,
        Credentials {
            actor_id: user_id,
            pin,
        },
    )
}

/// Logs in from a carrier string produced by an earlier login.
fn handle_resume(state: &mut AppState, req: &Request) -> serde_json::Value {
    let raw = match get_str(req, "carrier") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(creds) = decode_carrier(raw) else {
        return err(&req.id, "bad_carrier", "malformed session carrier", None);
    };
    start_session(state, req, creds)
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let was = state.session.take().map(|s| s.actor().id.clone());
    ok(&req.id, json!({ "loggedOut": was }))
}

fn handle_last_user(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match db::settings_get_json(conn, LAST_USER_KEY) {
        Ok(v) => ok(
            &req.id,
            json!({ "userId": v.and_then(|v| v.as_str().map(str::to_string)) }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_set_language(state: &mut AppState, req: &Request) -> serde_json::Value {
    let raw = match get_str(req, "language") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(lang) = Language::parse(raw) else {
        return err(&req.id, "bad_params", "language must be en or es", None);
    };
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let store = SqliteStore::new(ctx.conn, ctx.config.clone());
    if let Err(e) = store.set_user_language(&ctx.session.actor().id, lang) {
        return remote_err(&req.id, &e);
    }
    ctx.session.set_language(lang);
    tracing::debug!(user = %ctx.session.actor().id, language = lang.as_str(), "language saved");
    ok(&req.id, json!({ "language": lang }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.login" => Some(handle_login(state, req)),
        "session.resume" => Some(handle_resume(state, req)),
        "session.logout" => Some(handle_logout(state, req)),
        "session.lastUser" => Some(handle_last_user(state, req)),
        "session.setLanguage" => Some(handle_set_language(state, req)),
        _ => None,
    }
}
