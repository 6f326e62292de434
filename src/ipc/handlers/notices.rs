use crate::ipc::error::{err, ok, session_err};
use crate::ipc::helpers::{get_str, require_session};
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use crate::sqlite_store::SqliteStore;
use serde_json::json;

fn notices_json(session: &Session) -> serde_json::Value {
    let gate = session.notices();
    let lang = session.language();
    let notices: Vec<serde_json::Value> = gate
        .visible()
        .iter()
        .map(|n| {
            json!({
                "id": n.id,
                "version": n.version,
                "title": n.title,
                "body": n.body(lang),
                "mandatory": n.mandatory,
                "active": n.is_active,
                "acknowledged": n.is_acknowledged(),
                "updatedAt": n.updated_at,
            })
        })
        .collect();
    json!({
        "notices": notices,
        "unread": gate.unread(),
        "blocking": gate.blocking(),
        "blocksEditing": gate.is_blocking(),
    })
}

fn handle_notices_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let store = SqliteStore::new(ctx.conn, ctx.config.clone());
    if let Err(e) = ctx.session.refresh_notices(&store) {
        return session_err(&req.id, &e, ctx.session.language());
    }
    ok(&req.id, notices_json(ctx.session))
}

fn handle_notices_acknowledge(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let notice_id = match get_str(req, "noticeId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(version) = req.params.get("version").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing version", None);
    };
    let mut store = SqliteStore::new(ctx.conn, ctx.config.clone());
    match ctx.session.acknowledge_notice(&mut store, notice_id, version) {
        Ok(()) => ok(&req.id, notices_json(ctx.session)),
        Err(e) => session_err(&req.id, &e, ctx.session.language()),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notices.list" => Some(handle_notices_list(state, req)),
        "notices.acknowledge" => Some(handle_notices_acknowledge(state, req)),
        _ => None,
    }
}
