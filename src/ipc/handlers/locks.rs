use crate::ipc::error::{ok, session_err};
use crate::ipc::helpers::{cell_key, opt_str, require_session};
use crate::ipc::types::{AppState, Request};
use crate::sqlite_store::SqliteStore;
use serde_json::json;

fn handle_locks_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let key = match cell_key(req, ctx.session) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let mut store = SqliteStore::new(ctx.conn, ctx.config.clone());
    match ctx.session.lock_cell(
        &mut store,
        &key,
        opt_str(req, "reasonEn"),
        opt_str(req, "reasonEs"),
    ) {
        Ok(()) => ok(
            &req.id,
            json!({ "userId": key.user_id, "date": key.date, "locked": true }),
        ),
        Err(e) => session_err(&req.id, &e, ctx.session.language()),
    }
}

fn handle_locks_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let key = match cell_key(req, ctx.session) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let mut store = SqliteStore::new(ctx.conn, ctx.config.clone());
    match ctx.session.unlock_cell(&mut store, &key) {
        Ok(()) => ok(
            &req.id,
            json!({ "userId": key.user_id, "date": key.date, "locked": false }),
        ),
        Err(e) => session_err(&req.id, &e, ctx.session.language()),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "locks.set" => Some(handle_locks_set(state, req)),
        "locks.clear" => Some(handle_locks_clear(state, req)),
        _ => None,
    }
}
