use crate::ipc::error::{err, ok, remote_err, session_err};
use crate::ipc::helpers::{get_str, opt_str, require_session};
use crate::ipc::types::{AppState, Request};
use crate::messages::UserMessage;
use crate::sqlite_store::SqliteStore;
use chrono::Utc;
use serde_json::json;

fn handle_week_comments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let week_id = match get_str(req, "weekId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = SqliteStore::new(ctx.conn, ctx.config.clone());
    match store.week_comments(week_id) {
        Ok(comments) => ok(&req.id, json!({ "weekId": week_id, "comments": comments })),
        Err(e) => remote_err(&req.id, &e),
    }
}

/// Same gate as a cell edit on the row; admins may also comment on closed weeks.
fn handle_week_comments_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let week_id = match get_str(req, "weekId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let comment = req
        .params
        .get("comment")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let lang = ctx.session.language();
    let target = opt_str(req, "userId")
        .unwrap_or(ctx.session.actor().id.as_str())
        .to_string();

    if let Err(rejection) = ctx.session.check_week_comment(week_id, &target, Utc::now()) {
        return err(
            &req.id,
            rejection.code(),
            UserMessage::for_rejection(&rejection).render(lang),
            None,
        );
    }
    let auth = match ctx.session.credentials() {
        Ok(a) => a,
        Err(e) => return session_err(&req.id, &e, lang),
    };

    let store = SqliteStore::new(ctx.conn, ctx.config.clone());
    match store.upsert_week_comment(auth, auth.target_for(&target), week_id, comment) {
        Ok(saved) => ok(&req.id, json!({ "weekId": week_id, "comment": saved })),
        Err(e) => remote_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "weekComments.get" => Some(handle_week_comments_get(state, req)),
        "weekComments.upsert" => Some(handle_week_comments_upsert(state, req)),
        _ => None,
    }
}
