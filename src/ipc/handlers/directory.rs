use crate::directory::{self, Directory};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Seeds users, periods and notices. Open on an empty workspace so it can be
/// bootstrapped; afterwards only an admin session may import.
fn handle_directory_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let cfg = state.config.clone();
    let is_admin = state
        .session
        .as_ref()
        .map(|s| s.actor().is_admin)
        .unwrap_or(false);
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let empty = match directory::is_empty(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !empty && !is_admin {
        return err(&req.id, "admin_only", "admin only", None);
    }

    let dir: Directory = match serde_json::from_value(req.params.clone()) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    match directory::import(conn, &dir, &cfg) {
        Ok(s) => ok(
            &req.id,
            json!({
                "users": s.users,
                "periods": s.periods,
                "weeks": s.weeks,
                "dates": s.dates,
                "notices": s.notices,
            }),
        ),
        Err(e) => err(&req.id, "import_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "directory.import" => Some(handle_directory_import(state, req)),
        _ => None,
    }
}
