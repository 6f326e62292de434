use crate::config::{self, EngineConfig};
use crate::db;
use crate::directory;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::require_conn;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "loggedIn": state.session.as_ref().map(|s| s.actor().id.clone()),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };
    let cfg = match config::load(&conn) {
        Ok(c) => c,
        Err(e) => {
            // A broken saved config must not keep the workspace closed.
            tracing::warn!(error = %e, "engine config unreadable, using defaults");
            EngineConfig::default()
        }
    };

    // Sessions belong to the workspace they logged into.
    state.session = None;
    state.workspace = Some(path.clone());
    state.config = cfg;
    state.db = Some(conn);
    tracing::info!(workspace = %path.to_string_lossy(), "workspace selected");
    ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_conn(state, req) {
        return resp;
    }
    ok(&req.id, json!({ "config": state.config }))
}

/// Admin only, except on a workspace with no users yet.
fn handle_config_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let bootstrapping = directory::is_empty(conn).unwrap_or(false);
    let is_admin = state
        .session
        .as_ref()
        .map(|s| s.actor().is_admin)
        .unwrap_or(false);
    if !bootstrapping && !is_admin {
        return err(&req.id, "admin_only", "admin only", None);
    }

    let Some(raw) = req.params.get("config") else {
        return err(&req.id, "bad_params", "missing config", None);
    };
    let cfg: EngineConfig = match serde_json::from_value(raw.clone()) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    if let Err(msg) = cfg.validate() {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = config::save(conn, &cfg) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    if let Some(session) = state.session.as_mut() {
        session.set_config(cfg.clone());
    }
    state.config = cfg;
    ok(&req.id, json!({ "config": state.config }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "config.get" => Some(handle_config_get(state, req)),
        "config.set" => Some(handle_config_set(state, req)),
        _ => None,
    }
}
