use crate::autosave::{EditChoice, Resolution};
use crate::error::RemoteError;
use crate::ipc::error::{err, ok, remote_err, session_err};
use crate::ipc::helpers::{cell_key, get_str, opt_str, parse_date, require_conn, require_session};
use crate::ipc::types::{AppState, Request};
use crate::model::{CellKey, SchedulingPeriod, WeekFlags};
use crate::session::{EditOutcome, Session};
use crate::sqlite_store::{SqliteStore, WeekScope};
use crate::store::Credentials;
use chrono::{DateTime, Utc};
use serde_json::json;

fn cell_json(session: &Session, key: &CellKey) -> serde_json::Value {
    let value = session.displayed(key);
    json!({
        "userId": key.user_id,
        "date": key.date,
        "value": value,
        "label": value.map(|v| v.label()).unwrap_or_default(),
    })
}

fn handle_periods_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let include_hidden = state
        .session
        .as_ref()
        .map(|s| s.actor().is_admin)
        .unwrap_or(false);
    let store = SqliteStore::new(conn, state.config.clone());
    match store.list_periods(include_hidden) {
        Ok(periods) => ok(&req.id, json!({ "periods": periods })),
        Err(e) => remote_err(&req.id, &e),
    }
}

fn handle_rota_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let lang = ctx.session.language();
    let store = SqliteStore::new(ctx.conn, ctx.config.clone());

    let period_id = match opt_str(req, "periodId") {
        Some(id) => id.to_string(),
        None => {
            let periods = match store.list_periods(ctx.session.actor().is_admin) {
                Ok(p) => p,
                Err(e) => return remote_err(&req.id, &e),
            };
            match periods.into_iter().find(|p| p.is_active) {
                Some(p) => p.id,
                None => return err(&req.id, "no_period", "no active period", None),
            }
        }
    };

    if let Err(e) = ctx.session.reload(&store, &period_id) {
        return session_err(&req.id, &e, lang);
    }
    match ctx.session.grid(Utc::now(), None) {
        Ok(grid) => ok(&req.id, json!({ "grid": grid })),
        Err(e) => session_err(&req.id, &e, lang),
    }
}

fn handle_rota_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let from = match opt_str(req, "from") {
        Some(raw) => match parse_date(req, raw) {
            Ok(d) => Some(d),
            Err(resp) => return resp,
        },
        None => None,
    };
    match ctx.session.grid(Utc::now(), from) {
        Ok(grid) => ok(&req.id, json!({ "grid": grid })),
        Err(e) => session_err(&req.id, &e, ctx.session.language()),
    }
}

fn handle_cell_edit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let key = match cell_key(req, ctx.session) {
        Ok(k) => k,
        Err(resp) => return resp,
    };
    let raw = req
        .params
        .get("value")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let choice = match EditChoice::parse(raw) {
        Ok(c) => c,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let lang = ctx.session.language();
    let mut store = SqliteStore::new(ctx.conn, ctx.config.clone());
    let outcome = ctx.session.edit_cell(&mut store, &key, &choice, Utc::now());
    let cell = cell_json(ctx.session, &key);
    match outcome {
        EditOutcome::Rejected { rejection, message } => err(
            &req.id,
            rejection.code(),
            message.render(lang),
            Some(json!({ "status": "rejected", "cell": cell })),
        ),
        EditOutcome::Resolved(Resolution::Reverted { error, message, .. }) => err(
            &req.id,
            error.code(),
            message.render(lang),
            Some(json!({ "status": "reverted", "cell": cell, "cause": error.to_string() })),
        ),
        EditOutcome::Resolved(r) => ok(&req.id, json!({ "status": r.kind(), "cell": cell })),
    }
}

/// Admin: set the open flags of one week, or of every week in a period.
fn handle_weeks_set_flags(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let lang = ctx.session.language();
    let auth = match ctx.session.admin_credentials() {
        Ok(a) => a.clone(),
        Err(e) => return session_err(&req.id, &e, lang),
    };
    let scope = match (opt_str(req, "weekId"), opt_str(req, "periodId")) {
        (Some(w), _) => WeekScope::Week(w.to_string()),
        (None, Some(p)) => WeekScope::Period(p.to_string()),
        (None, None) => return err(&req.id, "bad_params", "missing weekId or periodId", None),
    };
    let flag = |k: &str| req.params.get(k).and_then(|v| v.as_bool());
    let (Some(open), Some(open_after_close)) = (flag("open"), flag("openAfterClose")) else {
        return err(&req.id, "bad_params", "open and openAfterClose are required", None);
    };

    let store = SqliteStore::new(ctx.conn, ctx.config.clone());
    let updated = match store.set_week_flags(
        &auth,
        &scope,
        WeekFlags {
            open,
            open_after_close,
        },
    ) {
        Ok(n) => n,
        Err(e) => return remote_err(&req.id, &e),
    };

    if let Some(period_id) = ctx.session.period().map(|p| p.id.clone()) {
        if let Err(e) = ctx.session.reload(&store, &period_id) {
            tracing::warn!(error = %e, "reload after week flag change failed");
        }
    }
    ok(&req.id, json!({ "updated": updated }))
}

/// Admin period write followed by a reload of the open period.
fn admin_period_write<F>(state: &mut AppState, req: &Request, write: F) -> serde_json::Value
where
    F: FnOnce(&SqliteStore<'_>, &Credentials, &str) -> Result<SchedulingPeriod, RemoteError>,
{
    let ctx = match require_session(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let lang = ctx.session.language();
    let auth = match ctx.session.admin_credentials() {
        Ok(a) => a.clone(),
        Err(e) => return session_err(&req.id, &e, lang),
    };
    let period_id = match get_str(req, "periodId") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };

    let store = SqliteStore::new(ctx.conn, ctx.config.clone());
    let period = match write(&store, &auth, &period_id) {
        Ok(p) => p,
        Err(e) => return remote_err(&req.id, &e),
    };

    if let Some(open_id) = ctx.session.period().map(|p| p.id.clone()) {
        if let Err(e) = ctx.session.reload(&store, &open_id) {
            tracing::warn!(error = %e, "reload after period change failed");
        }
    }
    ok(&req.id, json!({ "period": period }))
}

/// Admin: move or clear the request deadline. `closesAt` is RFC 3339 or null.
fn handle_periods_set_closes_at(state: &mut AppState, req: &Request) -> serde_json::Value {
    let closes_at = match req.params.get("closesAt") {
        None => return err(&req.id, "bad_params", "missing closesAt", None),
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_str().map(DateTime::parse_from_rfc3339) {
            Some(Ok(t)) => Some(t.with_timezone(&Utc)),
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    "closesAt must be an RFC 3339 timestamp or null",
                    None,
                )
            }
        },
    };
    admin_period_write(state, req, |store, auth, id| {
        store.set_period_closes_at(auth, id, closes_at)
    })
}

fn handle_periods_set_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    admin_period_write(state, req, |store, auth, id| store.set_active_period(auth, id))
}

fn handle_periods_set_hidden(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(hidden) = req.params.get("hidden").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "hidden is required", None);
    };
    admin_period_write(state, req, |store, auth, id| {
        store.set_period_hidden(auth, id, hidden)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "periods.list" => Some(handle_periods_list(state, req)),
        "rota.load" => Some(handle_rota_load(state, req)),
        "rota.view" => Some(handle_rota_view(state, req)),
        "cell.edit" => Some(handle_cell_edit(state, req)),
        "weeks.setFlags" => Some(handle_weeks_set_flags(state, req)),
        "periods.setClosesAt" => Some(handle_periods_set_closes_at(state, req)),
        "periods.setActive" => Some(handle_periods_set_active(state, req)),
        "periods.setHidden" => Some(handle_periods_set_hidden(state, req)),
        _ => None,
    }
}
