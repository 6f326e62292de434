//! Seeding of reference data: users, periods with their weeks, notices.

use crate::config::EngineConfig;
use crate::db::hash_pin;
use crate::model::{Language, RoleTier};
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Deserialize;

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSeed {
    pub id: String,
    pub name: String,
    pub role: RoleTier,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default = "yes")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i64,
    #[serde(default)]
    pub language: Language,
    pub pin: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSeed {
    pub id: String,
    #[serde(default)]
    pub open: Option<bool>,
    #[serde(default)]
    pub open_after_close: Option<bool>,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSeed {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub closes_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub weeks: Vec<WeekSeed>,
    /// Dates of the period not attached to any week.
    #[serde(default)]
    pub loose_dates: Vec<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeSeed {
    pub id: String,
    #[serde(default = "first_version")]
    pub version: i64,
    pub title: String,
    pub body_en: String,
    #[serde(default)]
    pub body_es: Option<String>,
    #[serde(default = "yes")]
    pub target_all: bool,
    #[serde(default)]
    pub target_roles: Vec<RoleTier>,
    #[serde(default = "yes")]
    pub is_active: bool,
    #[serde(default)]
    pub mandatory: bool,
}

fn first_version() -> i64 {
    1
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    #[serde(default)]
    pub users: Vec<UserSeed>,
    #[serde(default)]
    pub periods: Vec<PeriodSeed>,
    #[serde(default)]
    pub notices: Vec<NoticeSeed>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub users: usize,
    pub periods: usize,
    pub weeks: usize,
    pub dates: usize,
    pub notices: usize,
}

fn validate(dir: &Directory, cfg: &EngineConfig) -> anyhow::Result<()> {
    for u in &dir.users {
        if u.id.trim().is_empty() || u.name.trim().is_empty() {
            bail!("user id and name must not be empty");
        }
        if !cfg.is_valid_pin(&u.pin) {
            bail!("user {}: pin must be {} digits", u.id, cfg.pin_length);
        }
    }
    for p in &dir.periods {
        if p.end_date < p.start_date {
            bail!("period {}: endDate before startDate", p.id);
        }
        let dates = p.weeks.iter().flat_map(|w| w.dates.iter()).chain(p.loose_dates.iter());
        for d in dates {
            if *d < p.start_date || *d > p.end_date {
                bail!("period {}: date {} outside the period", p.id, d);
            }
        }
    }
    Ok(())
}

/// Upserts everything in one transaction. Existing request cells are kept.
pub fn import(
    conn: &mut Connection,
    dir: &Directory,
    cfg: &EngineConfig,
) -> anyhow::Result<ImportSummary> {
    validate(dir, cfg)?;
    let now = Utc::now().to_rfc3339();
    let mut summary = ImportSummary::default();

    let tx = conn.transaction().context("failed to start import")?;
    for u in &dir.users {
        tx.execute(
            "INSERT INTO users(id, name, role, is_admin, is_active, display_order, language, pin_hash)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               role = excluded.role,
               is_admin = excluded.is_admin,
               is_active = excluded.is_active,
               display_order = excluded.display_order,
               language = excluded.language,
               pin_hash = excluded.pin_hash",
            (
                &u.id,
                &u.name,
                u.role.id(),
                u.is_admin,
                u.is_active,
                u.display_order,
                u.language.as_str(),
                hash_pin(&u.id, &u.pin),
            ),
        )
        .with_context(|| format!("failed to import user {}", u.id))?;
        summary.users += 1;
    }

    for p in &dir.periods {
        tx.execute(
            "INSERT INTO periods(id, name, start_date, end_date, is_active, is_hidden, closes_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               start_date = excluded.start_date,
               end_date = excluded.end_date,
               is_active = excluded.is_active,
               is_hidden = excluded.is_hidden,
               closes_at = excluded.closes_at",
            (
                &p.id,
                &p.name,
                p.start_date.to_string(),
                p.end_date.to_string(),
                p.is_active,
                p.is_hidden,
                p.closes_at.map(|t| t.to_rfc3339()),
            ),
        )
        .with_context(|| format!("failed to import period {}", p.id))?;
        summary.periods += 1;

        for w in &p.weeks {
            tx.execute(
                "INSERT INTO weeks(id, period_id, open, open_after_close) VALUES(?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                   period_id = excluded.period_id,
                   open = excluded.open,
                   open_after_close = excluded.open_after_close",
                (&w.id, &p.id, w.open, w.open_after_close),
            )
            .with_context(|| format!("failed to import week {}", w.id))?;
            summary.weeks += 1;
            for d in &w.dates {
                upsert_date(&tx, &p.id, *d, Some(&w.id))?;
                summary.dates += 1;
            }
        }
        for d in &p.loose_dates {
            upsert_date(&tx, &p.id, *d, None)?;
            summary.dates += 1;
        }
    }

    for n in &dir.notices {
        tx.execute(
            "INSERT INTO notices(id, version, title, body_en, body_es, target_all, target_roles, is_active, mandatory, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               version = excluded.version,
               title = excluded.title,
               body_en = excluded.body_en,
               body_es = excluded.body_es,
               target_all = excluded.target_all,
               target_roles = excluded.target_roles,
               is_active = excluded.is_active,
               mandatory = excluded.mandatory,
               updated_at = excluded.updated_at",
            (
                &n.id,
                n.version,
                &n.title,
                &n.body_en,
                &n.body_es,
                n.target_all,
                serde_json::to_string(&n.target_roles)?,
                n.is_active,
                n.mandatory,
                &now,
            ),
        )
        .with_context(|| format!("failed to import notice {}", n.id))?;
        summary.notices += 1;
    }

    tx.commit().context("failed to commit import")?;
    tracing::info!(
        users = summary.users,
        periods = summary.periods,
        weeks = summary.weeks,
        notices = summary.notices,
        "directory imported"
    );
    Ok(summary)
}

fn upsert_date(
    tx: &rusqlite::Transaction<'_>,
    period_id: &str,
    date: NaiveDate,
    week_id: Option<&str>,
) -> anyhow::Result<()> {
    tx.execute(
        "INSERT INTO period_dates(period_id, date, week_id) VALUES(?, ?, ?)
         ON CONFLICT(period_id, date) DO UPDATE SET week_id = excluded.week_id",
        (period_id, date.to_string(), week_id),
    )?;
    Ok(())
}

/// True when the workspace has no users yet, so an unauthenticated import
/// may bootstrap it.
pub fn is_empty(conn: &Connection) -> anyhow::Result<bool> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
    Ok(n == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn directory(json: serde_json::Value) -> Directory {
        serde_json::from_value(json).expect("directory json")
    }

    #[test]
    fn imports_and_reimports_without_duplicates() {
        let mut conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        assert!(is_empty(&conn).expect("empty"));

        let dir = directory(serde_json::json!({
            "users": [{ "id": "a", "name": "Ana", "role": 2, "pin": "1234" }],
            "periods": [{
                "id": "p1", "name": "March",
                "startDate": "2026-03-01", "endDate": "2026-03-07",
                "weeks": [{ "id": "w1", "open": true, "dates": ["2026-03-01", "2026-03-02"] }],
                "looseDates": ["2026-03-03"]
            }],
            "notices": [{ "id": "n1", "title": "Rules", "bodyEn": "Read", "mandatory": true }]
        }));
        let s = import(&mut conn, &dir, &EngineConfig::default()).expect("import");
        assert_eq!(s.dates, 3);
        import(&mut conn, &dir, &EngineConfig::default()).expect("reimport");

        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM period_dates", [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 3);
        let open_after: Option<bool> = conn
            .query_row("SELECT open_after_close FROM weeks WHERE id = 'w1'", [], |r| r.get(0))
            .expect("week");
        assert_eq!(open_after, None);
    }

    #[test]
    fn rejects_bad_pin_and_out_of_range_dates() {
        let mut conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        let bad_pin = directory(serde_json::json!({
            "users": [{ "id": "a", "name": "Ana", "role": 2, "pin": "12a4" }]
        }));
        assert!(import(&mut conn, &bad_pin, &EngineConfig::default()).is_err());

        let bad_date = directory(serde_json::json!({
            "periods": [{
                "id": "p1", "name": "March",
                "startDate": "2026-03-01", "endDate": "2026-03-07",
                "weeks": [{ "id": "w1", "dates": ["2026-03-09"] }]
            }]
        }));
        assert!(import(&mut conn, &bad_date, &EngineConfig::default()).is_err());
        assert!(is_empty(&conn).expect("still empty"));
    }
}
